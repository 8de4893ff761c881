//! In-memory record loader shared by the integration tests. Counts full
//! record fetches so lazy loading can be asserted.
#![allow(dead_code)]

use parcel_tracking::{
    allocation::Placement,
    error::StoreError,
    fleet::VehicleKind,
    parcel::{ParcelHandle, ParcelRecord},
    store::{FleetRecord, IndexEntry, RecordLoader},
    types::{HistoryEvent, ParcelStatus},
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct StoredVehicle {
    kind: VehicleKind,
    capacity: u32,
    company: String,
    load: Vec<String>,
}

#[derive(Default)]
pub struct MemoryLoader {
    parcels: Mutex<BTreeMap<String, ParcelRecord>>,
    vehicles: Mutex<BTreeMap<String, StoredVehicle>>,
    // indexed codes whose full record cannot be produced
    hidden: Mutex<BTreeSet<String>>,
    full_loads: AtomicUsize,
}

pub fn record(code: &str, status: ParcelStatus) -> ParcelRecord {
    ParcelRecord {
        code: code.to_string(),
        weight: 1.0,
        sender: "Amazon".to_string(),
        receiver: "Client A".to_string(),
        status,
        history: vec![HistoryEvent::new("Label created")],
    }
}

impl MemoryLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_parcel(&self, record: ParcelRecord) {
        self.parcels.lock().insert(record.code.clone(), record);
    }

    pub fn add_pending(&self, codes: &[&str]) {
        for code in codes {
            self.add_parcel(record(code, ParcelStatus::Pending));
        }
    }

    /// Drop the full record while leaving callers holding its code.
    pub fn forget(&self, code: &str) {
        self.parcels.lock().remove(code);
    }

    /// Keep `code` in the index but fail to produce its full record.
    pub fn hide_record(&self, code: &str) {
        self.hidden.lock().insert(code.to_string());
    }

    pub fn restore_record(&self, code: &str) {
        self.hidden.lock().remove(code);
    }

    pub fn full_loads(&self) -> usize {
        self.full_loads.load(Ordering::SeqCst)
    }

    pub fn stored_status(&self, code: &str) -> Option<ParcelStatus> {
        self.parcels.lock().get(code).map(|r| r.status)
    }

    pub fn stored_history(&self, code: &str) -> Vec<String> {
        self.parcels
            .lock()
            .get(code)
            .map(|r| r.history.iter().map(|e| e.text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn stored_load(&self, vehicle: &str) -> Vec<String> {
        self.vehicles
            .lock()
            .get(vehicle)
            .map(|v| v.load.clone())
            .unwrap_or_default()
    }

    pub fn handle(self: &Arc<Self>, code: &str) -> ParcelHandle {
        let status = self
            .stored_status(code)
            .unwrap_or(ParcelStatus::Pending);
        let loader: Arc<dyn RecordLoader> = self.clone();
        ParcelHandle::new(
            IndexEntry {
                code: code.to_string(),
                status,
            },
            loader,
        )
    }
}

impl RecordLoader for MemoryLoader {
    fn load_full_record(&self, code: &str) -> Result<Option<ParcelRecord>, StoreError> {
        self.full_loads.fetch_add(1, Ordering::SeqCst);
        if self.hidden.lock().contains(code) {
            return Ok(None);
        }
        Ok(self.parcels.lock().get(code).cloned())
    }

    fn load_pending_index(&self) -> Result<Vec<IndexEntry>, StoreError> {
        Ok(self
            .parcels
            .lock()
            .values()
            .filter(|r| r.status == ParcelStatus::Pending)
            .map(|r| IndexEntry {
                code: r.code.clone(),
                status: r.status,
            })
            .collect())
    }

    fn load_index_entry(&self, code: &str) -> Result<Option<IndexEntry>, StoreError> {
        Ok(self.parcels.lock().get(code).map(|r| IndexEntry {
            code: r.code.clone(),
            status: r.status,
        }))
    }

    fn load_fleet(&self, company: Option<&str>) -> Result<Vec<FleetRecord>, StoreError> {
        let parcels = self.parcels.lock();
        let mut fleet: Vec<FleetRecord> = self
            .vehicles
            .lock()
            .iter()
            .filter(|(_, v)| company.is_none_or(|name| name == v.company))
            .map(|(code, v)| FleetRecord {
                code: code.clone(),
                kind: v.kind,
                capacity: v.capacity,
                company: v.company.clone(),
                load: v
                    .load
                    .iter()
                    .filter_map(|c| parcels.get(c))
                    .map(|r| IndexEntry {
                        code: r.code.clone(),
                        status: r.status,
                    })
                    .collect(),
            })
            .collect();
        fleet.sort_by(|a, b| (&a.company, &a.code).cmp(&(&b.company, &b.code)));
        Ok(fleet)
    }

    fn has_vehicle(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.vehicles.lock().contains_key(code))
    }

    fn save_status(&self, code: &str, status: ParcelStatus) -> Result<(), StoreError> {
        let mut parcels = self.parcels.lock();
        let record = parcels
            .get_mut(code)
            .ok_or_else(|| StoreError::MissingRecord(code.to_string()))?;
        record.status = status;
        Ok(())
    }

    fn save_association(&self, code: &str, vehicle_code: &str) -> Result<(), StoreError> {
        let mut vehicles = self.vehicles.lock();
        let vehicle = vehicles
            .get_mut(vehicle_code)
            .ok_or_else(|| StoreError::MissingRecord(vehicle_code.to_string()))?;
        if !vehicle.load.iter().any(|c| c == code) {
            vehicle.load.push(code.to_string());
        }
        Ok(())
    }

    fn save_placements(&self, placements: &[Placement]) -> Result<(), StoreError> {
        let mut parcels = self.parcels.lock();
        let mut vehicles = self.vehicles.lock();
        for placement in placements {
            if !parcels.contains_key(&placement.parcel) {
                return Err(StoreError::MissingRecord(placement.parcel.clone()));
            }
            if !vehicles.contains_key(&placement.vehicle) {
                return Err(StoreError::MissingRecord(placement.vehicle.clone()));
            }
        }
        for placement in placements {
            if let Some(record) = parcels.get_mut(&placement.parcel) {
                record.status = ParcelStatus::Loaded;
            }
            if let Some(vehicle) = vehicles.get_mut(&placement.vehicle) {
                if !vehicle.load.contains(&placement.parcel) {
                    vehicle.load.push(placement.parcel.clone());
                }
            }
        }
        Ok(())
    }

    fn append_history(&self, code: &str, event: &HistoryEvent) -> Result<(), StoreError> {
        let mut parcels = self.parcels.lock();
        let record = parcels
            .get_mut(code)
            .ok_or_else(|| StoreError::MissingRecord(code.to_string()))?;
        record.history.insert(0, event.clone());
        Ok(())
    }

    fn save_vehicle(
        &self,
        code: &str,
        kind: VehicleKind,
        capacity: u32,
        company: &str,
    ) -> Result<(), StoreError> {
        let mut vehicles = self.vehicles.lock();
        let load = match vehicles.remove(code) {
            Some(existing) if existing.company != company => {
                let taken = StoreError::VehicleTaken {
                    code: code.to_string(),
                    company: existing.company.clone(),
                };
                vehicles.insert(code.to_string(), existing);
                return Err(taken);
            }
            Some(existing) => existing.load,
            None => Vec::new(),
        };
        vehicles.insert(
            code.to_string(),
            StoredVehicle {
                kind,
                capacity,
                company: company.to_string(),
                load,
            },
        );
        Ok(())
    }
}

/// Listener that keeps every event it hears.
#[derive(Default)]
pub struct Recorder<E> {
    events: Mutex<Vec<E>>,
}

impl<E: Clone + Send> Recorder<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

impl<E: Clone + Send> parcel_tracking::notify::Listener<E> for Recorder<E> {
    fn on_change(&self, event: &E) {
        self.events.lock().push(event.clone());
    }
}
