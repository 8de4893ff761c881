//! Record store: the narrow loader interface and its sled-backed engine
//!
//! Every record is CBOR encoded and lives in one sled keyspace under a prefix:
//!
//! - `parcel/<code>`             parcel row (details, status, vehicle association)
//! - `vehicle/<code>`            vehicle row (kind, capacity, company, load order)
//! - `history/<code>\0<id>`      one history event, `id` from `sled::Db::generate_id`
//!
//! Writes touching more than one key go through a single `sled::Batch`.
use super::allocation::Placement;
use super::error::{LogisticsError, StoreError};
use super::fleet::VehicleKind;
use super::parcel::ParcelRecord;
use super::types::{HistoryEvent, ParcelStatus};
use sled::{Batch, Db, IVec};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;

const PARCEL_PREFIX: &str = "parcel/";
const VEHICLE_PREFIX: &str = "vehicle/";
const HISTORY_PREFIX: &str = "history/";

/// Lightweight index row: enough to build a parcel handle without its details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub code: String,
    pub status: ParcelStatus,
}

/// A vehicle as stored, with the parcels associated to it in load order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetRecord {
    pub code: String,
    pub kind: VehicleKind,
    pub capacity: u32,
    pub company: String,
    pub load: Vec<IndexEntry>,
}

/// Loader interface consumed by parcel handles, the cache and the facade.
pub trait RecordLoader: Send + Sync {
    /// Full parcel detail including history, newest event first.
    fn load_full_record(&self, code: &str) -> Result<Option<ParcelRecord>, StoreError>;
    /// Every parcel still waiting in the warehouse, ordered by code.
    fn load_pending_index(&self) -> Result<Vec<IndexEntry>, StoreError>;
    fn load_index_entry(&self, code: &str) -> Result<Option<IndexEntry>, StoreError>;
    /// Vehicles ordered by company then code, optionally restricted to one company.
    fn load_fleet(&self, company: Option<&str>) -> Result<Vec<FleetRecord>, StoreError>;
    fn has_vehicle(&self, code: &str) -> Result<bool, StoreError>;
    fn save_status(&self, code: &str, status: ParcelStatus) -> Result<(), StoreError>;
    fn save_association(&self, code: &str, vehicle_code: &str) -> Result<(), StoreError>;
    /// Marks every placed parcel `LOADED` and appends it to its vehicle's
    /// load. All placements are written or none is.
    fn save_placements(&self, placements: &[Placement]) -> Result<(), StoreError>;
    fn append_history(&self, code: &str, event: &HistoryEvent) -> Result<(), StoreError>;
    /// Creates or updates a vehicle. An existing vehicle keeps its load and
    /// cannot move to another company.
    fn save_vehicle(
        &self,
        code: &str,
        kind: VehicleKind,
        capacity: u32,
        company: &str,
    ) -> Result<(), StoreError>;
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
struct StoredParcel {
    #[n(0)]
    code: String,
    #[n(1)]
    weight: f64,
    #[n(2)]
    sender: String,
    #[n(3)]
    receiver: String,
    #[n(4)]
    status: ParcelStatus,
    #[n(5)]
    vehicle: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
struct StoredVehicle {
    #[n(0)]
    code: String,
    #[n(1)]
    kind: VehicleKind,
    #[n(2)]
    capacity: u32,
    #[n(3)]
    company: String,
    #[n(4)]
    load: Vec<String>,
}

fn parcel_key(code: &str) -> String {
    format!("{PARCEL_PREFIX}{code}")
}

fn vehicle_key(code: &str) -> String {
    format!("{VEHICLE_PREFIX}{code}")
}

// NUL terminated so that "C1" never scans into "C10"
fn history_prefix(code: &str) -> Vec<u8> {
    let mut prefix = format!("{HISTORY_PREFIX}{code}").into_bytes();
    prefix.push(0);
    prefix
}

fn history_key(code: &str, id: u64) -> Vec<u8> {
    let mut key = history_prefix(code);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode<T>(bytes: &IVec) -> Result<T, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes.as_ref())?)
}

pub struct SledStore {
    instance: Arc<Db>,
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> Self {
        Self { instance }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self::new(Arc::new(db)))
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }

    /// Create a parcel row together with its initial history.
    pub fn insert_parcel(&self, record: &ParcelRecord) -> Result<(), LogisticsError> {
        if !(record.weight.is_finite() && record.weight > 0.0) {
            return Err(LogisticsError::InvalidWeight(record.weight));
        }

        let row = StoredParcel {
            code: record.code.clone(),
            weight: record.weight,
            sender: record.sender.clone(),
            receiver: record.receiver.clone(),
            status: record.status,
            vehicle: None,
        };

        let mut batch = Batch::default();
        batch.insert(
            parcel_key(&record.code).as_bytes(),
            minicbor::to_vec(&row).map_err(StoreError::from)?,
        );
        // history is newest first, ids must grow from the oldest event
        for event in record.history.iter().rev() {
            let id = self.instance.generate_id().map_err(StoreError::from)?;
            batch.insert(
                history_key(&record.code, id),
                minicbor::to_vec(event).map_err(StoreError::from)?,
            );
        }
        self.instance.apply_batch(batch).map_err(StoreError::from)?;

        tracing::debug!(code = %record.code, status = %record.status, "parcel stored");
        Ok(())
    }

    /// Register a new warehouse parcel under a generated code.
    pub fn register_parcel(
        &self,
        weight: f64,
        sender: &str,
        receiver: &str,
    ) -> anyhow::Result<String> {
        let code = super::utils::new_parcel_code()?;
        let record = ParcelRecord {
            code: code.clone(),
            weight,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            status: ParcelStatus::Pending,
            history: vec![HistoryEvent::new("Label created")],
        };
        self.insert_parcel(&record)?;

        Ok(code)
    }

    fn parcel_row(&self, code: &str) -> Result<Option<StoredParcel>, StoreError> {
        self.instance
            .get(parcel_key(code).as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn require_parcel_row(&self, code: &str) -> Result<StoredParcel, StoreError> {
        self.parcel_row(code)?
            .ok_or_else(|| StoreError::MissingRecord(code.to_string()))
    }

    fn vehicle_row(&self, code: &str) -> Result<Option<StoredVehicle>, StoreError> {
        self.instance
            .get(vehicle_key(code).as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn history(&self, code: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        self.instance
            .scan_prefix(history_prefix(code))
            .rev()
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }
}

impl RecordLoader for SledStore {
    fn load_full_record(&self, code: &str) -> Result<Option<ParcelRecord>, StoreError> {
        let Some(row) = self.parcel_row(code)? else {
            return Ok(None);
        };
        let history = self.history(code)?;

        Ok(Some(ParcelRecord {
            code: row.code,
            weight: row.weight,
            sender: row.sender,
            receiver: row.receiver,
            status: row.status,
            history,
        }))
    }

    fn load_pending_index(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let mut pending = Vec::new();
        for entry in self.instance.scan_prefix(PARCEL_PREFIX) {
            let (_, value) = entry?;
            let row: StoredParcel = decode(&value)?;
            if row.status == ParcelStatus::Pending {
                pending.push(IndexEntry {
                    code: row.code,
                    status: row.status,
                });
            }
        }
        Ok(pending)
    }

    fn load_index_entry(&self, code: &str) -> Result<Option<IndexEntry>, StoreError> {
        Ok(self.parcel_row(code)?.map(|row| IndexEntry {
            code: row.code,
            status: row.status,
        }))
    }

    fn load_fleet(&self, company: Option<&str>) -> Result<Vec<FleetRecord>, StoreError> {
        let mut fleet = Vec::new();
        for entry in self.instance.scan_prefix(VEHICLE_PREFIX) {
            let (_, value) = entry?;
            let row: StoredVehicle = decode(&value)?;
            if company.is_some_and(|name| name != row.company) {
                continue;
            }

            let load = row
                .load
                .iter()
                .map(|code| {
                    let parcel = self.require_parcel_row(code)?;
                    Ok(IndexEntry {
                        code: parcel.code,
                        status: parcel.status,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;

            fleet.push(FleetRecord {
                code: row.code,
                kind: row.kind,
                capacity: row.capacity,
                company: row.company,
                load,
            });
        }

        fleet.sort_by(|a, b| (&a.company, &a.code).cmp(&(&b.company, &b.code)));
        Ok(fleet)
    }

    fn has_vehicle(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.instance.contains_key(vehicle_key(code).as_bytes())?)
    }

    fn save_status(&self, code: &str, status: ParcelStatus) -> Result<(), StoreError> {
        let mut row = self.require_parcel_row(code)?;
        row.status = status;
        self.instance
            .insert(parcel_key(code).as_bytes(), minicbor::to_vec(&row)?)?;
        Ok(())
    }

    fn save_association(&self, code: &str, vehicle_code: &str) -> Result<(), StoreError> {
        let mut parcel = self.require_parcel_row(code)?;
        let mut vehicle = self
            .vehicle_row(vehicle_code)?
            .ok_or_else(|| StoreError::MissingRecord(vehicle_code.to_string()))?;

        parcel.vehicle = Some(vehicle_code.to_string());
        if !vehicle.load.iter().any(|loaded| loaded == code) {
            vehicle.load.push(code.to_string());
        }

        let mut batch = Batch::default();
        batch.insert(parcel_key(code).as_bytes(), minicbor::to_vec(&parcel)?);
        batch.insert(
            vehicle_key(vehicle_code).as_bytes(),
            minicbor::to_vec(&vehicle)?,
        );
        self.instance.apply_batch(batch)?;
        Ok(())
    }

    fn save_placements(&self, placements: &[Placement]) -> Result<(), StoreError> {
        if placements.is_empty() {
            return Ok(());
        }

        // every row is read and checked before the batch is applied
        let mut batch = Batch::default();
        let mut vehicles: HashMap<&str, StoredVehicle> = HashMap::new();
        for placement in placements {
            let vehicle_code = placement.vehicle.as_str();
            let vehicle = match vehicles.entry(vehicle_code) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(
                    self.vehicle_row(vehicle_code)?
                        .ok_or_else(|| StoreError::MissingRecord(vehicle_code.to_string()))?,
                ),
            };
            if !vehicle.load.iter().any(|loaded| *loaded == placement.parcel) {
                vehicle.load.push(placement.parcel.clone());
            }

            let mut parcel = self.require_parcel_row(&placement.parcel)?;
            parcel.status = ParcelStatus::Loaded;
            parcel.vehicle = Some(placement.vehicle.clone());
            batch.insert(
                parcel_key(&placement.parcel).as_bytes(),
                minicbor::to_vec(&parcel)?,
            );
        }
        for (code, row) in &vehicles {
            batch.insert(vehicle_key(code).as_bytes(), minicbor::to_vec(row)?);
        }

        self.instance.apply_batch(batch)?;
        tracing::debug!(placements = placements.len(), "placements stored");
        Ok(())
    }

    fn append_history(&self, code: &str, event: &HistoryEvent) -> Result<(), StoreError> {
        // history rows hang off a parcel row, never on their own
        self.require_parcel_row(code)?;
        let id = self.instance.generate_id()?;
        self.instance
            .insert(history_key(code, id), minicbor::to_vec(event)?)?;
        Ok(())
    }

    fn save_vehicle(
        &self,
        code: &str,
        kind: VehicleKind,
        capacity: u32,
        company: &str,
    ) -> Result<(), StoreError> {
        let load = match self.vehicle_row(code)? {
            Some(existing) if existing.company != company => {
                return Err(StoreError::VehicleTaken {
                    code: code.to_string(),
                    company: existing.company,
                });
            }
            Some(existing) => existing.load,
            None => Vec::new(),
        };

        let row = StoredVehicle {
            code: code.to_string(),
            kind,
            capacity,
            company: company.to_string(),
            load,
        };
        self.instance
            .insert(vehicle_key(code).as_bytes(), minicbor::to_vec(&row)?)?;
        Ok(())
    }
}
