//! Parcel → vehicle allocation strategies
//!
//! The facade only talks to [`AllocationStrategy`]; [`NextFit`] is the policy
//! shipped with the crate. A strategy mutates vehicle loads and parcel status
//! in place and reports what it placed and what it had to leave behind.
use super::error::{LogisticsError, Result};
use super::fleet::Vehicle;
use super::parcel::ParcelHandle;
use super::session::Session;
use super::types::ParcelStatus;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub parcel: String,
    pub vehicle: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnplacedReason {
    /// The vehicle the cursor moved to had no room either.
    VehicleFull { vehicle: String },
    /// The cursor ran past the last vehicle.
    FleetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unplaced {
    pub parcel: String,
    pub reason: UnplacedReason,
}

/// Outcome of one allocation pass. Unplaced parcels keep their status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    pub placements: Vec<Placement>, // in placement order
    pub unplaced: Vec<Unplaced>,
}

impl AllocationReport {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Codes placed on `vehicle` during this pass, in order.
    pub fn placed_on(&self, vehicle: &str) -> Vec<&str> {
        self.placements
            .iter()
            .filter(|p| p.vehicle == vehicle)
            .map(|p| p.parcel.as_str())
            .collect()
    }

    fn place(&mut self, parcel: &ParcelHandle, vehicle: &Vehicle) {
        tracing::debug!(parcel = parcel.code(), vehicle = vehicle.code(), "parcel loaded");
        self.placements.push(Placement {
            parcel: parcel.code().to_string(),
            vehicle: vehicle.code().to_string(),
        });
    }

    fn leave(&mut self, parcel: &ParcelHandle, reason: UnplacedReason) {
        tracing::warn!(parcel = parcel.code(), ?reason, "parcel left in warehouse");
        self.unplaced.push(Unplaced {
            parcel: parcel.code().to_string(),
            reason,
        });
    }
}

pub trait AllocationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Distribute `parcels` over `vehicles`, both taken in the given order.
    fn allocate(
        &self,
        session: &Session,
        parcels: &[Arc<ParcelHandle>],
        vehicles: &mut [&mut Vehicle],
    ) -> Result<AllocationReport>;
}

/// Single forward pass keeping exactly one vehicle open. When a parcel does
/// not fit, the open vehicle is closed for good and the next one is tried
/// once. Closed vehicles are never revisited.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextFit;

impl AllocationStrategy for NextFit {
    fn name(&self) -> &'static str {
        "NextFit"
    }

    fn allocate(
        &self,
        session: &Session,
        parcels: &[Arc<ParcelHandle>],
        vehicles: &mut [&mut Vehicle],
    ) -> Result<AllocationReport> {
        let mut report = AllocationReport::default();
        if parcels.is_empty() {
            tracing::debug!("no parcels to allocate");
            return Ok(report);
        }
        if vehicles.is_empty() {
            return Err(LogisticsError::NoCapacityAvailable);
        }
        session.ensure_can_write("allocate parcels")?;

        tracing::info!(
            parcels = parcels.len(),
            vehicles = vehicles.len(),
            "running NextFit allocation"
        );

        let mut cursor = 0;
        let mut exhausted = false;

        for parcel in parcels {
            // processed by an earlier pass
            if parcel.status() != ParcelStatus::Pending {
                continue;
            }
            if exhausted {
                report.leave(parcel, UnplacedReason::FleetExhausted);
                continue;
            }

            if vehicles[cursor].load_parcel(session, parcel)? {
                report.place(parcel, &*vehicles[cursor]);
                continue;
            }

            if cursor + 1 == vehicles.len() {
                exhausted = true;
                report.leave(parcel, UnplacedReason::FleetExhausted);
                continue;
            }

            cursor += 1;
            if vehicles[cursor].load_parcel(session, parcel)? {
                report.place(parcel, &*vehicles[cursor]);
            } else {
                let vehicle = vehicles[cursor].code().to_string();
                report.leave(parcel, UnplacedReason::VehicleFull { vehicle });
            }
        }

        Ok(report)
    }
}
