//! Companies, their vehicles and the kind → capacity factory
use super::error::{LogisticsError, Result};
use super::notify::{Listener, NotificationHub};
use super::parcel::ParcelHandle;
use super::session::Session;
use super::types::ParcelStatus;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const TRUCK_CAPACITY: u32 = 100;
pub const VAN_CAPACITY: u32 = 20;

/// Informational vehicle category. Only the factory looks at it.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleKind {
    #[n(0)]
    Truck,
    #[n(1)]
    Van,
}

impl VehicleKind {
    pub fn default_capacity(&self) -> u32 {
        match self {
            VehicleKind::Truck => TRUCK_CAPACITY,
            VehicleKind::Van => VAN_CAPACITY,
        }
    }
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleKind::Truck => write!(f, "TRUCK"),
            VehicleKind::Van => write!(f, "VAN"),
        }
    }
}

impl FromStr for VehicleKind {
    type Err = LogisticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRUCK" => Ok(VehicleKind::Truck),
            "VAN" => Ok(VehicleKind::Van),
            _ => Err(LogisticsError::UnknownVehicleKind(s.to_string())),
        }
    }
}

/// Broadcast whenever a parcel is added to a vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleEvent {
    pub vehicle: String,
    pub parcel: String,
    pub load: usize,
    pub capacity: u32,
}

#[derive(Debug)]
pub struct Vehicle {
    code: String,
    kind: VehicleKind,
    capacity: u32,
    load: Vec<Arc<ParcelHandle>>,
    hub: NotificationHub<VehicleEvent>,
}

impl Vehicle {
    pub fn new(code: &str, kind: VehicleKind, capacity: u32) -> Result<Self> {
        if code.trim().is_empty() {
            return Err(LogisticsError::InvalidVehicle(
                "vehicle code must not be empty".into(),
            ));
        }
        if capacity == 0 {
            return Err(LogisticsError::InvalidVehicle(format!(
                "vehicle {code} must have a positive capacity"
            )));
        }

        Ok(Self {
            code: code.to_string(),
            kind,
            capacity,
            load: Vec::new(),
            hub: NotificationHub::new(),
        })
    }

    /// Factory: a vehicle with the standard capacity of its kind.
    pub fn from_kind(code: &str, kind: VehicleKind) -> Result<Self> {
        Self::new(code, kind, kind.default_capacity())
    }

    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn kind(&self) -> VehicleKind {
        self.kind
    }
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
    pub fn load(&self) -> &[Arc<ParcelHandle>] {
        &self.load
    }
    pub fn len(&self) -> usize {
        self.load.len()
    }
    pub fn is_empty(&self) -> bool {
        self.load.is_empty()
    }
    pub fn has_room(&self) -> bool {
        self.load.len() < self.capacity as usize
    }
    pub fn is_full(&self) -> bool {
        self.load.len() == self.capacity as usize
    }

    /// Places `parcel` on this vehicle and marks it loaded. Returns `false`
    /// without touching the parcel when the vehicle has no room left.
    pub fn load_parcel(&mut self, session: &Session, parcel: &Arc<ParcelHandle>) -> Result<bool> {
        if !self.has_room() {
            return Ok(false);
        }

        parcel.set_status(session, ParcelStatus::Loaded)?;
        self.push(Arc::clone(parcel));
        Ok(true)
    }

    // Re-attaches a parcel the store already associates with this vehicle.
    pub(crate) fn restore(&mut self, parcel: Arc<ParcelHandle>) -> Result<()> {
        if !self.has_room() {
            return Err(LogisticsError::DataIntegrity(format!(
                "vehicle {} stores more parcels than its capacity {}",
                self.code, self.capacity
            )));
        }
        self.load.push(parcel);
        Ok(())
    }

    pub fn attach(&self, listener: Arc<dyn Listener<VehicleEvent>>) {
        self.hub.attach(listener);
    }

    pub fn detach(&self, listener: &Arc<dyn Listener<VehicleEvent>>) {
        self.hub.detach(listener);
    }

    fn push(&mut self, parcel: Arc<ParcelHandle>) {
        let event = VehicleEvent {
            vehicle: self.code.clone(),
            parcel: parcel.code().to_string(),
            load: self.load.len() + 1,
            capacity: self.capacity,
        };
        self.load.push(parcel);
        self.hub.broadcast(&event);
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, load={}/{}]",
            self.kind,
            self.code,
            self.load.len(),
            self.capacity
        )
    }
}

/// A carrier company. Owns its vehicles; vehicle codes are unique within it.
#[derive(Debug)]
pub struct Company {
    name: String,
    fleet: Vec<Vehicle>,
}

impl Company {
    pub fn new(name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(LogisticsError::InvalidCompany(
                "company name must not be empty".into(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            fleet: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fleet(&self) -> &[Vehicle] {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut [Vehicle] {
        &mut self.fleet
    }

    pub fn vehicle(&self, code: &str) -> Option<&Vehicle> {
        self.fleet.iter().find(|v| v.code == code)
    }

    /// Adds `vehicle` keeping the fleet ordered by code, the order the store
    /// hands it back in.
    pub fn add_vehicle(&mut self, vehicle: Vehicle) -> Result<()> {
        if self.vehicle(&vehicle.code).is_some() {
            return Err(LogisticsError::DuplicateVehicle(vehicle.code));
        }
        tracing::debug!(company = %self.name, %vehicle, "vehicle added to fleet");
        let index = self.fleet.partition_point(|v| v.code < vehicle.code);
        self.fleet.insert(index, vehicle);
        Ok(())
    }
}
