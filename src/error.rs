use crate::session::Role;
use crate::types::ParcelStatus;

/// Failures raised by the record store. Never surfaced raw past the store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sled failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("no stored record for {0}")]
    MissingRecord(String),
    #[error("vehicle {code} belongs to {company}")]
    VehicleTaken { code: String, company: String },
}

#[derive(thiserror::Error, Debug)]
pub enum LogisticsError {
    #[error("role {role} may not {action}")]
    PermissionDenied { role: Role, action: &'static str },
    #[error("parcel {0} is indexed but its full record is missing")]
    DataIntegrity(String),
    #[error("no vehicles available for allocation")]
    NoCapacityAvailable,
    #[error("no pending parcels in the warehouse")]
    EmptyQueue,
    #[error("no vehicles in the fleet")]
    NoFleet,
    #[error("vehicle {0} carries no parcels")]
    EmptyVehicle(String),
    #[error("vehicle {0} not found")]
    VehicleNotFound(String),
    #[error("vehicle {0} already exists in the fleet")]
    DuplicateVehicle(String),
    #[error("unknown vehicle kind: {0}")]
    UnknownVehicleKind(String),
    #[error("invalid vehicle: {0}")]
    InvalidVehicle(String),
    #[error("invalid company: {0}")]
    InvalidCompany(String),
    #[error("parcel {code} cannot move from {from} to {to}")]
    InvalidTransition {
        code: String,
        from: ParcelStatus,
        to: ParcelStatus,
    },
    #[error("weight must be positive, got {0}")]
    InvalidWeight(f64),
    #[error(transparent)]
    Store(StoreError),
}

// a record the index pointed at but the store cannot produce is corruption
impl From<StoreError> for LogisticsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingRecord(code) => LogisticsError::DataIntegrity(code),
            StoreError::VehicleTaken { code, .. } => LogisticsError::DuplicateVehicle(code),
            other => LogisticsError::Store(other),
        }
    }
}

pub type Result<T, E = LogisticsError> = std::result::Result<T, E>;
