//! Parcel tracking core: one live object per parcel code, shared by every
//! actor, with lazy detail loading, role-guarded writes and NextFit loading
//! of warehouse parcels onto a fleet.

pub mod allocation;
pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod fleet;
pub mod notify;
pub mod parcel;
pub mod service;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{LogisticsError, StoreError};
pub use service::FleetFacade;
pub use session::{Role, Session};
