//! Walks one warehouse shift end to end: seed parcels and vans, load them,
//! drive the full van to a hub and print what a customer would see.
//!
//! Run with `RUST_LOG=debug` to watch lazy loads and allocation decisions.
use anyhow::Context;
use parcel_tracking::{
    FleetFacade, Role, Session,
    config::FleetConfig,
    fleet::VehicleKind,
    notify::Listener,
    parcel::ParcelEvent,
    store::{RecordLoader, SledStore},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let temp_dir = tempfile::tempdir()?;
    let config = FleetConfig {
        store_path: temp_dir.path().join("warehouse.db"),
        van_capacity: 2,
        audit_log: Some(temp_dir.path().join("audit.log")),
        ..FleetConfig::load("fleet.toml")?
    };

    let store = Arc::new(SledStore::open(&config.store_path)?);
    let mut codes = Vec::new();
    for receiver in ["Client A", "Client B", "Client C"] {
        codes.push(store.register_parcel(1.0, "Amazon", receiver)?);
    }

    let loader: Arc<dyn RecordLoader> = store.clone();
    let mut facade = FleetFacade::new(loader, config.clone());
    let dispatcher = Session::login(Role::Dispatcher);
    facade.register_vehicle(&dispatcher, "DHL", VehicleKind::Van, "VAN-01")?;
    facade.register_vehicle(&dispatcher, "DHL", VehicleKind::Van, "VAN-02")?;

    // a customer watching their parcel from the start
    let tracked = facade
        .find_parcel(&codes[0])?
        .context("seeded parcel not found")?;
    tracked.attach(Arc::new(|event: &ParcelEvent| {
        println!("  customer notified: {} {}", event.code, event.change);
    }) as Arc<dyn Listener<ParcelEvent>>);

    let report = facade.execute_load(&dispatcher)?;
    println!(
        "placed {} parcels, {} left behind, {} departed",
        report.allocation.placements.len(),
        report.allocation.unplaced.len(),
        report.dispatched.len()
    );

    let driver = Session::login(Role::Driver);
    let stops = facade.register_leg(&driver, "VAN-01", "Milan")?;
    println!("VAN-01 reached Milan, {stops} parcels updated");

    for company in facade.fleet()? {
        for vehicle in company.fleet() {
            println!("{} {vehicle}", company.name());
        }
    }

    println!("history of {}:", tracked.code());
    for line in facade.history(tracked.code())? {
        println!("  {line}");
    }

    if let Some(path) = &config.audit_log {
        println!("audit trail:\n{}", std::fs::read_to_string(path)?);
    }
    Ok(())
}
