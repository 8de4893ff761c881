//! Smoke screen unit tests for the parcel model
//!
//! These exercise the entity cache, lazy loading, the write guard and change
//! notification in isolation from the facade, against the in-memory loader in
//! `common`. They mostly follow the happy path with a few refusals.
//!
mod common;

use common::{MemoryLoader, Recorder, record};
use parcel_tracking::{
    LogisticsError, Role, Session,
    cache::EntityCache,
    fleet::{Vehicle, VehicleEvent, VehicleKind},
    notify::Listener,
    parcel::{ParcelChange, ParcelEvent},
    types::ParcelStatus,
};
use std::sync::Arc;

fn dispatcher() -> Session {
    Session::login(Role::Dispatcher)
}

// CACHE TESTS
#[cfg(test)]
mod cache_tests {
    use super::*;

    /// Two lookups of the same code hand out the very same handle
    #[test]
    fn same_code_yields_same_instance() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let cache = EntityCache::new();

        let first = cache.get_or_create("C01", || loader.handle("C01"));
        let second = cache.get_or_create("C01", || loader.handle("C01"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    /// The factory only runs on a miss
    #[test]
    fn factory_ignored_on_hit() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let cache = EntityCache::new();
        cache.get_or_create("C01", || loader.handle("C01"));

        let mut called = false;
        cache.get_or_create("C01", || {
            called = true;
            loader.handle("C01")
        });

        assert!(!called);
    }

    /// Different codes never share a handle
    #[test]
    fn different_codes_are_distinct() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01", "C02"]);
        let cache = EntityCache::new();

        let a = cache.get_or_create("C01", || loader.handle("C01"));
        let b = cache.get_or_create("C02", || loader.handle("C02"));

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(cache.contains("C01") && cache.contains("C02"));
    }

    /// Evicting one code leaves the others canonical
    #[test]
    fn evict_forgets_only_that_code() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01", "C02"]);
        let cache = EntityCache::new();
        let c01 = cache.get_or_create("C01", || loader.handle("C01"));
        let c02 = cache.get_or_create("C02", || loader.handle("C02"));

        let evicted = cache.evict("C01");

        assert!(evicted.is_some_and(|handle| Arc::ptr_eq(&handle, &c01)));
        assert!(cache.evict("C01").is_none());
        assert!(!cache.contains("C01"));
        let again = cache.get_or_create("C02", || loader.handle("C02"));
        assert!(Arc::ptr_eq(&c02, &again));
    }

    /// Clearing the cache forgets the canonical instance
    #[test]
    fn clear_starts_a_new_identity() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let cache = EntityCache::new();
        let before = cache.get_or_create("C01", || loader.handle("C01"));

        cache.clear();
        assert!(cache.is_empty());
        let after = cache.get_or_create("C01", || loader.handle("C01"));

        assert!(!Arc::ptr_eq(&before, &after));
    }
}

// LAZY LOADING TESTS
#[cfg(test)]
mod lazy_loading_tests {
    use super::*;

    /// Code and status come from the index row, no full fetch
    #[test]
    fn shadow_reads_never_load() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");

        assert_eq!(handle.code(), "C01");
        assert_eq!(handle.status(), ParcelStatus::Pending);
        assert!(!handle.is_loaded());
        assert_eq!(loader.full_loads(), 0);
        Ok(())
    }

    /// The first detail read loads, every later read is served from memory
    #[test]
    fn details_load_exactly_once() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");

        assert_eq!(handle.weight()?, 1.0);
        assert!(handle.is_loaded());
        assert_eq!(handle.sender()?, "Amazon");
        assert_eq!(handle.receiver()?, "Client A");
        assert_eq!(handle.history()?.len(), 1);

        assert_eq!(loader.full_loads(), 1);
        Ok(())
    }

    /// An index row whose full record vanished is a data integrity failure
    #[test]
    fn missing_record_is_data_integrity() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        loader.forget("C01");

        let result = handle.weight();

        assert!(matches!(result, Err(LogisticsError::DataIntegrity(code)) if code == "C01"));
        assert!(!handle.is_loaded());
    }

    /// After loading, the full record is the authority for status
    #[test]
    fn loaded_status_wins_over_shadow() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");

        handle.set_status(&dispatcher(), ParcelStatus::Loaded)?;

        assert_eq!(handle.status(), ParcelStatus::Loaded);
        assert_eq!(handle.snapshot()?.status, ParcelStatus::Loaded);
        Ok(())
    }
}

// WRITE GUARD TESTS
#[cfg(test)]
mod write_guard_tests {
    use super::*;

    fn assert_denied(result: Result<impl std::fmt::Debug, LogisticsError>) {
        assert!(
            matches!(
                result,
                Err(LogisticsError::PermissionDenied {
                    role: Role::Customer,
                    ..
                })
            ),
            "expected a permission failure"
        );
    }

    /// Every mutator refuses a customer before touching the record
    #[test]
    fn customer_cannot_write_anything() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        let customer = Session::new();

        assert_denied(handle.set_status(&customer, ParcelStatus::Loaded));
        assert_denied(handle.set_weight(&customer, 9.0));
        assert_denied(handle.set_sender(&customer, "Mallory"));
        assert_denied(handle.set_receiver(&customer, "Mallory"));
        assert_denied(handle.append_history_event(&customer, "forged"));

        // the guard runs before any lazy load
        assert!(!handle.is_loaded());
        assert_eq!(loader.full_loads(), 0);
    }

    /// A refused write leaves the observable state untouched
    #[test]
    fn refused_write_changes_nothing() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        let before = handle.snapshot()?;

        let _ = handle.set_weight(&Session::new(), 42.0);
        let _ = handle.append_history_event(&Session::new(), "forged");

        assert_eq!(handle.snapshot()?, before);
        Ok(())
    }

    /// Drivers and dispatchers both pass the guard
    #[test]
    fn staff_roles_may_write() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");

        handle.set_status(&Session::login(Role::Dispatcher), ParcelStatus::Loaded)?;
        handle.append_history_event(&Session::login(Role::Driver), "Checked by driver")?;

        assert_eq!(handle.status(), ParcelStatus::Loaded);
        assert_eq!(handle.history()?[0].text, "Checked by driver");
        Ok(())
    }

    /// Switching a session back to customer revokes write access
    #[test]
    fn switching_role_revokes_access() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        let mut session = dispatcher();

        session.switch_role(Role::Customer);

        assert_denied(handle.set_weight(&session, 2.0));
    }
}

// VALIDATION TESTS
#[cfg(test)]
mod validation_tests {
    use super::*;

    /// Status may stay put or move one step, never skip or go back
    #[test]
    fn transitions_follow_the_state_machine() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        let session = dispatcher();

        let skip = handle.set_status(&session, ParcelStatus::InTransit);
        assert!(matches!(
            skip,
            Err(LogisticsError::InvalidTransition {
                from: ParcelStatus::Pending,
                to: ParcelStatus::InTransit,
                ..
            })
        ));

        handle.set_status(&session, ParcelStatus::Pending)?;
        handle.set_status(&session, ParcelStatus::Loaded)?;
        let back = handle.set_status(&session, ParcelStatus::Pending);
        assert!(matches!(back, Err(LogisticsError::InvalidTransition { .. })));
        assert_eq!(handle.status(), ParcelStatus::Loaded);
        Ok(())
    }

    /// Zero, negative and non-finite weights are rejected
    #[test]
    fn weight_must_be_positive() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        let session = dispatcher();

        for bad in [0.0, -1.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                handle.set_weight(&session, bad),
                Err(LogisticsError::InvalidWeight(_))
            ));
        }
        handle.set_weight(&session, 3.5)?;
        assert_eq!(handle.weight()?, 3.5);
        Ok(())
    }

    /// New history events go to the front
    #[test]
    fn history_is_newest_first() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_parcel(record("C01", ParcelStatus::Pending));
        let handle = loader.handle("C01");

        let event = handle.append_history_event(&dispatcher(), "Sorted")?;
        let history = handle.history()?;

        assert_eq!(history[0], event);
        assert_eq!(history[1].text, "Label created");
        Ok(())
    }
}

// NOTIFICATION TESTS
#[cfg(test)]
mod notification_tests {
    use super::*;

    /// A listener attached through one lookup hears writes made through another
    #[test]
    fn listener_sees_writes_through_shared_handle() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let cache = EntityCache::new();
        let customer_view = cache.get_or_create("C01", || loader.handle("C01"));
        let recorder = Recorder::<ParcelEvent>::new();
        customer_view.attach(recorder.clone());

        let dispatcher_view = cache.get_or_create("C01", || loader.handle("C01"));
        dispatcher_view.set_status(&dispatcher(), ParcelStatus::Loaded)?;

        assert_eq!(
            recorder.events(),
            [ParcelEvent {
                code: "C01".into(),
                change: ParcelChange::Status {
                    from: ParcelStatus::Pending,
                    to: ParcelStatus::Loaded,
                },
            }]
        );
        Ok(())
    }

    /// Refused or invalid writes are not broadcast
    #[test]
    fn failed_writes_are_silent() {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        let recorder = Recorder::<ParcelEvent>::new();
        handle.attach(recorder.clone());

        let _ = handle.set_weight(&Session::new(), 2.0);
        let _ = handle.set_weight(&dispatcher(), -2.0);

        assert_eq!(recorder.len(), 0);
    }

    /// Attaching twice registers once, detaching stops delivery
    #[test]
    fn attach_is_idempotent_and_detach_works() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let handle = loader.handle("C01");
        let recorder = Recorder::<ParcelEvent>::new();
        let listener: Arc<dyn Listener<ParcelEvent>> = recorder.clone();

        handle.attach(Arc::clone(&listener));
        handle.attach(Arc::clone(&listener));
        assert_eq!(handle.listener_count(), 1);

        handle.set_sender(&dispatcher(), "Zalando")?;
        handle.detach(&listener);
        handle.set_sender(&dispatcher(), "Ikea")?;

        assert_eq!(handle.listener_count(), 0);
        assert_eq!(recorder.len(), 1);
        Ok(())
    }

    /// Listeners may read the handle from inside the callback
    #[test]
    fn listener_can_read_back_the_handle() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let cache = EntityCache::new();
        let handle = cache.get_or_create("C01", || loader.handle("C01"));

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let watched = Arc::clone(&handle);
        handle.attach(Arc::new(move |_: &ParcelEvent| {
            *sink.lock() = Some(watched.status());
        }));

        handle.set_status(&dispatcher(), ParcelStatus::Loaded)?;

        assert_eq!(*seen.lock(), Some(ParcelStatus::Loaded));
        Ok(())
    }

    /// Loading a parcel onto a vehicle notifies vehicle listeners
    #[test]
    fn vehicle_broadcasts_loads() -> anyhow::Result<()> {
        let loader = MemoryLoader::new();
        loader.add_pending(&["C01"]);
        let parcel = Arc::new(loader.handle("C01"));
        let mut van = Vehicle::new("V01", VehicleKind::Van, 2)?;
        let recorder = Recorder::<VehicleEvent>::new();
        van.attach(recorder.clone());

        assert!(van.load_parcel(&dispatcher(), &parcel)?);

        assert_eq!(
            recorder.events(),
            [VehicleEvent {
                vehicle: "V01".into(),
                parcel: "C01".into(),
                load: 1,
                capacity: 2,
            }]
        );
        assert_eq!(parcel.status(), ParcelStatus::Loaded);
        Ok(())
    }
}
