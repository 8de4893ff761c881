//! Service layer API for fleet loading operations
//!
//! [`FleetFacade`] is the boundary the presentation layer talks to. Every
//! parcel it hands out goes through its [`EntityCache`], so dispatcher, driver
//! and customer views of the same code share one live handle.
use super::allocation::{AllocationReport, AllocationStrategy, NextFit};
use super::audit::AuditLog;
use super::cache::EntityCache;
use super::config::FleetConfig;
use super::error::{LogisticsError, Result};
use super::fleet::{Company, Vehicle, VehicleKind};
use super::notify::Listener;
use super::parcel::{ParcelEvent, ParcelHandle};
use super::session::Session;
use super::store::{IndexEntry, RecordLoader, SledStore};
use super::types::ParcelStatus;
use std::path::PathBuf;
use std::sync::Arc;

/// What a load run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub allocation: AllocationReport,
    /// Parcels moved to `IN_TRANSIT` because their vehicle filled up.
    pub dispatched: Vec<String>,
}

pub struct FleetFacade {
    store: Arc<dyn RecordLoader>,
    cache: EntityCache,
    strategy: Box<dyn AllocationStrategy>,
    config: FleetConfig,
    // loaded on first use, kept for the session
    companies: Option<Vec<Company>>,
    audit: Option<Arc<dyn Listener<ParcelEvent>>>,
}

impl FleetFacade {
    pub fn new(store: Arc<dyn RecordLoader>, config: FleetConfig) -> Self {
        let audit = config.audit_log.clone().map(audit_listener);
        Self {
            store,
            cache: EntityCache::new(),
            strategy: Box::new(NextFit),
            config,
            companies: None,
            audit,
        }
    }

    /// Open the sled store named by `config` and build a facade over it.
    pub fn open(config: FleetConfig) -> Result<Self> {
        let store = SledStore::open(&config.store_path)?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn with_audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit = Some(audit_listener(path.into()));
        self
    }

    pub fn set_allocation_strategy(&mut self, strategy: Box<dyn AllocationStrategy>) {
        tracing::info!(
            from = self.strategy.name(),
            to = strategy.name(),
            "allocation strategy changed"
        );
        self.strategy = strategy;
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Forget every handle and the fleet. Previously returned handles stay
    /// valid but are no longer the canonical instances.
    pub fn reset_session(&mut self) {
        self.cache.clear();
        self.companies = None;
    }

    /// Canonical handles for every parcel waiting in the warehouse.
    pub fn pending_parcels(&self) -> Result<Vec<Arc<ParcelHandle>>> {
        let index = self.store.load_pending_index()?;
        Ok(index.into_iter().map(|entry| self.resolve(entry)).collect())
    }

    /// Companies with their vehicles. Loaded from the store once per session.
    pub fn fleet(&mut self) -> Result<&[Company]> {
        Ok(self.companies_mut()?.as_slice())
    }

    pub fn find_parcel(&self, code: &str) -> Result<Option<Arc<ParcelHandle>>> {
        if let Some(handle) = self.cache.get(code) {
            tracing::debug!(code, "parcel served from cache");
            return Ok(Some(handle));
        }
        Ok(self
            .store
            .load_index_entry(code)?
            .map(|entry| self.resolve(entry)))
    }

    /// Rendered history of `code`, newest first. Unknown codes have none.
    pub fn history(&self, code: &str) -> Result<Vec<String>> {
        let events = match self.cache.get(code) {
            Some(handle) => handle.history()?,
            None => self
                .store
                .load_full_record(code)?
                .map(|record| record.history)
                .unwrap_or_default(),
        };
        Ok(events.iter().map(ToString::to_string).collect())
    }

    /// Allocate every pending parcel, persist the placements and dispatch
    /// the vehicles that ended up exactly full.
    pub fn execute_load(&mut self, session: &Session) -> Result<LoadReport> {
        session.ensure_can_write("execute a fleet load")?;

        let pending = self.pending_parcels()?;
        if pending.is_empty() {
            return Err(LogisticsError::EmptyQueue);
        }
        if self
            .companies_mut()?
            .iter()
            .all(|company| company.fleet().is_empty())
        {
            return Err(LogisticsError::NoFleet);
        }

        let result = self.run_load(session, &pending);
        if let Err(err) = &result {
            tracing::warn!(%err, "fleet load failed");
            self.discard_loaded_state(&pending);
        }
        result
    }

    fn run_load(
        &mut self,
        session: &Session,
        pending: &[Arc<ParcelHandle>],
    ) -> Result<LoadReport> {
        let FleetFacade {
            store,
            strategy,
            companies,
            audit,
            ..
        } = self;
        let companies = companies.as_mut().ok_or(LogisticsError::NoFleet)?;
        let audit = audit.clone();

        let mut vehicles: Vec<&mut Vehicle> = companies
            .iter_mut()
            .flat_map(|company| company.fleet_mut().iter_mut())
            .collect();

        if let Some(listener) = &audit {
            for parcel in pending {
                parcel.attach(Arc::clone(listener));
            }
        }

        tracing::info!(
            strategy = strategy.name(),
            pending = pending.len(),
            vehicles = vehicles.len(),
            "starting fleet load"
        );
        let allocation = strategy.allocate(session, pending, &mut vehicles)?;
        store.save_placements(&allocation.placements)?;

        let mut dispatched = Vec::new();
        for company in companies.iter() {
            let departure = format!("Departed with {}", company.name());
            // a vehicle leaves only once exactly full, partial loads wait
            for vehicle in company.fleet().iter().filter(|v| v.is_full()) {
                for parcel in vehicle.load() {
                    if parcel.status() != ParcelStatus::Loaded {
                        continue;
                    }
                    if let Some(listener) = &audit {
                        parcel.attach(Arc::clone(listener));
                    }

                    parcel.set_status(session, ParcelStatus::InTransit)?;
                    let event = parcel.append_history_event(session, &departure)?;
                    store.save_status(parcel.code(), ParcelStatus::InTransit)?;
                    store.append_history(parcel.code(), &event)?;
                    dispatched.push(parcel.code().to_string());
                }
            }
        }

        tracing::info!(
            placed = allocation.placements.len(),
            unplaced = allocation.unplaced.len(),
            dispatched = dispatched.len(),
            "fleet load finished"
        );
        Ok(LoadReport {
            allocation,
            dispatched,
        })
    }

    /// Record a stop at `location` for every parcel in transit on the vehicle.
    /// Returns how many history events were appended.
    pub fn register_leg(
        &mut self,
        session: &Session,
        vehicle_code: &str,
        location: &str,
    ) -> Result<usize> {
        session.ensure_can_write("register a vehicle leg")?;

        let parcels: Vec<Arc<ParcelHandle>> = self
            .companies_mut()?
            .iter()
            .flat_map(|company| company.fleet())
            .find(|vehicle| vehicle.code() == vehicle_code)
            .ok_or_else(|| LogisticsError::VehicleNotFound(vehicle_code.to_string()))?
            .load()
            .to_vec();
        if parcels.is_empty() {
            return Err(LogisticsError::EmptyVehicle(vehicle_code.to_string()));
        }

        let message = format!("Arrived at hub: {location}");
        let mut appended = 0;
        for parcel in parcels
            .iter()
            .filter(|p| p.status() == ParcelStatus::InTransit)
        {
            if let Some(listener) = &self.audit {
                parcel.attach(Arc::clone(listener));
            }
            let event = parcel.append_history_event(session, &message)?;
            self.store.append_history(parcel.code(), &event)?;
            appended += 1;
        }

        tracing::info!(vehicle = vehicle_code, location, appended, "leg registered");
        Ok(appended)
    }

    /// Create a vehicle of `kind` with the configured capacity, persist it and
    /// add it to the session fleet. Vehicle codes are unique across the fleet.
    pub fn register_vehicle(
        &mut self,
        session: &Session,
        company: &str,
        kind: VehicleKind,
        code: &str,
    ) -> Result<()> {
        session.ensure_can_write("register a vehicle")?;

        let vehicle = Vehicle::new(code, kind, self.config.capacity_for(kind))?;
        let owner = Company::new(company)?;

        // the session fleet may be filtered, the store sees every company
        let in_session = self
            .companies_mut()?
            .iter()
            .any(|c| c.vehicle(code).is_some());
        if in_session || self.store.has_vehicle(code)? {
            return Err(LogisticsError::DuplicateVehicle(code.to_string()));
        }

        self.store
            .save_vehicle(vehicle.code(), vehicle.kind(), vehicle.capacity(), company)?;
        tracing::info!(company, %vehicle, "vehicle registered");

        let visible = self
            .config
            .company
            .as_deref()
            .is_none_or(|filter| filter == company);
        if !visible {
            return Ok(());
        }
        let companies = self.companies_mut()?;
        let index = match companies.binary_search_by(|c| c.name().cmp(company)) {
            Ok(index) => index,
            Err(index) => {
                companies.insert(index, owner);
                index
            }
        };
        companies[index].add_vehicle(vehicle)
    }

    /// Vehicles currently carrying parcels, in fleet order.
    pub fn vehicles_in_service(&mut self) -> Result<Vec<&Vehicle>> {
        Ok(self
            .companies_mut()?
            .iter()
            .flat_map(|company| company.fleet())
            .filter(|vehicle| !vehicle.is_empty())
            .collect())
    }

    fn resolve(&self, entry: IndexEntry) -> Arc<ParcelHandle> {
        let loader = Arc::clone(&self.store);
        let code = entry.code.clone();
        self.cache
            .get_or_create(&code, move || ParcelHandle::new(entry, loader))
    }

    // A failed load may leave handles and vehicles ahead of the store. Drop
    // them so the next access reads the stored state back.
    fn discard_loaded_state(&mut self, pending: &[Arc<ParcelHandle>]) {
        let mut codes: Vec<String> = pending.iter().map(|p| p.code().to_string()).collect();
        if let Some(companies) = self.companies.take() {
            for vehicle in companies.iter().flat_map(|c| c.fleet()) {
                codes.extend(vehicle.load().iter().map(|p| p.code().to_string()));
            }
        }
        for code in &codes {
            self.cache.evict(code);
        }
        tracing::debug!(evicted = codes.len(), "session state discarded");
    }

    fn companies_mut(&mut self) -> Result<&mut Vec<Company>> {
        let companies = match self.companies.take() {
            Some(companies) => companies,
            None => self.load_companies()?,
        };
        Ok(self.companies.insert(companies))
    }

    fn load_companies(&self) -> Result<Vec<Company>> {
        let records = self.store.load_fleet(self.config.company.as_deref())?;

        let mut companies: Vec<Company> = Vec::new();
        for record in records {
            let mut vehicle = Vehicle::new(&record.code, record.kind, record.capacity)?;
            for entry in record.load {
                vehicle.restore(self.resolve(entry))?;
            }

            // records arrive grouped by company
            if companies
                .last()
                .is_none_or(|company| company.name() != record.company)
            {
                companies.push(Company::new(&record.company)?);
            }
            if let Some(company) = companies.last_mut() {
                company.add_vehicle(vehicle)?;
            }
        }

        tracing::info!(
            companies = companies.len(),
            vehicles = companies.iter().map(|c| c.fleet().len()).sum::<usize>(),
            "fleet loaded"
        );
        Ok(companies)
    }
}

fn audit_listener(path: PathBuf) -> Arc<dyn Listener<ParcelEvent>> {
    Arc::new(AuditLog::new(path))
}
