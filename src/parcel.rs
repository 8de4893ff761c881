//! Parcel handle: the shared object every viewer of a parcel holds
//!
//! A handle always carries the parcel's shadow state (`code` and `status`).
//! The full record with weight, parties and history is fetched from the
//! [`RecordLoader`] the first time anything beyond the shadow is needed and is
//! kept for the lifetime of the handle.
//!
//! Every write passes the caller's [`Session`] through the write guard before
//! anything else happens, so a refused write never reaches storage.
use super::error::{LogisticsError, Result};
use super::notify::{Listener, NotificationHub};
use super::session::Session;
use super::store::{IndexEntry, RecordLoader};
use super::types::{HistoryEvent, ParcelStatus};
use parking_lot::Mutex;
use std::sync::Arc;

/// Full parcel detail as produced by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRecord {
    pub code: String,
    pub weight: f64,
    pub sender: String,
    pub receiver: String,
    pub status: ParcelStatus,
    pub history: Vec<HistoryEvent>, // newest first
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParcelChange {
    Status {
        from: ParcelStatus,
        to: ParcelStatus,
    },
    Weight(f64),
    Sender(String),
    Receiver(String),
    History(HistoryEvent),
}

impl std::fmt::Display for ParcelChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParcelChange::Status { from, to } => write!(f, "status {from} -> {to}"),
            ParcelChange::Weight(weight) => write!(f, "weight set to {weight}"),
            ParcelChange::Sender(sender) => write!(f, "sender set to {sender}"),
            ParcelChange::Receiver(receiver) => write!(f, "receiver set to {receiver}"),
            ParcelChange::History(event) => write!(f, "history += {}", event.text),
        }
    }
}

/// Broadcast to a handle's listeners after every applied write.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelEvent {
    pub code: String,
    pub change: ParcelChange,
}

struct ParcelState {
    status: ParcelStatus,
    full: Option<ParcelRecord>,
}

pub struct ParcelHandle {
    code: String,
    state: Mutex<ParcelState>,
    loader: Arc<dyn RecordLoader>,
    hub: NotificationHub<ParcelEvent>,
}

impl ParcelHandle {
    /// Build a handle from an index row. Does not touch storage.
    pub fn new(entry: IndexEntry, loader: Arc<dyn RecordLoader>) -> Self {
        Self {
            code: entry.code,
            state: Mutex::new(ParcelState {
                status: entry.status,
                full: None,
            }),
            loader,
            hub: NotificationHub::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn status(&self) -> ParcelStatus {
        let state = self.state.lock();
        match &state.full {
            Some(record) => record.status,
            None => state.status,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().full.is_some()
    }

    pub fn weight(&self) -> Result<f64> {
        self.with_record(|record| Ok(record.weight))
    }

    pub fn sender(&self) -> Result<String> {
        self.with_record(|record| Ok(record.sender.clone()))
    }

    pub fn receiver(&self) -> Result<String> {
        self.with_record(|record| Ok(record.receiver.clone()))
    }

    /// Tracking history, newest event first.
    pub fn history(&self) -> Result<Vec<HistoryEvent>> {
        self.with_record(|record| Ok(record.history.clone()))
    }

    /// Copy of the full record, loading it if needed.
    pub fn snapshot(&self) -> Result<ParcelRecord> {
        self.with_record(|record| Ok(record.clone()))
    }

    pub fn set_status(&self, session: &Session, status: ParcelStatus) -> Result<()> {
        session.ensure_can_write("change parcel status")?;

        let from = self.with_record(|record| {
            if !record.status.can_advance_to(status) {
                return Err(LogisticsError::InvalidTransition {
                    code: record.code.clone(),
                    from: record.status,
                    to: status,
                });
            }
            let from = record.status;
            record.status = status;
            Ok(from)
        })?;

        self.state.lock().status = status;
        self.notify(ParcelChange::Status { from, to: status });
        Ok(())
    }

    pub fn set_weight(&self, session: &Session, weight: f64) -> Result<()> {
        session.ensure_can_write("change parcel weight")?;
        if !(weight.is_finite() && weight > 0.0) {
            return Err(LogisticsError::InvalidWeight(weight));
        }

        self.with_record(|record| {
            record.weight = weight;
            Ok(())
        })?;
        self.notify(ParcelChange::Weight(weight));
        Ok(())
    }

    pub fn set_sender(&self, session: &Session, sender: &str) -> Result<()> {
        session.ensure_can_write("change parcel sender")?;

        self.with_record(|record| {
            record.sender = sender.to_string();
            Ok(())
        })?;
        self.notify(ParcelChange::Sender(sender.to_string()));
        Ok(())
    }

    pub fn set_receiver(&self, session: &Session, receiver: &str) -> Result<()> {
        session.ensure_can_write("change parcel receiver")?;

        self.with_record(|record| {
            record.receiver = receiver.to_string();
            Ok(())
        })?;
        self.notify(ParcelChange::Receiver(receiver.to_string()));
        Ok(())
    }

    /// Prepends a new event and returns it so the caller can persist the same value.
    pub fn append_history_event(&self, session: &Session, text: &str) -> Result<HistoryEvent> {
        session.ensure_can_write("append parcel history")?;

        let event = HistoryEvent::new(text);
        self.with_record(|record| {
            record.history.insert(0, event.clone());
            Ok(())
        })?;
        self.notify(ParcelChange::History(event.clone()));
        Ok(event)
    }

    pub fn attach(&self, listener: Arc<dyn Listener<ParcelEvent>>) {
        self.hub.attach(listener);
    }

    pub fn detach(&self, listener: &Arc<dyn Listener<ParcelEvent>>) {
        self.hub.detach(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.hub.len()
    }

    // Runs `f` against the full record, loading it first if this handle has
    // never done so. The state lock is held across the load, so concurrent
    // callers cannot trigger a second fetch.
    fn with_record<R>(&self, f: impl FnOnce(&mut ParcelRecord) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock();
        let record = match state.full.take() {
            Some(record) => record,
            None => self.fetch()?,
        };
        let record = state.full.insert(record);
        f(record)
    }

    fn fetch(&self) -> Result<ParcelRecord> {
        tracing::debug!(code = %self.code, "lazy loading full parcel record");
        self.loader
            .load_full_record(&self.code)?
            .ok_or_else(|| LogisticsError::DataIntegrity(self.code.clone()))
    }

    // must run with the state lock released, listeners may read the handle
    fn notify(&self, change: ParcelChange) {
        self.hub.broadcast(&ParcelEvent {
            code: self.code.clone(),
            change,
        });
    }
}

impl std::fmt::Debug for ParcelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParcelHandle")
            .field("code", &self.code)
            .field("status", &self.status())
            .field("loaded", &self.is_loaded())
            .field("listeners", &self.hub.len())
            .finish()
    }
}
