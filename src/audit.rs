//! Append-only audit trail of parcel changes, written as plain text lines
use super::notify::Listener;
use super::parcel::ParcelEvent;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Parcel listener appending one line per change to a file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl Listener<ParcelEvent> for AuditLog {
    fn on_change(&self, event: &ParcelEvent) {
        let line = format!(
            "[{}] UPDATE: parcel {} {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            event.code,
            event.change
        );
        // listeners cannot fail the write that triggered them
        if let Err(err) = self.append(&line) {
            tracing::error!(path = %self.path.display(), %err, "failed to write audit line");
        }
    }
}
