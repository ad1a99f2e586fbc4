//! Observable export progress.
//!
//! A [`ProgressStore`] is shared between the exporter (the only writer) and any
//! number of observers. Every mutation publishes one [`ExportProgress`]
//! snapshot to each live subscriber. The store also owns export identity: only
//! one export may be active, and updates tagged with a stale [`ExportId`] are
//! dropped.

use std::{
    fmt,
    sync::{
        Mutex, MutexGuard,
        mpsc::{self, Receiver, Sender},
    },
};

use log::debug;

use crate::{
    error::{Error, Result},
    model::ExportAsSettings,
    state::ExportState,
};

/// Identity of one started export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExportId(u64);

impl ExportId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Progress of the current export as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportProgress {
    pub exporting: bool,
    pub error_export: bool,
    pub family_exported: Option<String>,
    pub variant_to_export: Option<usize>,
    pub exported_variant: usize,
    pub state: ExportState,
}

impl ExportProgress {
    fn clear_counters(&mut self) {
        self.family_exported = None;
        self.variant_to_export = None;
        self.exported_variant = 0;
    }
}

#[derive(Default)]
struct Inner {
    progress: ExportProgress,
    active: Option<ExportId>,
    next_id: u64,
    export_as: Option<ExportAsSettings>,
    subscribers: Vec<Sender<ExportProgress>>,
}

impl Inner {
    fn publish(&mut self) {
        let snapshot = self.progress.clone();
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    fn check_active(&self, id: ExportId) -> Result<()> {
        if self.active == Some(id) {
            Ok(())
        } else {
            debug!("Dropping update from inactive export {id}");
            Err(Error::Inactive(id.get()))
        }
    }
}

/// Shared, observable export state.
#[derive(Default)]
pub struct ProgressStore {
    inner: Mutex<Inner>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking observer must not wedge exports.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> Receiver<ExportProgress> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> ExportProgress {
        self.lock().progress.clone()
    }

    pub fn active(&self) -> Option<ExportId> {
        self.lock().active
    }

    /// Claim the store for a new export.
    ///
    /// `family` and `variants` are recorded for family exports; single font
    /// exports pass `None` and only flip `exporting`.
    pub fn begin(&self, family: Option<(&str, usize)>) -> Result<ExportId> {
        let mut inner = self.lock();
        if let Some(active) = inner.active {
            return Err(Error::ExportInFlight(active.get()));
        }

        inner.next_id += 1;
        let id = ExportId(inner.next_id);
        inner.active = Some(id);

        let progress = &mut inner.progress;
        progress.exporting = true;
        progress.error_export = false;
        progress.clear_counters();
        if let Some((name, count)) = family {
            progress.family_exported = Some(name.to_string());
            progress.variant_to_export = Some(count);
        }
        inner.publish();
        Ok(id)
    }

    /// Move the active export to `state`.
    pub fn enter(&self, id: ExportId, state: ExportState) -> Result<()> {
        let mut inner = self.lock();
        inner.check_active(id)?;
        inner.progress.state = inner.progress.state.enter(state)?;
        inner.publish();
        Ok(())
    }

    /// Count one more rendered variant, returning the new total.
    pub fn record_rendered(&self, id: ExportId) -> Result<usize> {
        let mut inner = self.lock();
        inner.check_active(id)?;

        let progress = &mut inner.progress;
        let expected = progress.variant_to_export.unwrap_or(0);
        if progress.exported_variant >= expected {
            return Err(Error::ProgressOverflow {
                exported: progress.exported_variant + 1,
                expected,
            });
        }
        progress.exported_variant += 1;
        let exported = progress.exported_variant;
        inner.publish();
        Ok(exported)
    }

    /// End the active export successfully and reset progress.
    pub fn finish(&self, id: ExportId) -> Result<()> {
        let mut inner = self.lock();
        inner.check_active(id)?;

        let progress = &mut inner.progress;
        progress.state = progress.state.enter(ExportState::Idle)?;
        progress.exporting = false;
        progress.clear_counters();
        inner.active = None;
        inner.publish();
        Ok(())
    }

    /// End the active export with an error.
    ///
    /// Publishes `error_export` with counters cleared, then settles in `Idle`
    /// so the next export can start. Returns `false` if `id` was not active.
    pub fn fail(&self, id: ExportId) -> bool {
        let mut inner = self.lock();
        if inner.check_active(id).is_err() {
            return false;
        }

        let progress = &mut inner.progress;
        if !progress.state.is_idle() {
            progress.state = ExportState::Errored;
        }
        progress.exporting = false;
        progress.error_export = true;
        progress.clear_counters();
        inner.publish();

        inner.progress.state = ExportState::Idle;
        inner.active = None;
        true
    }

    /// Clear a reported error once it has been shown.
    pub fn dismiss_error(&self) {
        let mut inner = self.lock();
        if inner.progress.error_export {
            inner.progress.error_export = false;
            inner.publish();
        }
    }

    pub fn set_export_as(&self, settings: ExportAsSettings) {
        self.lock().export_as = Some(settings);
    }

    pub fn export_as(&self) -> Option<ExportAsSettings> {
        self.lock().export_as
    }
}
