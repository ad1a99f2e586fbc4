//! Cancellable delayed tasks.

use std::{
    io,
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, warn};

#[derive(Default)]
struct Cancel {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// A closure that runs on its own thread after a delay unless cancelled first.
pub struct ScheduledTask {
    label: String,
    cancel: Arc<Cancel>,
    handle: Option<JoinHandle<bool>>,
}

impl ScheduledTask {
    pub fn spawn(
        label: impl Into<String>,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<Self> {
        let label = label.into();
        let cancel = Arc::new(Cancel::default());
        let waiter = Arc::clone(&cancel);

        let handle = thread::Builder::new().name(label.clone()).spawn(move || {
            let guard = waiter.cancelled.lock().unwrap_or_else(|e| e.into_inner());
            let (guard, _) = waiter
                .wake
                .wait_timeout_while(guard, delay, |cancelled| !*cancelled)
                .unwrap_or_else(|e| e.into_inner());
            if *guard {
                return false;
            }
            drop(guard);
            f();
            true
        })?;

        Ok(Self { label, cancel, handle: Some(handle) })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Prevent the task from running if it has not fired yet.
    pub fn cancel(&self) {
        let mut cancelled = self.cancel.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        self.cancel.wake.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the task, returning whether it ran.
    pub fn join(mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        match handle.join() {
            Ok(ran) => ran,
            Err(_) => {
                warn!("Scheduled task {} panicked", self.label);
                false
            }
        }
    }
}

/// Owner of fire-and-forget tasks.
#[derive(Default)]
pub struct Scheduler {
    pending: Mutex<Vec<ScheduledTask>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` after `delay`; the task is kept until [`Scheduler::wait_idle`].
    pub fn after(
        &self,
        label: impl Into<String>,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<()> {
        let task = ScheduledTask::spawn(label, delay, f)?;
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|task| !task.is_finished());
        pending.push(task);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.iter().filter(|task| !task.is_finished()).count()
    }

    /// Block until every scheduled task has run.
    pub fn wait_idle(&self) {
        let tasks: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).collect()
        };
        for task in tasks {
            let label = task.label().to_string();
            let ran = task.join();
            debug!("Scheduled task {label} done (ran: {ran})");
        }
    }
}
