//! Scheduler - per-source self-rescheduling acquisition loop
//!
//! ## Responsibilities
//!
//! - acquire -> report -> wait -> repeat, one chain per source
//! - Single-flight acquisition per source
//! - Pause/resume without losing configuration
//! - Dropping results that target a superseded configuration
//!
//! Every scheduling field lives in one table behind one lock. A timer is
//! a spawned task that sleeps for the poll interval and then runs exactly
//! one cycle; cancelling it before it fires is a no-op for the chain.

mod instance;

pub use instance::InstanceInfo;

use crate::acquirer::Acquire;
use crate::error::{Error, Result};
use crate::source_config::{SourceConfig, SourceMode};
use crate::status_reporter::{LivenessStatus, SourceReport, StatusReporter};
use instance::{InstanceState, InstanceTable};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Immediate acquisition on configure
    Configure,
    /// Timer fire
    Timer,
}

/// Scheduler handle, cheap to clone
pub struct Scheduler<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Scheduler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A> {
    acquirer: A,
    reporter: StatusReporter,
    table: Mutex<InstanceTable>,
}

impl<A: Acquire> Scheduler<A> {
    /// Create new Scheduler emitting reports on `reports`
    pub fn new(acquirer: A, reports: mpsc::UnboundedSender<SourceReport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                acquirer,
                reporter: StatusReporter::new(reports),
                table: Mutex::new(InstanceTable::default()),
            }),
        }
    }

    /// (Re)establish a source
    ///
    /// Cancels the previous timer and in-flight acquisition, installs
    /// fresh state, and starts polling immediately for polling modes.
    /// Stream sources only get a connecting status.
    pub async fn configure(&self, identifier: &str, config: SourceConfig) -> Result<()> {
        let mut table = self.inner.table.lock().await;
        if table.closed {
            return Err(Error::ShutDown);
        }

        let generation = table.bump_generation();
        if let Some(mut prev) = table.instances.remove(identifier) {
            prev.cancel();
            tracing::debug!(
                identifier = %identifier,
                generation = prev.generation,
                "Superseded previous configuration"
            );
        }

        tracing::info!(
            identifier = %identifier,
            mode = %config.mode.as_str(),
            refresh_ms = config.refresh_interval.as_millis() as u64,
            generation = generation,
            "Source configured"
        );

        let mut state = InstanceState::new(config, generation);

        if state.config.mode == SourceMode::Stream {
            self.inner
                .reporter
                .status(identifier, LivenessStatus::Connecting);
        } else if state.config.polls() {
            let task = tokio::spawn(Arc::clone(&self.inner).run_cycle(
                identifier.to_string(),
                generation,
                Trigger::Configure,
            ));
            state.acquisition = Some(task.abort_handle());
        } else {
            tracing::info!(
                identifier = %identifier,
                "Snapshot source without refresh interval, not polling"
            );
        }

        table.instances.insert(identifier.to_string(), state);
        Ok(())
    }

    /// Stop arming timers for a source. An in-flight acquisition still
    /// completes and reports. Returns false for unknown sources.
    pub async fn pause(&self, identifier: &str) -> bool {
        let mut table = self.inner.table.lock().await;
        let Some(state) = table.instances.get_mut(identifier) else {
            return false;
        };

        state.paused = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        tracing::info!(identifier = %identifier, "Source paused");
        true
    }

    /// Re-enter the loop, starting with a full wait rather than an
    /// immediate acquisition. Returns false for unknown sources.
    pub async fn resume(&self, identifier: &str) -> bool {
        let mut table = self.inner.table.lock().await;
        let Some(state) = table.instances.get_mut(identifier) else {
            return false;
        };

        state.paused = false;
        self.inner.arm_timer(identifier, state);

        tracing::info!(identifier = %identifier, "Source resumed");
        true
    }

    /// Cancel everything and discard all state. No report is emitted
    /// once this returns, and further configures are rejected.
    pub async fn shutdown(&self) {
        let mut table = self.inner.table.lock().await;
        table.closed = true;

        let count = table.instances.len();
        for (_, mut state) in table.instances.drain() {
            state.cancel();
        }

        tracing::info!(sources = count, "Scheduler shut down");
    }

    /// View of one source
    pub async fn instance(&self, identifier: &str) -> Option<InstanceInfo> {
        let table = self.inner.table.lock().await;
        table
            .instances
            .get(identifier)
            .map(|state| state.info(identifier))
    }

    /// View of every source, ordered by identifier
    pub async fn instances(&self) -> Vec<InstanceInfo> {
        let table = self.inner.table.lock().await;
        let mut infos: Vec<_> = table
            .instances
            .iter()
            .map(|(id, state)| state.info(id))
            .collect();
        infos.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        infos
    }

    /// Current configuration of one source
    pub async fn config(&self, identifier: &str) -> Option<SourceConfig> {
        let table = self.inner.table.lock().await;
        table
            .instances
            .get(identifier)
            .map(|state| state.config.as_ref().clone())
    }
}

impl<A: Acquire> Inner<A> {
    /// One acquisition followed by re-arming the timer
    async fn run_cycle(self: Arc<Self>, identifier: String, generation: u64, trigger: Trigger) {
        self.poll_once(&identifier, generation, trigger).await;

        let mut table = self.table.lock().await;
        if let Some(state) = table.current(&identifier, generation) {
            self.arm_timer(&identifier, state);
        }
    }

    /// Arm the single timer for a source unless paused, already armed,
    /// or not a polling source
    fn arm_timer(self: &Arc<Self>, identifier: &str, state: &mut InstanceState) {
        if state.paused || state.timer.is_some() || !state.config.polls() {
            return;
        }

        let interval = state.config.poll_interval();
        let inner = Arc::clone(self);
        let id = identifier.to_string();
        let generation = state.generation;

        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            inner.run_cycle(id, generation, Trigger::Timer).await;
        });
        state.timer = Some(task.abort_handle());

        tracing::trace!(
            identifier = %identifier,
            interval_ms = interval.as_millis() as u64,
            "Next poll scheduled"
        );
    }

    /// Perform one acquisition unless one is already running, then report
    async fn poll_once(&self, identifier: &str, generation: u64, trigger: Trigger) {
        let config = {
            let mut table = self.table.lock().await;
            let Some(state) = table.current(identifier, generation) else {
                return;
            };

            // A fired timer owns the running task from here on
            let fired = match trigger {
                Trigger::Timer => state.timer.take(),
                Trigger::Configure => None,
            };

            if trigger == Trigger::Timer && state.paused {
                return;
            }

            if state.in_progress {
                tracing::debug!(
                    identifier = %identifier,
                    "Acquisition already in flight, skipping"
                );
                return;
            }

            state.in_progress = true;
            if fired.is_some() {
                state.acquisition = fired;
            }
            Arc::clone(&state.config)
        };

        let outcome = self.acquirer.acquire(&config).await;

        let mut table = self.table.lock().await;
        let Some(state) = table.current(identifier, generation) else {
            tracing::debug!(
                identifier = %identifier,
                generation = generation,
                "Dropping result for superseded configuration"
            );
            return;
        };

        state.in_progress = false;
        state.acquisition = None;

        match outcome {
            Ok(frame) => self.reporter.frame(identifier, &frame),
            Err(e) => self
                .reporter
                .failure(identifier, config.mode, &e, &mut state.errors),
        }
    }
}
