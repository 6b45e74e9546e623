//! Per-source scheduling state

use crate::source_config::{SourceConfig, SourceMode};
use crate::status_reporter::ErrorThrottle;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Mutable record for one configured source.
///
/// Only the scheduler touches these fields, always under the table lock.
#[derive(Debug)]
pub(crate) struct InstanceState {
    pub(crate) config: Arc<SourceConfig>,
    /// Bumped on every configure; results tagged with an older value are dropped
    pub(crate) generation: u64,
    /// Pending timer. Some iff a future poll is scheduled.
    pub(crate) timer: Option<AbortHandle>,
    /// Task currently acquiring, cancelled on reconfigure or shutdown only
    pub(crate) acquisition: Option<AbortHandle>,
    pub(crate) paused: bool,
    pub(crate) in_progress: bool,
    pub(crate) errors: ErrorThrottle,
}

impl InstanceState {
    pub(crate) fn new(config: SourceConfig, generation: u64) -> Self {
        Self {
            config: Arc::new(config),
            generation,
            timer: None,
            acquisition: None,
            paused: false,
            in_progress: false,
            errors: ErrorThrottle::default(),
        }
    }

    /// Cancel the pending timer and any in-flight acquisition
    pub(crate) fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(acquisition) = self.acquisition.take() {
            acquisition.abort();
        }
    }

    pub(crate) fn info(&self, identifier: &str) -> InstanceInfo {
        InstanceInfo {
            identifier: identifier.to_string(),
            mode: self.config.mode,
            generation: self.generation,
            paused: self.paused,
            in_progress: self.in_progress,
            timer_pending: self.timer.is_some(),
        }
    }
}

/// Read-only view of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub identifier: String,
    pub mode: SourceMode,
    pub generation: u64,
    pub paused: bool,
    pub in_progress: bool,
    pub timer_pending: bool,
}

/// Instance table guarded by the scheduler's lock
#[derive(Debug, Default)]
pub(crate) struct InstanceTable {
    pub(crate) instances: HashMap<String, InstanceState>,
    pub(crate) next_generation: u64,
    pub(crate) closed: bool,
}

impl InstanceTable {
    /// Entry for `identifier` if it still carries `generation`
    pub(crate) fn current(&mut self, identifier: &str, generation: u64) -> Option<&mut InstanceState> {
        self.instances
            .get_mut(identifier)
            .filter(|state| state.generation == generation)
    }

    pub(crate) fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}
