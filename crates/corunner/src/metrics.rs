use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters describing what a scheduler has done so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks handed to `add_task`.
    pub submitted: u64,
    /// Tasks whose `run` was invoked.
    pub started: u64,
    /// Tasks that resolved with a value.
    pub succeeded: u64,
    /// Tasks that resolved with their own error.
    pub failed: u64,
    /// Tasks canceled through their handle, queued or running.
    pub aborted: u64,
    /// Queued tasks dropped by `stop()`.
    pub discarded: u64,
    /// Highest number of tasks running at the same time.
    pub peak_running: usize,
    /// When the scheduler last reported itself drained.
    pub last_drained_at: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    pub(crate) fn record_start(&mut self, running: usize) {
        self.started += 1;
        self.peak_running = self.peak_running.max(running);
    }

    pub(crate) fn record_drained(&mut self) {
        self.last_drained_at = Some(Utc::now());
    }

    /// Tasks that reached a terminal outcome.
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.aborted
    }
}
