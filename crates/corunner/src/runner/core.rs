use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::handle::{CancelHandle, TaskHandle};
use crate::metrics::SchedulerMetrics;
use crate::task::{Comparator, Task, TaskResult};
use crate::types::{SchedulerConfig, SchedulerStatus};

use super::state::{Hooks, RunnerState};

/// State shared between the scheduler, its handles and its in-flight tasks.
pub(crate) struct Shared<T: Task> {
    state: Mutex<RunnerState<T>>,
    /// Woken whenever `on_empty` fires.
    pub(super) drained: Notify,
}

impl<T: Task> Shared<T> {
    /// Lock the state. Caller code never runs under this lock, so a poisoned
    /// lock still holds consistent state and is recovered.
    pub(super) fn lock(&self) -> MutexGuard<'_, RunnerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Priority-ordered, concurrency-bounded runner for asynchronous [`Task`]s.
///
/// At most `concurrency` tasks run at once; whenever a slot frees up the
/// highest-ranked queued task (per the comparator) is started. Every
/// submission returns a [`TaskHandle`] that resolves exactly once and can be
/// canceled whether the task is queued or running.
///
/// Cloning is cheap and yields another handle to the same scheduler.
pub struct Scheduler<T: Task> {
    pub(super) shared: Arc<Shared<T>>,
}

impl<T: Task> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Task> Scheduler<T> {
    /// Start configuring a scheduler ranked by `comparator`.
    pub fn builder(comparator: Comparator<T>) -> SchedulerBuilder<T> {
        SchedulerBuilder::new(comparator)
    }

    /// Create a scheduler with no notification callbacks.
    pub fn new(concurrency: usize, comparator: Comparator<T>) -> Result<Self, SchedulerError> {
        Self::builder(comparator).concurrency(concurrency).build()
    }

    /// Begin admitting work. Idempotent.
    ///
    /// Must be called from within a tokio runtime; running tasks are spawned
    /// onto that runtime from then on.
    pub fn start(&self) -> Result<(), SchedulerError> {
        {
            let mut state = self.shared.lock();
            if state.is_started() {
                return Ok(());
            }
            let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
            state.start(runtime);
            info!(
                "Scheduler started (concurrency: {}, queued: {})",
                state.concurrency,
                state.queued()
            );
        }
        self.shared.schedule();
        Ok(())
    }

    /// Stop admitting new work. Running tasks are unaffected.
    pub fn pause(&self) {
        self.shared.lock().set_paused(true);
        debug!("Scheduler paused");
    }

    /// Re-open admission and run an admission pass.
    pub fn resume(&self) {
        self.shared.lock().set_paused(false);
        debug!("Scheduler resumed");
        self.shared.schedule();
    }

    /// Abrupt reset: mark the scheduler not started and discard every queued
    /// task. Their handles resolve with [`TaskError::Discarded`]; running
    /// tasks continue to completion.
    ///
    /// [`TaskError::Discarded`]: crate::TaskError::Discarded
    pub fn stop(&self) {
        let discarded = self.shared.lock().stop();
        info!("Scheduler stopped, {} queued task(s) discarded", discarded.len());
        // Closes the handles' channels outside the lock.
        drop(discarded);
    }

    /// Submit a task. Returns immediately; the task starts once a slot is
    /// free and no higher-ranked task is waiting.
    pub fn add_task(&self, task: impl Into<Arc<T>>) -> TaskHandle<T> {
        let (tx, rx) = oneshot::channel();
        let (id, started) = {
            let mut state = self.shared.lock();
            let id = state.enqueue(task.into(), tx);
            (id, state.is_started())
        };
        debug!("Queued task {}", id);

        if started {
            self.shared.schedule();
        }
        TaskHandle::new(id, rx, CancelHandle::new(id, Arc::downgrade(&self.shared)))
    }

    /// Cancel every running task. Returns how many were canceled.
    pub fn cancel_running(&self) -> usize {
        self.shared.cancel_running()
    }

    /// Change the concurrency bound. Raising it admits queued work right away;
    /// lowering it lets running tasks finish without starting new ones.
    pub fn set_concurrency(&self, concurrency: usize) -> Result<(), SchedulerError> {
        if concurrency == 0 {
            return Err(SchedulerError::InvalidConcurrency(concurrency));
        }
        self.shared.lock().concurrency = concurrency;
        debug!("Concurrency set to {}", concurrency);
        self.shared.schedule();
        Ok(())
    }

    /// Replace the comparator and re-rank queued tasks.
    pub fn set_comparator(&self, comparator: Comparator<T>) {
        self.shared.lock().set_comparator(comparator);
    }

    pub fn set_on_task_start(&self, hook: impl Fn(&T) + Send + Sync + 'static) {
        self.shared.lock().hooks.on_task_start = Some(Arc::new(hook));
    }

    pub fn set_on_task_end(&self, hook: impl Fn(&T, &TaskResult<T>) + Send + Sync + 'static) {
        self.shared.lock().hooks.on_task_end = Some(Arc::new(hook));
    }

    pub fn set_on_empty(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shared.lock().hooks.on_empty = Some(Arc::new(hook));
    }

    pub fn status(&self) -> SchedulerStatus {
        self.shared.lock().status()
    }

    pub fn running_count(&self) -> usize {
        self.shared.lock().running()
    }

    /// Queued tasks that will still run (canceled ones excluded).
    pub fn queued_count(&self) -> usize {
        self.shared.lock().queued()
    }

    pub fn concurrency(&self) -> usize {
        self.shared.lock().concurrency
    }

    /// Snapshot of the scheduler counters.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared.lock().metrics.clone()
    }

    /// Wait for the scheduler to drain: resolves together with the next
    /// `on_empty` notification, or immediately if the current drain has
    /// already been reported.
    pub async fn wait_drained(&self) {
        let notified = self.shared.drained.notified();
        if self.shared.lock().has_notified_drain() {
            return;
        }
        notified.await;
    }
}

// ── SchedulerBuilder ─────────────────────────────────────────────────

/// Fluent builder for a [`Scheduler`].
///
/// # Example
/// ```ignore
/// let scheduler = Scheduler::builder(by_key(|job: &Job| job.priority))
///     .concurrency(4)
///     .on_empty(|| tracing::info!("all jobs done"))
///     .build()?;
/// ```
pub struct SchedulerBuilder<T: Task> {
    concurrency: usize,
    comparator: Comparator<T>,
    hooks: Hooks<T>,
}

impl<T: Task> SchedulerBuilder<T> {
    /// Concurrency defaults to [`SchedulerConfig::default`] resolved, i.e.
    /// the available parallelism.
    pub fn new(comparator: Comparator<T>) -> Self {
        Self {
            concurrency: SchedulerConfig::default().resolved_concurrency(),
            comparator,
            hooks: Hooks::default(),
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Take the concurrency bound from a loaded config.
    pub fn config(mut self, config: &SchedulerConfig) -> Self {
        self.concurrency = config.resolved_concurrency();
        self
    }

    pub fn on_task_start(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.hooks.on_task_start = Some(Arc::new(hook));
        self
    }

    pub fn on_task_end(mut self, hook: impl Fn(&T, &TaskResult<T>) + Send + Sync + 'static) -> Self {
        self.hooks.on_task_end = Some(Arc::new(hook));
        self
    }

    pub fn on_empty(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_empty = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Scheduler<T>, SchedulerError> {
        if self.concurrency == 0 {
            return Err(SchedulerError::InvalidConcurrency(self.concurrency));
        }
        Ok(Scheduler {
            shared: Arc::new(Shared {
                state: Mutex::new(RunnerState::new(self.concurrency, self.comparator, self.hooks)),
                drained: Notify::new(),
            }),
        })
    }
}
