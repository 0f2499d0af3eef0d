use std::collections::HashMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::trace;

use crate::heap::PriorityHeap;
use crate::metrics::SchedulerMetrics;
use crate::task::{Comparator, StopFn, Task, TaskId, TaskResult};
use crate::types::SchedulerStatus;

pub type StartHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type EndHook<T> = Arc<dyn Fn(&T, &TaskResult<T>) + Send + Sync>;
pub type EmptyHook = Arc<dyn Fn() + Send + Sync>;

/// Notification callbacks. Cloned out of the state before being invoked so
/// they never run under the state lock.
pub(crate) struct Hooks<T: Task> {
    pub(crate) on_task_start: Option<StartHook<T>>,
    pub(crate) on_task_end: Option<EndHook<T>>,
    pub(crate) on_empty: Option<EmptyHook>,
}

impl<T: Task> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            on_task_start: None,
            on_task_end: None,
            on_empty: None,
        }
    }
}

impl<T: Task> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        Self {
            on_task_start: self.on_task_start.clone(),
            on_task_end: self.on_task_end.clone(),
            on_empty: self.on_empty.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RecordState {
    Queued,
    Running,
    Ended,
}

/// Bookkeeping for one submission.
pub(super) struct TaskRecord<T: Task> {
    pub(super) task: Arc<T>,
    pub(super) state: RecordState,
    pub(super) canceled: bool,
    /// Taken exactly once, when the outcome is delivered.
    sender: Option<oneshot::Sender<TaskResult<T>>>,
    pub(super) stop: Option<StopFn>,
}

impl<T: Task> TaskRecord<T> {
    /// Send the outcome to the handle. Returns false if it was already sent.
    pub(super) fn deliver(&mut self, result: TaskResult<T>) -> bool {
        match self.sender.take() {
            Some(tx) => {
                // The caller may have dropped its handle; that is not an error.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

/// Heap entry. Carries the task so the comparator can rank it without
/// touching the record arena.
pub(super) struct QueuedTask<T> {
    pub(super) id: TaskId,
    pub(super) task: Arc<T>,
}

/// A record promoted from Queued to Running by an admission pass.
pub(super) struct Admitted<T> {
    pub(super) id: TaskId,
    pub(super) task: Arc<T>,
}

/// Result of applying cancellation to a live record.
pub(super) enum Canceled<T: Task> {
    Queued {
        task: Arc<T>,
        sender: Option<oneshot::Sender<TaskResult<T>>>,
    },
    /// Removed from the running set; the caller finishes the protocol.
    Running(TaskRecord<T>),
}

fn queue_order<T: Task>(
    comparator: Comparator<T>,
) -> impl Fn(&QueuedTask<T>, &QueuedTask<T>) -> std::cmp::Ordering + Send + Sync + 'static {
    move |a, b| comparator(&a.task, &b.task)
}

/// All mutable scheduler state. Every transition is a plain method call made
/// while holding the scheduler lock; none of them run caller code.
pub(crate) struct RunnerState<T: Task> {
    pub(super) concurrency: usize,
    heap: PriorityHeap<QueuedTask<T>>,
    records: HashMap<TaskId, TaskRecord<T>>,
    running: usize,
    started: bool,
    paused: bool,
    stopped: bool,
    next_id: TaskId,
    /// `on_empty` already fired for the current drain; re-armed by submissions.
    drain_notified: bool,
    empty_check_pending: bool,
    pub(super) hooks: Hooks<T>,
    pub(super) metrics: SchedulerMetrics,
    pub(super) runtime: Option<Handle>,
}

impl<T: Task> RunnerState<T> {
    pub(super) fn new(concurrency: usize, comparator: Comparator<T>, hooks: Hooks<T>) -> Self {
        Self {
            concurrency,
            heap: PriorityHeap::new(queue_order(comparator)),
            records: HashMap::new(),
            running: 0,
            started: false,
            paused: false,
            stopped: false,
            next_id: 0,
            drain_notified: false,
            empty_check_pending: false,
            hooks,
            metrics: SchedulerMetrics::default(),
            runtime: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Returns false if already started.
    pub(super) fn start(&mut self, runtime: Handle) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        self.stopped = false;
        self.drain_notified = false;
        self.runtime = Some(runtime);
        true
    }

    pub(super) fn is_started(&self) -> bool {
        self.started
    }

    pub(super) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Mark not-started and drop the queue. Returns the discarded records;
    /// dropping them closes their handles' channels.
    pub(super) fn stop(&mut self) -> Vec<TaskRecord<T>> {
        self.started = false;
        self.stopped = true;

        let mut discarded = Vec::new();
        for queued in self.heap.drain() {
            if let Some(record) = self.records.remove(&queued.id) {
                if !record.canceled {
                    discarded.push(record);
                }
            }
        }
        self.metrics.discarded += discarded.len() as u64;
        discarded
    }

    pub(super) fn status(&self) -> SchedulerStatus {
        match (self.started, self.paused, self.stopped) {
            (true, true, _) => SchedulerStatus::Paused,
            (true, false, _) => SchedulerStatus::Active,
            (false, _, true) => SchedulerStatus::Stopped,
            (false, _, false) => SchedulerStatus::Idle,
        }
    }

    fn is_admitting(&self) -> bool {
        self.started && !self.paused
    }

    // ── Submission and admission ──────────────────────────────

    pub(super) fn enqueue(&mut self, task: Arc<T>, sender: oneshot::Sender<TaskResult<T>>) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;

        self.records.insert(
            id,
            TaskRecord {
                task: Arc::clone(&task),
                state: RecordState::Queued,
                canceled: false,
                sender: Some(sender),
                stop: None,
            },
        );
        self.heap.push(QueuedTask { id, task });
        self.metrics.submitted += 1;
        self.drain_notified = false;
        id
    }

    /// Admission pass: promote the highest-priority queued records until the
    /// concurrency bound is reached or the queue is exhausted. Records
    /// canceled while queued are dropped here without taking a slot.
    pub(super) fn admit(&mut self) -> Vec<Admitted<T>> {
        let mut admitted = Vec::new();
        if !self.is_admitting() {
            return admitted;
        }

        while self.running < self.concurrency {
            let Some(queued) = self.heap.pop() else {
                break;
            };
            let Some(record) = self.records.get_mut(&queued.id) else {
                continue;
            };
            if record.canceled {
                trace!("Dropping canceled task {} from queue", queued.id);
                self.records.remove(&queued.id);
                continue;
            }

            record.state = RecordState::Running;
            self.running += 1;
            self.metrics.record_start(self.running);
            admitted.push(Admitted {
                id: queued.id,
                task: queued.task,
            });
        }
        admitted
    }

    /// Whether `id` is still Running. Checked before launching an admitted
    /// record, since a cancel may land between admission and launch.
    pub(super) fn is_running(&self, id: TaskId) -> bool {
        matches!(self.records.get(&id), Some(record) if record.state == RecordState::Running)
    }

    /// Store the stop function of a freshly started task. If the task was
    /// canceled in the meantime the function is handed back to be called.
    pub(super) fn attach_stop(&mut self, id: TaskId, stop: StopFn) -> Option<StopFn> {
        match self.records.get_mut(&id) {
            Some(record) if record.state == RecordState::Running => {
                record.stop = Some(stop);
                None
            }
            _ => Some(stop),
        }
    }

    // ── Termination ───────────────────────────────────────────

    /// Natural settlement of a running task. `None` if the record already
    /// ended through cancellation.
    pub(super) fn finish(&mut self, id: TaskId, succeeded: bool) -> Option<TaskRecord<T>> {
        match self.records.get(&id) {
            Some(record) if record.state == RecordState::Running => {}
            _ => return None,
        }
        let mut record = self.records.remove(&id)?;
        record.state = RecordState::Ended;
        self.running = self.running.saturating_sub(1);
        if succeeded {
            self.metrics.succeeded += 1;
        } else {
            self.metrics.failed += 1;
        }
        Some(record)
    }

    /// Cancellation transition. `None` if the record is unknown or ended.
    ///
    /// A Running record frees its slot here, in the same critical section
    /// as the Ended transition, so a concurrent settlement can never
    /// decrement twice. Abort delivery, the stop function and `on_task_end`
    /// run afterwards outside the lock; `on_task_end` therefore already
    /// observes the freed slot.
    pub(super) fn cancel(&mut self, id: TaskId) -> Option<Canceled<T>> {
        let record = self.records.get_mut(&id)?;
        match record.state {
            RecordState::Ended => None,
            RecordState::Queued => {
                // Stays in the arena until the admission pass pops it.
                record.canceled = true;
                record.state = RecordState::Ended;
                self.metrics.aborted += 1;
                Some(Canceled::Queued {
                    task: Arc::clone(&record.task),
                    sender: record.sender.take(),
                })
            }
            RecordState::Running => {
                let mut record = self.records.remove(&id)?;
                record.canceled = true;
                record.state = RecordState::Ended;
                self.running = self.running.saturating_sub(1);
                self.metrics.aborted += 1;
                Some(Canceled::Running(record))
            }
        }
    }

    pub(super) fn running_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == RecordState::Running)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // ── Drain detection ───────────────────────────────────────

    fn is_drained(&self) -> bool {
        self.running == 0 && self.heap.is_empty()
    }

    /// Whether a deferred empty check should be scheduled now. At most one is
    /// pending at a time.
    pub(super) fn take_empty_check(&mut self) -> bool {
        if self.is_admitting() && self.is_drained() && !self.drain_notified && !self.empty_check_pending {
            self.empty_check_pending = true;
            return true;
        }
        false
    }

    /// Run by the deferred check one turn later. True if `on_empty` should
    /// fire, i.e. nothing refilled the scheduler in between.
    pub(super) fn confirm_drained(&mut self) -> bool {
        self.empty_check_pending = false;
        if self.is_admitting() && self.is_drained() && !self.drain_notified {
            self.drain_notified = true;
            self.metrics.record_drained();
            return true;
        }
        false
    }

    pub(super) fn has_notified_drain(&self) -> bool {
        self.drain_notified
    }

    // ── Introspection and options ─────────────────────────────

    pub(super) fn running(&self) -> usize {
        self.running
    }

    pub(super) fn queued(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state == RecordState::Queued)
            .count()
    }

    pub(super) fn set_comparator(&mut self, comparator: Comparator<T>) {
        self.heap.set_comparator(queue_order(comparator));
    }
}
