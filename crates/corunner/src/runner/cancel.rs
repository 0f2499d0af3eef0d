use std::sync::Arc;

use tracing::debug;

use crate::error::{AbortError, TaskError};
use crate::task::{Task, TaskId, TaskResult};

use super::core::Shared;
use super::state::Canceled;

fn aborted<T: Task>(task: &Arc<T>) -> TaskResult<T> {
    Err(TaskError::Aborted(AbortError::new(Arc::clone(task))))
}

impl<T: Task> Shared<T> {
    /// Cancel one submission. No-op once the task has ended.
    ///
    /// The handle is rejected with an abort error right away. A running task
    /// is additionally asked to stop, reported to `on_task_end` and its slot
    /// handed to the next queued task; whatever its outcome future yields
    /// later is ignored.
    pub(crate) fn cancel(self: &Arc<Self>, id: TaskId) {
        let (canceled, on_end) = {
            let mut state = self.lock();
            let Some(canceled) = state.cancel(id) else {
                return;
            };
            (canceled, state.hooks.on_task_end.clone())
        };

        match canceled {
            Canceled::Queued { task, sender } => {
                debug!("Canceled queued task {}", id);
                if let Some(tx) = sender {
                    let _ = tx.send(aborted(&task));
                }
            }
            Canceled::Running(mut record) => {
                debug!("Canceled running task {}", id);
                record.deliver(aborted(&record.task));

                if let Some(stop) = record.stop.take() {
                    stop();
                }
                if let Some(on_end) = on_end {
                    on_end(&record.task, &aborted(&record.task));
                }
                self.schedule();
            }
        }
    }

    pub(super) fn cancel_running(self: &Arc<Self>) -> usize {
        let ids = self.lock().running_ids();
        for id in &ids {
            self.cancel(*id);
        }
        ids.len()
    }
}
