use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::error::TaskError;
use crate::task::{Task, TaskId, TaskResult, TaskRun};

use super::core::Shared;
use super::state::{Admitted, Hooks};

impl<T: Task> Shared<T> {
    /// Admission pass. Starts as many queued tasks as free slots allow, then
    /// arms the deferred drain check if nothing is queued or running.
    pub(super) fn schedule(self: &Arc<Self>) {
        let (admitted, hooks, runtime, check_empty) = {
            let mut state = self.lock();
            let admitted = state.admit();
            let check_empty = state.take_empty_check();
            (admitted, state.hooks.clone(), state.runtime.clone(), check_empty)
        };
        // Admission only happens once started, and starting records the runtime.
        let Some(runtime) = runtime else {
            return;
        };

        for task in admitted {
            self.launch(&runtime, &hooks, task);
        }
        if check_empty {
            self.defer_empty_check(&runtime);
        }
    }

    /// Fire `on_task_start`, call `run`, capture the stop function and spawn
    /// the watcher that reports the outcome back. A record canceled after
    /// admission but before its launch is skipped entirely.
    fn launch(self: &Arc<Self>, runtime: &Handle, hooks: &Hooks<T>, admitted: Admitted<T>) {
        let Admitted { id, task } = admitted;
        if !self.lock().is_running(id) {
            trace!("Task {} canceled before launch, skipping", id);
            return;
        }
        debug!("Starting task {}", id);

        if let Some(on_start) = &hooks.on_task_start {
            on_start(&task);
        }
        let TaskRun { outcome, stop } = match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(run) => run,
            Err(payload) => {
                self.settle(id, Err(TaskError::Panicked(panic_message(payload.as_ref()))));
                return;
            }
        };

        if let Some(stop) = stop {
            let late = self.lock().attach_stop(id, stop);
            if let Some(stop) = late {
                debug!("Task {} was canceled while starting, stopping it", id);
                stop();
            }
        }

        let shared = Arc::clone(self);
        runtime.spawn(async move {
            let result = match AssertUnwindSafe(outcome).catch_unwind().await {
                Ok(result) => result.map_err(TaskError::Failed),
                Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            };
            shared.settle(id, result);
        });
    }

    /// Natural settlement of a running task.
    fn settle(self: &Arc<Self>, id: TaskId, result: TaskResult<T>) {
        let finished = {
            let mut state = self.lock();
            let record = state.finish(id, result.is_ok());
            record.map(|record| (record, state.hooks.on_task_end.clone()))
        };
        let Some((mut record, on_end)) = finished else {
            trace!("Ignoring outcome of canceled task {}", id);
            return;
        };

        match &result {
            Ok(_) => debug!("Task {} completed", id),
            Err(TaskError::Panicked(msg)) => warn!("Task {} panicked: {}", id, msg),
            Err(_) => debug!("Task {} failed", id),
        }
        if let Some(on_end) = on_end {
            on_end(&record.task, &result);
        }
        record.deliver(result);

        self.schedule();
    }

    /// Yield one scheduler turn, then report the drain unless the scheduler
    /// was refilled in the meantime.
    fn defer_empty_check(self: &Arc<Self>, runtime: &Handle) {
        let shared = Arc::clone(self);
        runtime.spawn(async move {
            tokio::task::yield_now().await;

            let on_empty = {
                let mut state = shared.lock();
                if !state.confirm_drained() {
                    return;
                }
                state.hooks.on_empty.clone()
            };
            info!("Scheduler drained");
            if let Some(on_empty) = on_empty {
                on_empty();
            }
            shared.drained.notify_waiters();
        });
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_common_payloads() {
        let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = panic::catch_unwind(|| panic!("job {} exploded", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "job 3 exploded");

        let payload = panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
