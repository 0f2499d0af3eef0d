//! Timing scenarios for the corunner scheduler.
//!
//! Every test runs on a paused tokio clock, so the millisecond timings below
//! are virtual and deterministic up to timer granularity.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corunner::{by_key, Scheduler, Task, TaskError, TaskRun};
use tokio::time::{sleep, Instant};

const TOLERANCE_MS: u64 = 20;
const DURATIONS: [u64; 4] = [300, 100, 500, 100];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Sleeps for a fixed duration, then yields its index.
#[derive(Debug)]
struct Timed {
    index: usize,
    duration: Duration,
}

impl Task for Timed {
    type Output = usize;
    type Error = String;

    fn run(&self) -> TaskRun<usize, String> {
        let (index, duration) = (self.index, self.duration);
        TaskRun::new(async move {
            sleep(duration).await;
            Ok(index)
        })
    }
}

/// Start/end log keyed by task index, with the virtual time of each event.
#[derive(Default)]
struct Timeline {
    starts: Mutex<Vec<(usize, Duration)>>,
    ends: Mutex<Vec<(usize, bool)>>,
}

impl Timeline {
    fn start_order(&self) -> Vec<usize> {
        self.starts.lock().unwrap().iter().map(|(i, _)| *i).collect()
    }

    fn started_at(&self, index: usize) -> Option<Duration> {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, at)| *at)
    }

    fn end_order(&self) -> Vec<usize> {
        self.ends.lock().unwrap().iter().map(|(i, _)| *i).collect()
    }
}

fn assert_near(actual: Duration, expected_ms: u64) {
    let actual_ms = actual.as_millis() as u64;
    assert!(
        actual_ms.abs_diff(expected_ms) <= TOLERANCE_MS,
        "expected ~{expected_ms}ms, got {actual_ms}ms"
    );
}

fn scheduler_with_timeline() -> (Scheduler<Timed>, Arc<Timeline>) {
    let origin = Instant::now();
    let timeline = Arc::new(Timeline::default());
    let (on_start, on_end) = (Arc::clone(&timeline), Arc::clone(&timeline));

    let scheduler = Scheduler::builder(by_key(|t: &Timed| t.index))
        .concurrency(2)
        .on_task_start(move |t: &Timed| {
            on_start.starts.lock().unwrap().push((t.index, origin.elapsed()));
        })
        .on_task_end(move |t: &Timed, result| {
            on_end.ends.lock().unwrap().push((t.index, result.is_ok()));
        })
        .build()
        .unwrap();
    (scheduler, timeline)
}

fn submit_all(scheduler: &Scheduler<Timed>) -> Vec<corunner::TaskHandle<Timed>> {
    DURATIONS
        .iter()
        .enumerate()
        .map(|(index, ms)| {
            scheduler.add_task(Timed {
                index,
                duration: Duration::from_millis(*ms),
            })
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn runs_in_priority_order_within_bound() {
    init_tracing();
    let (scheduler, timeline) = scheduler_with_timeline();
    let handles = submit_all(&scheduler);
    scheduler.start().unwrap();

    for (index, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), index);
    }
    scheduler.wait_drained().await;

    assert_eq!(timeline.start_order(), vec![0, 1, 2, 3]);
    assert_eq!(timeline.end_order(), vec![1, 0, 3, 2]);
    assert_near(timeline.started_at(2).unwrap(), 100);
    assert_near(timeline.started_at(3).unwrap(), 300);
    assert_eq!(scheduler.metrics().peak_running, 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_running_task_hands_slot_to_next() {
    init_tracing();
    let (scheduler, timeline) = scheduler_with_timeline();
    let mut handles = submit_all(&scheduler);
    scheduler.start().unwrap();

    sleep(Duration::from_millis(200)).await;
    let third = handles.remove(2);
    third.cancel();
    match third.await {
        Err(TaskError::Aborted(err)) => assert_eq!(err.task().index, 2),
        other => panic!("expected abort, got {other:?}"),
    }

    for handle in handles {
        handle.await.unwrap();
    }
    scheduler.wait_drained().await;

    assert_eq!(timeline.start_order(), vec![0, 1, 2, 3]);
    assert_near(timeline.started_at(3).unwrap(), 200);

    // Tasks 0 and 3 both end at ~300ms; their relative order is unspecified.
    let ends = timeline.end_order();
    assert_eq!(ends[..2], [1, 2]);
    assert_eq!(ends[2..].iter().copied().collect::<HashSet<_>>(), HashSet::from([0, 3]));
    assert!(!timeline.ends.lock().unwrap()[1].1, "canceled task reported as failed");
}

#[tokio::test(start_paused = true)]
async fn cancel_queued_task_never_starts() {
    init_tracing();
    let (scheduler, timeline) = scheduler_with_timeline();
    let mut handles = submit_all(&scheduler);
    scheduler.start().unwrap();

    sleep(Duration::from_millis(200)).await;
    let fourth = handles.remove(3);
    let canceled_at = Instant::now();
    fourth.cancel();
    assert!(fourth.await.unwrap_err().is_aborted());
    assert!(canceled_at.elapsed() < Duration::from_millis(TOLERANCE_MS));

    for handle in handles {
        handle.await.unwrap();
    }
    scheduler.wait_drained().await;

    assert_eq!(timeline.start_order(), vec![0, 1, 2]);
    assert_eq!(timeline.end_order(), vec![1, 0, 2]);
    assert_eq!(scheduler.metrics().aborted, 1);
}

/// Four 100ms steps, checking a stop flag before each one.
#[derive(Debug)]
struct Stepper {
    steps: Arc<Mutex<Vec<u32>>>,
}

impl Task for Stepper {
    type Output = u32;
    type Error = String;

    fn run(&self) -> TaskRun<u32, String> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let steps = Arc::clone(&self.steps);

        TaskRun::new(async move {
            for step in 1..=4 {
                sleep(Duration::from_millis(100)).await;
                if flag.load(Ordering::SeqCst) {
                    return Err(format!("stopped before step {step}"));
                }
                steps.lock().unwrap().push(step);
            }
            Ok(4)
        })
        .with_stop(move || stop.store(true, Ordering::SeqCst))
    }
}

#[tokio::test(start_paused = true)]
async fn stoppable_task_halts_between_steps() {
    init_tracing();
    let scheduler = Scheduler::new(1, by_key(|_: &Stepper| 0)).unwrap();
    scheduler.start().unwrap();

    let steps = Arc::new(Mutex::new(Vec::new()));
    let handle = scheduler.add_task(Stepper {
        steps: Arc::clone(&steps),
    });
    sleep(Duration::from_millis(250)).await;
    handle.cancel();
    assert!(handle.await.unwrap_err().is_aborted());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(*steps.lock().unwrap(), vec![1, 2]);
    assert_eq!(scheduler.running_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stoppable_task_completes_when_left_alone() {
    init_tracing();
    let scheduler = Scheduler::new(1, by_key(|_: &Stepper| 0)).unwrap();
    scheduler.start().unwrap();

    let steps = Arc::new(Mutex::new(Vec::new()));
    let handle = scheduler.add_task(Stepper {
        steps: Arc::clone(&steps),
    });
    assert_eq!(handle.await.unwrap(), 4);
    assert_eq!(*steps.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_queue_until_restart() {
    init_tracing();
    let (scheduler, timeline) = scheduler_with_timeline();
    let mut handles = submit_all(&scheduler);
    scheduler.start().unwrap();
    scheduler.stop();

    let queued: Vec<_> = handles.drain(2..).collect();
    for handle in queued {
        assert!(handle.await.unwrap_err().is_discarded());
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let resubmitted = scheduler.add_task(Timed {
        index: 7,
        duration: Duration::from_millis(10),
    });
    sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.queued_count(), 1);

    scheduler.start().unwrap();
    assert_eq!(resubmitted.await.unwrap(), 7);
    assert_eq!(timeline.start_order(), vec![0, 1, 7]);
}
