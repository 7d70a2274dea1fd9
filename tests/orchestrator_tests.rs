use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use certgen::error::{OrchestratorError, StoreError};
use certgen::orchestrator::{
    BatchExit, BatchLauncher, CycleOutcome, Orchestrator, PendingCounter, State,
};

const INTERVAL: Duration = Duration::from_secs(60);

/// Replays scripted answers, then keeps returning the fallback.
struct ScriptedCounter {
    script: Mutex<VecDeque<Result<usize, StoreError>>>,
    fallback: usize,
    calls: AtomicUsize,
}

impl ScriptedCounter {
    fn always(n: usize) -> Arc<Self> {
        Self::scripted(Vec::new(), n)
    }

    fn scripted(script: Vec<Result<usize, StoreError>>, fallback: usize) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PendingCounter for ScriptedCounter {
    async fn pending(&self) -> Result<usize, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.fallback))
    }
}

/// Batch stand-in that takes `duration` and tracks concurrency.
struct SlowBatch {
    duration: Duration,
    fail_spawn: bool,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SlowBatch {
    fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            fail_spawn: false,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn unspawnable() -> Arc<Self> {
        Arc::new(Self {
            duration: Duration::ZERO,
            fail_spawn: true,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchLauncher for SlowBatch {
    async fn launch(&self) -> Result<BatchExit, OrchestratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_spawn {
            return Err(OrchestratorError::Spawn {
                command: "certgen".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(BatchExit {
            code: Some(0),
            stdout: "Batch complete: 1 attempted, 1 succeeded, 0 failed\n".to_string(),
            stderr: String::new(),
        })
    }
}

async fn advance_to(start: tokio::time::Instant, secs: u64) {
    tokio::time::sleep_until(start + Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_batch_is_never_overlapped() {
    let counter = ScriptedCounter::always(5);
    let batch = SlowBatch::new(Duration::from_secs(150));
    let orchestrator = Orchestrator::new(counter.clone(), batch.clone(), INTERVAL);
    let state = orchestrator.subscribe();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let start = tokio::time::Instant::now();
    let handle = tokio::spawn(orchestrator.run_until(async {
        let _ = stop_rx.await;
    }));

    advance_to(start, 1).await;
    assert_eq!(batch.calls(), 1);
    assert_eq!(batch.active(), 1);
    assert_eq!(*state.borrow(), State::Running);

    // Well past one poll interval, the first batch is still running.
    advance_to(start, 100).await;
    assert_eq!(batch.calls(), 1);
    assert_eq!(counter.calls(), 1);

    // Batch ended at 150s; the next poll is due at 210s.
    advance_to(start, 200).await;
    assert_eq!(batch.calls(), 1);
    assert_eq!(batch.active(), 0);
    assert_eq!(*state.borrow(), State::Idle);

    advance_to(start, 215).await;
    assert_eq!(batch.calls(), 2);

    stop_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(batch.calls(), 2);
    assert_eq!(batch.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_cycles_do_not_launch() {
    let counter = ScriptedCounter::always(0);
    let batch = SlowBatch::new(Duration::from_secs(1));
    let orchestrator = Orchestrator::new(counter.clone(), batch.clone(), INTERVAL);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let start = tokio::time::Instant::now();
    let handle = tokio::spawn(orchestrator.run_until(async {
        let _ = stop_rx.await;
    }));

    // Polls at 0s, 60s and 120s.
    advance_to(start, 130).await;
    assert_eq!(counter.calls(), 3);
    assert_eq!(batch.calls(), 0);

    stop_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_count_failure_still_rearms_timer() {
    let counter = ScriptedCounter::scripted(
        vec![Err(StoreError::Malformed("store offline".to_string()))],
        2,
    );
    let batch = SlowBatch::new(Duration::from_secs(5));
    let orchestrator = Orchestrator::new(counter.clone(), batch.clone(), INTERVAL);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let start = tokio::time::Instant::now();
    let handle = tokio::spawn(orchestrator.run_until(async {
        let _ = stop_rx.await;
    }));

    advance_to(start, 30).await;
    assert_eq!(counter.calls(), 1);
    assert_eq!(batch.calls(), 0);

    advance_to(start, 61).await;
    assert_eq!(counter.calls(), 2);
    assert_eq!(batch.calls(), 1);

    stop_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_is_contained() {
    let counter = ScriptedCounter::always(1);
    let batch = SlowBatch::unspawnable();
    let mut orchestrator = Orchestrator::new(counter.clone(), batch.clone(), INTERVAL);

    let outcome = orchestrator.cycle().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Failed(OrchestratorError::Spawn { .. })
    ));
    assert_eq!(orchestrator.state(), State::Idle);

    let outcome = orchestrator.cycle().await;
    assert!(matches!(outcome, CycleOutcome::Failed(_)));
    assert_eq!(batch.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_reports_batch_exit() {
    let counter = ScriptedCounter::always(3);
    let batch = SlowBatch::new(Duration::from_secs(10));
    let mut orchestrator = Orchestrator::new(counter, batch.clone(), INTERVAL);

    match orchestrator.cycle().await {
        CycleOutcome::Ran(exit) => {
            assert!(exit.success());
            assert!(exit.stdout.contains("1 succeeded"));
        }
        other => panic!("expected a batch run, got {:?}", other),
    }
    assert_eq!(orchestrator.state(), State::Idle);
    assert_eq!(batch.active(), 0);
}
