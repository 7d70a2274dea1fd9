//! Polling supervisor.
//!
//! Two states. While `Idle` the orchestrator waits out the poll interval,
//! then asks the store how many records are pending. A non-zero count moves
//! it to `Running`: one batch process is spawned and awaited to exit, after
//! which it is `Idle` again and the interval restarts. Because the timer is
//! only re-armed after a cycle completes, two batches can never overlap.
//! The current state is published on a `watch` channel (`subscribe`).

use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{OrchestratorError, StoreError};
use crate::store::{Filter, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
}

/// How a spawned batch ended, with its captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchExit {
    /// `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl BatchExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing was pending.
    Idle,
    /// A batch ran to completion, successfully or not.
    Ran(BatchExit),
    /// The count query or the spawn failed.
    Failed(OrchestratorError),
}

#[async_trait]
pub trait PendingCounter: Send + Sync {
    async fn pending(&self) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait BatchLauncher: Send + Sync {
    /// Start one batch and wait for it to exit.
    async fn launch(&self) -> Result<BatchExit, OrchestratorError>;
}

/// Counts records matching the eligibility filter.
pub struct StorePendingCounter {
    store: Arc<dyn RecordStore>,
    filter: Filter,
}

impl StorePendingCounter {
    pub fn new(store: Arc<dyn RecordStore>, filter: Filter) -> Self {
        Self { store, filter }
    }
}

#[async_trait]
impl PendingCounter for StorePendingCounter {
    async fn pending(&self) -> Result<usize, StoreError> {
        self.store.count(&self.filter).await
    }
}

/// Runs the batch as a separate OS process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `command` (program then arguments) when given, else the `certgen`
    /// executable installed next to the running one.
    pub fn resolve(command: Option<&[String]>) -> std::io::Result<Self> {
        if let Some((program, args)) = command.and_then(|c| c.split_first()) {
            return Ok(Self::new(program, args.to_vec()));
        }
        let exe = std::env::current_exe()?;
        let sibling = exe.with_file_name(format!("certgen{}", std::env::consts::EXE_SUFFIX));
        Ok(Self::new(sibling, Vec::new()))
    }

    pub fn describe(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl BatchLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<BatchExit, OrchestratorError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| OrchestratorError::Spawn {
                command: self.describe(),
                source,
            })?;

        Ok(BatchExit {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub struct Orchestrator {
    counter: Arc<dyn PendingCounter>,
    launcher: Arc<dyn BatchLauncher>,
    interval: Duration,
    state: watch::Sender<State>,
}

impl Orchestrator {
    pub fn new(
        counter: Arc<dyn PendingCounter>,
        launcher: Arc<dyn BatchLauncher>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(State::Idle);
        Self {
            counter,
            launcher,
            interval,
            state,
        }
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Follow state changes, including while a batch is in flight.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// One tick: check for pending work and, if any, run a batch to completion.
    pub async fn cycle(&mut self) -> CycleOutcome {
        let pending = match self.counter.pending().await {
            Ok(n) => n,
            Err(e) => {
                let e = OrchestratorError::from(e);
                error!("Orchestrator error: {}", e);
                return CycleOutcome::Failed(e);
            }
        };

        if pending == 0 {
            info!("No pending PDFs right now.");
            return CycleOutcome::Idle;
        }

        info!("{} record(s) pending, starting batch", pending);
        self.state.send_replace(State::Running);
        let result = self.launcher.launch().await;
        self.state.send_replace(State::Idle);

        match result {
            Ok(exit) => {
                log_exit(&exit);
                CycleOutcome::Ran(exit)
            }
            Err(e) => {
                error!("Batch failed to start: {}", e);
                CycleOutcome::Failed(e)
            }
        }
    }

    /// Poll until `shutdown` resolves. Shutdown is only observed while idle,
    /// so an in-flight batch always runs to exit.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Orchestrator started, polling every {}s",
            self.interval.as_secs()
        );
        tokio::pin!(shutdown);

        loop {
            self.cycle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, orchestrator stopping");
                    return;
                }
            }
        }
    }
}

fn log_exit(exit: &BatchExit) {
    for line in exit.stdout.lines().filter(|l| !l.trim().is_empty()) {
        info!(target: "certgen::batch", "{}", line);
    }
    for line in exit.stderr.lines().filter(|l| !l.trim().is_empty()) {
        warn!(target: "certgen::batch", "{}", line);
    }

    match exit.code {
        Some(0) => info!("Batch exited successfully"),
        Some(code) => warn!("Batch exited with status {}", code),
        None => warn!("Batch terminated by signal"),
    }
}
