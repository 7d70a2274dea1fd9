use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

use crate::pipeline::RecordPipeline;
use crate::storage::generate_run_id;
use crate::store::{Filter, RecordStore};

pub const EXIT_OK: i32 = 0;
pub const EXIT_CONFIG: i32 = 1;
pub const EXIT_FETCH_FAILED: i32 = 2;
pub const EXIT_RECORD_FAILURES: i32 = 3;

/// Tally of one batch pass. Used for logging and the process exit code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The eligible-record query itself failed; nothing was attempted.
    pub fetch_failed: bool,
}

impl BatchOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.fetch_failed {
            EXIT_FETCH_FAILED
        } else if self.failed > 0 {
            EXIT_RECORD_FAILURES
        } else {
            EXIT_OK
        }
    }
}

/// Runs the pipeline over every eligible record, one at a time.
pub struct BatchRunner {
    store: Arc<dyn RecordStore>,
    pipeline: RecordPipeline,
    filter: Filter,
}

impl BatchRunner {
    pub fn new(store: Arc<dyn RecordStore>, pipeline: RecordPipeline, filter: Filter) -> Self {
        Self {
            store,
            pipeline,
            filter,
        }
    }

    /// Never fails: per-record errors are counted, a failed fetch is flagged.
    pub async fn run(&self) -> BatchOutcome {
        let run_id = generate_run_id();
        self.run_inner()
            .instrument(info_span!("batch", run_id = %run_id))
            .await
    }

    async fn run_inner(&self) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        info!("Fetching records...");
        let records = match self.store.query(&self.filter).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error fetching records: {}", e);
                outcome.fetch_failed = true;
                return outcome;
            }
        };

        for record in &records {
            outcome.attempted += 1;
            match self.pipeline.process(record).await {
                Ok(done) => {
                    outcome.succeeded += 1;
                    info!(record = %record.id, "Finished certificate {}", done.record_id);
                }
                Err(e) => {
                    outcome.failed += 1;
                    error!(record = %record.id, "Error processing record {}: {}", record.id, e);
                }
            }
        }

        info!(
            "Batch complete: {} attempted, {} succeeded, {} failed",
            outcome.attempted, outcome.succeeded, outcome.failed
        );
        outcome
    }
}
