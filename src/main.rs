use std::process::ExitCode;
use std::sync::Arc;

use certgen::batch::{BatchRunner, EXIT_CONFIG};
use certgen::config::Config;
use certgen::pipeline::RecordPipeline;
use certgen::render::{FontTypesetter, Typesetter};
use certgen::store::{AirtableStore, Filter, RecordStore};
use certgen::upload::{DriveUploader, Uploader};

#[tokio::main]
async fn main() -> ExitCode {
    certgen::init_tracing();

    let runner = match build_runner() {
        Ok(runner) => runner,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_CONFIG as u8);
        }
    };

    let outcome = runner.run().await;
    ExitCode::from(outcome.exit_code() as u8)
}

fn build_runner() -> Result<BatchRunner, Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;

    certgen::storage::ensure_dir(&config.output_dir)?;

    let store: Arc<dyn RecordStore> = Arc::new(AirtableStore::new(config.store.clone())?);
    let typesetter: Arc<dyn Typesetter> = Arc::new(FontTypesetter::load(&config.fonts)?);
    let uploader: Option<Arc<dyn Uploader>> = match &config.upload {
        Some(drive) => Some(Arc::new(DriveUploader::from_config(drive)?)),
        None => None,
    };

    let pipeline = RecordPipeline::new(&config, Arc::clone(&store), typesetter, uploader)?;
    tracing::info!(
        "Writing certificates to {} (upload {})",
        config.output_dir.display(),
        if pipeline.upload_enabled() { "enabled" } else { "disabled" }
    );

    Ok(BatchRunner::new(store, pipeline, Filter::eligible(&config.store)))
}
