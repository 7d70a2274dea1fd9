use std::sync::Arc;

use certgen::config::Config;
use certgen::orchestrator::{Orchestrator, ProcessLauncher, StorePendingCounter};
use certgen::store::{AirtableStore, Filter, RecordStore};

#[tokio::main]
async fn main() {
    certgen::init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn RecordStore> = match AirtableStore::new(config.store.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to create record store client: {}", e);
            std::process::exit(1);
        }
    };

    let launcher = match ProcessLauncher::resolve(config.batch_command.as_deref()) {
        Ok(launcher) => launcher,
        Err(e) => {
            tracing::error!("Cannot locate batch executable: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Batch command: {}", launcher.describe());

    let counter = StorePendingCounter::new(store, Filter::eligible(&config.store));
    let orchestrator =
        Orchestrator::new(Arc::new(counter), Arc::new(launcher), config.poll_interval);

    orchestrator
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
}
