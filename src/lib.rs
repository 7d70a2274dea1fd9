pub mod batch;
pub mod config;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod pdf;
pub mod pipeline;
pub mod render;
pub mod storage;
pub mod store;
pub mod upload;

use std::io::IsTerminal;

/// Install the fmt subscriber. `RUST_LOG` wins; otherwise `certgen=info`.
///
/// Colour only goes to a terminal so captured child output stays readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certgen=info".into()),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();
}
