use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::NamingStrategy;
use crate::error::ProcessingError;
use crate::store::EligibleRecord;

pub fn generate_run_id() -> String {
    format!(
        "{}_{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();

/// Strip everything but ASCII alphanumerics, `-`, `_` and spaces, then turn
/// whitespace runs into `_`. Leading and trailing spaces become `_` too.
pub fn sanitize_file_name(name: &str) -> String {
    let unsafe_chars =
        UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^a-zA-Z0-9\-_ ]").expect("static regex"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let kept = unsafe_chars.replace_all(name, "");
    whitespace.replace_all(&kept, "_").into_owned()
}

/// Local raster and PDF locations for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub stem: String,
    pub raster: PathBuf,
    pub pdf: PathBuf,
}

impl OutputPaths {
    pub fn for_record(dir: &Path, record: &EligibleRecord, naming: NamingStrategy) -> Self {
        let by_id = || {
            let id = sanitize_file_name(&record.id);
            if id.is_empty() {
                sanitize_file_name(&record.store_id)
            } else {
                id
            }
        };

        let stem = match naming {
            NamingStrategy::RecordId => by_id(),
            NamingStrategy::Names => {
                let participant = sanitize_file_name(&record.participant_name.to_uppercase());
                let programme = sanitize_file_name(&record.programme_name);
                if participant.is_empty() || programme.is_empty() {
                    by_id()
                } else {
                    format!("{}-{}", participant, programme)
                }
            }
        };

        Self {
            raster: dir.join(format!("{}.png", stem)),
            pdf: dir.join(format!("{}.pdf", stem)),
            stem,
        }
    }

    pub fn pdf_file_name(&self) -> String {
        format!("{}.pdf", self.stem)
    }

    /// Remove both artifacts, or neither.
    ///
    /// Every path that still exists must be a regular file before anything
    /// is deleted. A file already gone is not a failure.
    pub async fn remove(&self) -> Result<(), ProcessingError> {
        let io_error = |path: &PathBuf, source: std::io::Error| ProcessingError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut present = Vec::with_capacity(2);
        for path in [&self.raster, &self.pdf] {
            match tokio::fs::symlink_metadata(path).await {
                Ok(meta) if meta.is_file() => present.push(path),
                Ok(_) => {
                    return Err(io_error(
                        path,
                        std::io::Error::new(std::io::ErrorKind::Other, "not a regular file"),
                    ))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(io_error(path, source)),
            }
        }

        let mut first_error = None;
        for path in present {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::info!("Deleted local file: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    tracing::error!("Failed to delete {}: {}", path.display(), source);
                    first_error.get_or_insert(io_error(path, source));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Load background bytes from an `http(s)` URL or a local path.
pub async fn fetch_image(client: &Client, reference: &str) -> Result<Vec<u8>, ProcessingError> {
    let fetch_error = |reason: String| ProcessingError::Fetch {
        reference: reference.to_string(),
        reason,
    };

    if reference.starts_with("http://") || reference.starts_with("https://") {
        let response = client
            .get(reference)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        return Ok(bytes.to_vec());
    }

    let path = reference.strip_prefix("file://").unwrap_or(reference);
    tokio::fs::read(path)
        .await
        .map_err(|e| fetch_error(e.to_string()))
}
