use thiserror::Error;

/// Startup configuration problems. Fatal before any work begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("cannot load font {path}: {reason}")]
    Font { path: String, reason: String },
}

/// Failures talking to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("record store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected record store response: {0}")]
    Malformed(String),
}

/// Failures handing a finished PDF to cloud storage.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid service account credentials: {0}")]
    Credentials(String),
    #[error("failed to sign token request: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload service returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Why a single record could not be turned into a certificate.
///
/// Always contained by the pipeline and reported as data to the batch runner.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("record is missing required field {0:?}")]
    MissingField(String),
    #[error("failed to fetch certificate image {reference}: {reason}")]
    Fetch { reference: String, reason: String },
    #[error("failed to decode certificate image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("rendering failed: {0}")]
    Render(String),
    #[error("failed to encode raster {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to build PDF: {0}")]
    Pdf(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("failed to update record status: {0}")]
    StatusUpdate(#[source] StoreError),
    #[error("file system error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A polling cycle that could not complete. Logged, never fatal.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("pending-count query failed: {0}")]
    Count(#[from] StoreError),
    #[error("failed to spawn batch process {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
