mod drive;

pub use drive::{DriveUploader, ServiceAccountKey};

use async_trait::async_trait;
use std::path::Path;

use crate::error::UploadError;

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_id: String,
    /// Shareable viewer link, for people.
    pub view_url: String,
    /// Direct download link, for systems that fetch the file themselves.
    pub download_url: String,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        local_path: &Path,
        destination_name: &str,
    ) -> Result<UploadReceipt, UploadError>;
}
