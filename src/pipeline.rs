//! One record, start to finish: validate, fetch, render, rasterize, package,
//! optionally upload, write status back, clean up.

use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, FieldNames, NamingStrategy};
use crate::error::ProcessingError;
use crate::pdf::PdfPackager;
use crate::render::{self, Typesetter};
use crate::storage::{self, OutputPaths};
use crate::store::{EligibleRecord, RecordStore, StoreRecord};
use crate::upload::{UploadReceipt, Uploader};

/// What a successful run left behind.
#[derive(Debug, Clone)]
pub struct Processed {
    pub record_id: String,
    pub paths: OutputPaths,
    /// `Some` when the PDF went to cloud storage. Local files are removed
    /// afterwards on a best-effort basis.
    pub upload: Option<UploadReceipt>,
    pub page_size: (u32, u32),
}

pub struct RecordPipeline {
    store: Arc<dyn RecordStore>,
    typesetter: Arc<dyn Typesetter>,
    uploader: Option<Arc<dyn Uploader>>,
    packager: PdfPackager,
    client: Client,
    fields: FieldNames,
    output_dir: PathBuf,
    naming: NamingStrategy,
}

impl RecordPipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn RecordStore>,
        typesetter: Arc<dyn Typesetter>,
        uploader: Option<Arc<dyn Uploader>>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            store,
            typesetter,
            uploader,
            packager: PdfPackager::new(config.pdf_jpeg_quality),
            client,
            fields: config.store.fields.clone(),
            output_dir: config.output_dir.clone(),
            naming: config.naming,
        })
    }

    pub fn upload_enabled(&self) -> bool {
        self.uploader.is_some()
    }

    pub async fn process(&self, row: &StoreRecord) -> Result<Processed, ProcessingError> {
        let record = EligibleRecord::from_store(row, &self.fields)?;
        info!(
            "Processing: {}, {}, {}",
            record.participant_name, record.achievement_level, record.programme_name
        );

        let bytes = storage::fetch_image(&self.client, &record.certificate_image_ref).await?;
        let paths = OutputPaths::for_record(&self.output_dir, &record, self.naming);

        self.render_raster(bytes, &record, &paths).await?;
        info!("Saved image: {}", paths.raster.display());

        let page_size = self.packager.package(&paths.raster, &paths.pdf).await?;
        info!("Generated PDF: {}", paths.pdf.display());

        let upload = match &self.uploader {
            Some(uploader) => {
                // Upload failures keep both local files for manual recovery.
                let receipt = uploader.upload(&paths.pdf, &paths.pdf_file_name()).await?;
                info!("Uploaded to Google Drive: {}", receipt.view_url);
                Some(receipt)
            }
            None => None,
        };

        self.store
            .mark_generated(
                &record.store_id,
                upload.as_ref().map(|r| r.download_url.as_str()),
            )
            .await
            .map_err(ProcessingError::StatusUpdate)?;

        // The record is already marked, so a failed cleanup must not fail it.
        if upload.is_some() {
            if let Err(e) = paths.remove().await {
                warn!("Local files for {} kept after upload: {}", record.id, e);
            }
        }

        Ok(Processed {
            record_id: record.id,
            paths,
            upload,
            page_size,
        })
    }

    async fn render_raster(
        &self,
        bytes: Vec<u8>,
        record: &EligibleRecord,
        paths: &OutputPaths,
    ) -> Result<(), ProcessingError> {
        let typesetter = Arc::clone(&self.typesetter);
        let record = record.clone();
        let raster = paths.raster.clone();

        tokio::task::spawn_blocking(move || {
            let mut canvas = image::load_from_memory(&bytes)
                .map_err(ProcessingError::Decode)?
                .to_rgba8();
            render::render(
                typesetter.as_ref(),
                &mut canvas,
                &record.participant_name,
                &record.achievement_level,
                &record.programme_name,
            )?;
            canvas.save(&raster).map_err(|source| ProcessingError::Encode {
                path: raster.display().to_string(),
                source,
            })
        })
        .await
        .map_err(|e| ProcessingError::Render(format!("render task failed: {}", e)))?
    }
}
