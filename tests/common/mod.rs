#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use certgen::config::{Config, FieldNames};
use certgen::error::{StoreError, UploadError};
use certgen::pipeline::RecordPipeline;
use certgen::render::{FontWeight, Typesetter};
use certgen::store::{Filter, RecordStore, StoreRecord};
use certgen::upload::{UploadReceipt, Uploader};

pub fn test_config(output_dir: &Path) -> Config {
    let output_dir = output_dir.display().to_string();
    Config::from_lookup(|name| match name {
        "AIRTABLE_API_KEY" => Some("key".to_string()),
        "AIRTABLE_BASE_ID" => Some("appTest".to_string()),
        "AIRTABLE_TABLE_NAME" => Some("Participants".to_string()),
        "OUTPUT_DIR" => Some(output_dir.clone()),
        _ => None,
    })
    .expect("test config")
}

/// A pending row using the default column names.
pub fn pending_row(
    id: &str,
    participant: &str,
    achievement: &str,
    programme: &str,
    image: &str,
) -> StoreRecord {
    let f = FieldNames::default();
    let mut fields = Map::new();
    fields.insert(f.status, json!("Generate PDF"));
    fields.insert(f.participant, json!(participant));
    fields.insert(f.achievement, json!(achievement));
    fields.insert(f.programme, json!([programme]));
    fields.insert(f.certificate_image, json!([{ "url": image, "filename": "bg.png" }]));
    fields.insert(f.record_id, json!(id));
    StoreRecord {
        id: format!("rec{}", id),
        fields,
    }
}

pub fn write_background(dir: &Path, name: &str, width: u32, height: u32) -> String {
    let path = dir.join(name);
    RgbaImage::from_pixel(width, height, Rgba([250, 245, 230, 255]))
        .save(&path)
        .expect("write background");
    path.display().to_string()
}

/// Files directly inside `dir`, by name, sorted.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// In-memory table honouring the same filter semantics as the real store.
pub struct MemoryStore {
    rows: Mutex<Vec<StoreRecord>>,
    fail_query: AtomicBool,
    fields: FieldNames,
    done_status: String,
}

impl MemoryStore {
    pub fn new(rows: Vec<StoreRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail_query: AtomicBool::new(false),
            fields: FieldNames::default(),
            done_status: "PDF Generated".to_string(),
        }
    }

    pub fn failing() -> Self {
        let store = Self::new(Vec::new());
        store.fail_query.store(true, Ordering::SeqCst);
        store
    }

    pub fn field(&self, store_id: &str, field: &str) -> Option<Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == store_id)
            .and_then(|r| r.fields.get(field).cloned())
    }

    pub fn status(&self, store_id: &str) -> Option<String> {
        self.field(store_id, &self.fields.status)
            .and_then(|v| v.as_str().map(str::to_string))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<StoreRecord>, StoreError> {
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(&r.fields))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        self.query(filter).await.map(|rows| rows.len())
    }

    async fn mark_generated(
        &self,
        store_id: &str,
        attachment_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == store_id)
            .ok_or_else(|| StoreError::Malformed(format!("no record {}", store_id)))?;
        row.fields
            .insert(self.fields.status.clone(), json!(self.done_status));
        if let Some(url) = attachment_url {
            row.fields
                .insert(self.fields.attachment.clone(), json!([{ "url": url }]));
        }
        Ok(())
    }
}

/// 20px per character, 50px lines. Records every line drawn and paints a
/// dark pixel at its origin.
#[derive(Default)]
pub struct RecordingTypesetter {
    pub drawn: Mutex<Vec<(FontWeight, i32, i32, String)>>,
}

impl Typesetter for RecordingTypesetter {
    fn measure(&self, _weight: FontWeight, text: &str) -> f32 {
        text.chars().count() as f32 * 20.0
    }

    fn line_height(&self, _weight: FontWeight) -> f32 {
        50.0
    }

    fn draw_line(&self, canvas: &mut RgbaImage, weight: FontWeight, x: i32, y: i32, line: &str) {
        if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
            canvas.put_pixel(x as u32, y as u32, Rgba([0, 0, 0, 255]));
        }
        self.drawn
            .lock()
            .unwrap()
            .push((weight, x, y, line.to_string()));
    }
}

pub struct MockUploader {
    fail: bool,
    block_cleanup: bool,
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl MockUploader {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            block_cleanup: false,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            block_cleanup: false,
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds, but swaps the raster for a non-empty directory so the
    /// local cleanup afterwards cannot delete it.
    pub fn blocking_cleanup() -> Self {
        Self {
            fail: false,
            block_cleanup: true,
            uploads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(
        &self,
        local_path: &Path,
        destination_name: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let bytes = tokio::fs::read(local_path).await.map_err(|source| UploadError::Read {
            path: local_path.display().to_string(),
            source,
        })?;
        assert!(bytes.starts_with(b"%PDF"), "uploaded file is not a PDF");

        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), destination_name.to_string()));

        if self.block_cleanup {
            let raster = local_path.with_extension("png");
            std::fs::remove_file(&raster).expect("remove raster");
            std::fs::create_dir(&raster).expect("raster dir");
            std::fs::write(raster.join("locked"), b"x").expect("raster dir content");
        }

        if self.fail {
            return Err(UploadError::Status {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        Ok(UploadReceipt {
            file_id: format!("drive-{}", destination_name),
            view_url: format!("https://drive.example/view/{}", destination_name),
            download_url: format!("https://drive.example/download/{}", destination_name),
        })
    }
}

pub fn pipeline(
    config: &Config,
    store: Arc<MemoryStore>,
    typesetter: Arc<RecordingTypesetter>,
    uploader: Option<Arc<MockUploader>>,
) -> RecordPipeline {
    RecordPipeline::new(
        config,
        store,
        typesetter,
        uploader.map(|u| u as Arc<dyn Uploader>),
    )
    .expect("pipeline")
}
