// Certificate PDF packaging
// One page, sized to the raster's pixel dimensions, with the raster as a
// full-bleed JPEG image XObject.
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::error::ProcessingError;

#[derive(Debug, Clone, Copy)]
pub struct PdfPackager {
    jpeg_quality: u8,
}

impl PdfPackager {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Read the raster at `raster_path` and write a one-page PDF to `pdf_path`.
    ///
    /// Returns once the file is flushed and synced to disk.
    pub async fn package(
        &self,
        raster_path: &Path,
        pdf_path: &Path,
    ) -> Result<(u32, u32), ProcessingError> {
        let raster = raster_path.to_path_buf();
        let quality = self.jpeg_quality;

        let (bytes, dims) = tokio::task::spawn_blocking(move || {
            let image = image::open(&raster).map_err(ProcessingError::Decode)?;
            let dims = (image.width(), image.height());
            let bytes = build_pdf(&image, quality).map_err(ProcessingError::Pdf)?;
            Ok::<_, ProcessingError>((bytes, dims))
        })
        .await
        .map_err(|e| ProcessingError::Pdf(format!("packaging task failed: {}", e)))??;

        let io_err = |source| ProcessingError::Io {
            path: pdf_path.display().to_string(),
            source,
        };
        let mut file = tokio::fs::File::create(pdf_path).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        Ok(dims)
    }
}

/// Encode `image` as a single-page PDF document.
pub fn build_pdf(image: &DynamicImage, jpeg_quality: u8) -> Result<Vec<u8>, String> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err("cannot package an empty image".to_string());
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality)
        .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| format!("JPEG encoding failed: {}", e))?;

    let (w, h) = (width as f32, height as f32);
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()]),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| format!("content stream encoding failed: {}", e))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let media_box: Vec<Object> = vec![0.into(), 0.into(), w.into(), h.into()];
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| format!("PDF serialization failed: {}", e))?;
    Ok(bytes)
}
