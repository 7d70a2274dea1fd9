use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use std::path::Path;

use super::{FontWeight, Typesetter};
use crate::config::FontConfig;
use crate::error::ConfigError;

/// TrueType regular/bold pair rendered with rusttype.
pub struct FontTypesetter {
    regular: Font<'static>,
    bold: Font<'static>,
    scale: Scale,
    color: Rgba<u8>,
}

impl FontTypesetter {
    pub fn load(config: &FontConfig) -> Result<Self, ConfigError> {
        let regular = load_font(&config.regular)?;
        let bold = load_font(&config.bold)?;
        Ok(Self::new(regular, bold, config.size_px))
    }

    pub fn new(regular: Font<'static>, bold: Font<'static>, size_px: f32) -> Self {
        Self {
            regular,
            bold,
            scale: Scale::uniform(size_px),
            color: Rgba([0, 0, 0, 255]),
        }
    }

    fn font(&self, weight: FontWeight) -> &Font<'static> {
        match weight {
            FontWeight::Regular => &self.regular,
            FontWeight::Bold => &self.bold,
        }
    }
}

fn load_font(path: &Path) -> Result<Font<'static>, ConfigError> {
    let font_error = |reason: String| ConfigError::Font {
        path: path.display().to_string(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| font_error(e.to_string()))?;
    Font::try_from_vec(bytes).ok_or_else(|| font_error("not a TrueType/OpenType font".to_string()))
}

impl Typesetter for FontTypesetter {
    fn measure(&self, weight: FontWeight, text: &str) -> f32 {
        let font = self.font(weight);
        font.layout(text, self.scale, point(0.0, 0.0))
            .last()
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0)
    }

    fn line_height(&self, weight: FontWeight) -> f32 {
        let v = self.font(weight).v_metrics(self.scale);
        v.ascent - v.descent + v.line_gap
    }

    fn draw_line(&self, canvas: &mut RgbaImage, weight: FontWeight, x: i32, y: i32, line: &str) {
        let font = self.font(weight);
        let baseline = y as f32 + font.v_metrics(self.scale).ascent;
        let (width, height) = canvas.dimensions();
        let color = self.color;

        for glyph in font.layout(line, self.scale, point(x as f32, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                    return;
                }
                let alpha = coverage.clamp(0.0, 1.0);
                if alpha == 0.0 {
                    return;
                }
                let dst = canvas.get_pixel_mut(px as u32, py as u32);
                let inv = 1.0 - alpha;
                for c in 0..3 {
                    dst.0[c] = (color.0[c] as f32 * alpha + dst.0[c] as f32 * inv).round() as u8;
                }
                dst.0[3] = 255;
            });
        }
    }
}
