//! Certificate text placement.
//!
//! Three blocks go onto the background: participant name, achievement level
//! and programme name. Positions are fractions of the image size so the same
//! plan works for any template resolution. Lines are broken at a per-block
//! wrap width; the drawing primitive gets the wider `width - 2 * margin` box.

mod fonts;

pub use fonts::FontTypesetter;

use image::RgbaImage;

use crate::error::ProcessingError;
use crate::layout::{wrap, LayoutResult};

pub const MARGIN_PX: u32 = 80;

const PARTICIPANT_WRAP: f64 = 0.8;
const PARTICIPANT_Y_SINGLE: f64 = 0.52;
const PARTICIPANT_Y_WRAPPED: f64 = 0.45;
const ACHIEVEMENT_Y: f64 = 0.65;
const PROGRAMME_WRAP: f64 = 0.4;
const PROGRAMME_Y: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

/// Font metrics and glyph rasterization for the two certificate weights.
pub trait Typesetter: Send + Sync {
    /// Advance width of `text` on a single line, in pixels.
    fn measure(&self, weight: FontWeight, text: &str) -> f32;

    /// Distance between consecutive baselines, in pixels.
    fn line_height(&self, weight: FontWeight) -> f32;

    /// Draw one line with its top-left corner at (`x`, `y`).
    fn draw_line(&self, canvas: &mut RgbaImage, weight: FontWeight, x: i32, y: i32, line: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Text with hard line breaks already applied.
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub max_width: u32,
    pub weight: FontWeight,
}

impl TextBlock {
    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub participant: TextBlock,
    pub achievement: TextBlock,
    pub programme: TextBlock,
}

impl RenderPlan {
    pub fn blocks(&self) -> [&TextBlock; 3] {
        [&self.participant, &self.achievement, &self.programme]
    }
}

fn anchor(height: u32, fraction: f64) -> u32 {
    (height as f64 * fraction).round() as u32
}

/// Participant block top edge: higher when the name needed more than one line.
pub fn participant_anchor(height: u32, layout: &LayoutResult) -> u32 {
    if layout.line_count() > 1 {
        anchor(height, PARTICIPANT_Y_WRAPPED)
    } else {
        anchor(height, PARTICIPANT_Y_SINGLE)
    }
}

/// Work out where each block goes on a `width` x `height` background.
pub fn plan(
    typesetter: &dyn Typesetter,
    width: u32,
    height: u32,
    participant_name: &str,
    achievement_level: &str,
    programme_name: &str,
) -> RenderPlan {
    let draw_width = width.saturating_sub(MARGIN_PX * 2);

    let participant = wrap(
        &participant_name.to_uppercase(),
        |line| typesetter.measure(FontWeight::Regular, line),
        (width as f64 * PARTICIPANT_WRAP) as f32,
    );
    let programme = wrap(
        &programme_name.to_uppercase(),
        |line| typesetter.measure(FontWeight::Bold, line),
        (width as f64 * PROGRAMME_WRAP) as f32,
    );

    RenderPlan {
        participant: TextBlock {
            x: MARGIN_PX,
            y: participant_anchor(height, &participant),
            text: participant.joined(),
            max_width: draw_width,
            weight: FontWeight::Regular,
        },
        achievement: TextBlock {
            text: achievement_level.trim().to_uppercase(),
            x: MARGIN_PX,
            y: anchor(height, ACHIEVEMENT_Y),
            max_width: draw_width,
            weight: FontWeight::Regular,
        },
        programme: TextBlock {
            text: programme.joined(),
            x: MARGIN_PX,
            y: anchor(height, PROGRAMME_Y),
            max_width: draw_width,
            weight: FontWeight::Bold,
        },
    }
}

/// Draw a block: each hard line is re-flowed to the block's bounding width,
/// then lines are stacked at the font's line height.
pub fn draw_block(typesetter: &dyn Typesetter, canvas: &mut RgbaImage, block: &TextBlock) {
    let line_height = typesetter.line_height(block.weight);
    let mut y = block.y as f32;

    for hard_line in block.text.lines() {
        let flowed = wrap(
            hard_line,
            |line| typesetter.measure(block.weight, line),
            block.max_width as f32,
        );
        for line in flowed.lines() {
            typesetter.draw_line(canvas, block.weight, block.x as i32, y.round() as i32, line);
            y += line_height;
        }
    }
}

/// Composite the participant's text onto `canvas`.
pub fn render(
    typesetter: &dyn Typesetter,
    canvas: &mut RgbaImage,
    participant_name: &str,
    achievement_level: &str,
    programme_name: &str,
) -> Result<RenderPlan, ProcessingError> {
    for (name, value) in [
        ("participant name", participant_name),
        ("achievement level", achievement_level),
        ("programme name", programme_name),
    ] {
        if value.trim().is_empty() {
            return Err(ProcessingError::MissingField(name.to_string()));
        }
    }

    let (width, height) = canvas.dimensions();
    let plan = plan(
        typesetter,
        width,
        height,
        participant_name,
        achievement_level,
        programme_name,
    );
    for block in plan.blocks() {
        draw_block(typesetter, canvas, block);
    }
    Ok(plan)
}
