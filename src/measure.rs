//! Per-box measurements and the annotated preview image.

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::models::{BoundingBox, Measurement};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 2;
const TEXT_SCALE: f32 = 16.0;
const TEXT_OFFSET: i32 = 10;

/// Measurements for every box, in detector order. Nothing is filtered.
pub fn extract(boxes: &[BoundingBox]) -> Vec<Measurement> {
    boxes.iter().map(Measurement::from).collect()
}

/// Just the lengths, in detector order.
pub fn lengths(boxes: &[BoundingBox]) -> Vec<f64> {
    boxes.iter().map(|b| b.length() as f64).collect()
}

/// Draws detection boxes and their areas onto a copy of an image.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// An annotator that only draws boxes.
    pub fn boxes_only() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontVec) -> Self {
        Self { font: Some(font) }
    }

    /// Load a TrueType/OpenType font for the area labels.
    pub fn from_font_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path.as_ref().display(), e))?;
        Ok(Self::with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, img: &DynamicImage, boxes: &[BoundingBox]) -> RgbImage {
        let mut canvas = img.to_rgb8();
        let (img_width, img_height) = canvas.dimensions();

        for bbox in boxes {
            let Some((x, y, w, h)) = bbox.to_pixel_rect(img_width, img_height) else {
                tracing::debug!(?bbox, "skipping degenerate box while drawing");
                continue;
            };

            // Draw nested rectangles for thickness
            for t in 0..BOX_THICKNESS {
                if w <= 2 * t || h <= 2 * t {
                    break;
                }
                let rect = Rect::at(x + t as i32, y + t as i32).of_size(w - 2 * t, h - 2 * t);
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }

            if let Some(font) = &self.font {
                let label = format!("Area: {:.1}", Measurement::from(bbox).area);
                let text_y = (y - TEXT_OFFSET - TEXT_SCALE as i32 / 2).max(0);
                draw_text_mut(
                    &mut canvas,
                    TEXT_COLOR,
                    x,
                    text_y,
                    PxScale::from(TEXT_SCALE),
                    font,
                    &label,
                );
            }
        }

        canvas
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::boxes_only()
    }
}
