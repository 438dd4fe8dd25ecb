pub mod filters;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod steps;

use image::DynamicImage;

use crate::models::BoundingBox;

pub use model::RtenDetector;

/// Boundary around a trained object-detection model.
///
/// Implementations receive the preprocessed scan (same pixel dimensions as
/// the original) and return boxes in that image's pixel coordinates.
pub trait Detector: Send + Sync {
    fn detect(&self, img: &DynamicImage) -> anyhow::Result<Vec<BoundingBox>>;
}

/// Inference parameters for [`RtenDetector`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Side length of the square model input
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}
