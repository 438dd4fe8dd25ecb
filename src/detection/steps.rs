use crate::detection::{filters, preprocessing};
use crate::pipeline::{PipelineData, PipelineStep};
use anyhow::Result;
use clap::ValueEnum;
use image::{DynamicImage, Rgb};
use std::sync::Arc;

/// Gaussian noise reduction on the color image
pub struct DenoiseStep {
    pub sigma: f32,
}

impl Default for DenoiseStep {
    fn default() -> Self {
        Self {
            sigma: preprocessing::DENOISE_SIGMA,
        }
    }
}

impl PipelineStep for DenoiseStep {
    fn process(&self, data: PipelineData) -> Result<PipelineData> {
        Ok(data.with_image(data.image.blur(self.sigma)))
    }

    fn name(&self) -> &str {
        "Denoise"
    }
}

/// Contrast limited adaptive histogram equalization
pub struct ClaheStep {
    pub clip_limit: f32,
    pub grid: u32,
}

impl Default for ClaheStep {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            grid: 8,
        }
    }
}

impl PipelineStep for ClaheStep {
    fn process(&self, data: PipelineData) -> Result<PipelineData> {
        let gray = filters::to_grayscale(&data.image);
        let equalized = filters::clahe(&gray, self.clip_limit, self.grid);
        Ok(data.with_image(DynamicImage::ImageLuma8(equalized)))
    }

    fn name(&self) -> &str {
        "CLAHE Enhancement"
    }
}

/// Local-mean binary thresholding
pub struct AdaptiveThresholdStep {
    pub block_radius: u32,
    pub offset: i32,
}

impl Default for AdaptiveThresholdStep {
    fn default() -> Self {
        // 11x11 neighbourhood, constant 2
        Self {
            block_radius: 5,
            offset: 2,
        }
    }
}

impl PipelineStep for AdaptiveThresholdStep {
    fn process(&self, data: PipelineData) -> Result<PipelineData> {
        let gray = filters::to_grayscale(&data.image);
        let binary = filters::adaptive_threshold(&gray, self.block_radius, self.offset);
        Ok(data.with_image(DynamicImage::ImageLuma8(binary)))
    }

    fn name(&self) -> &str {
        "Adaptive Thresholding"
    }
}

/// Detect edges using Canny
pub struct EdgeDetectionStep {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl Default for EdgeDetectionStep {
    fn default() -> Self {
        Self {
            low_threshold: 100.0,
            high_threshold: 200.0,
        }
    }
}

impl PipelineStep for EdgeDetectionStep {
    fn process(&self, data: PipelineData) -> Result<PipelineData> {
        let gray = filters::to_grayscale(&data.image);
        let edges = filters::detect_edges(&gray, self.low_threshold, self.high_threshold);
        Ok(data.with_image(DynamicImage::ImageLuma8(edges)))
    }

    fn name(&self) -> &str {
        "Canny Edge Detection"
    }
}

/// Outline bright regions on a black canvas
pub struct ContourStep {
    pub threshold: u8,
}

impl Default for ContourStep {
    fn default() -> Self {
        Self { threshold: 127 }
    }
}

impl PipelineStep for ContourStep {
    fn process(&self, data: PipelineData) -> Result<PipelineData> {
        let outlined = filters::draw_outer_contours(&data.image, self.threshold, Rgb([0, 255, 0]));
        Ok(data.with_image(DynamicImage::ImageRgb8(outlined)))
    }

    fn name(&self) -> &str {
        "Contour Detection"
    }
}

/// Filters selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Enhancement {
    Denoise,
    Clahe,
    Threshold,
    Canny,
    Contours,
}

impl Enhancement {
    pub fn step(&self) -> Arc<dyn PipelineStep> {
        match self {
            Enhancement::Denoise => Arc::new(DenoiseStep::default()),
            Enhancement::Clahe => Arc::new(ClaheStep::default()),
            Enhancement::Threshold => Arc::new(AdaptiveThresholdStep::default()),
            Enhancement::Canny => Arc::new(EdgeDetectionStep::default()),
            Enhancement::Contours => Arc::new(ContourStep::default()),
        }
    }
}
