use std::path::{Path, PathBuf};

use anyhow::Context;
use image::DynamicImage;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;

use crate::detection::{Detector, DetectorConfig, postprocessing, preprocessing};
use crate::models::BoundingBox;

/// Default location of the trained tumor detection model.
pub const DEFAULT_MODEL_PATH: &str = "./model/brain_tumor_detection_model.rten";

/// YOLO-style detector backed by an `.rten` model file.
pub struct RtenDetector {
    model: Model,
    model_path: PathBuf,
    config: DetectorConfig,
}

impl std::fmt::Debug for RtenDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtenDetector")
            .field("model_path", &self.model_path)
            .field("config", &self.config)
            .finish()
    }
}

impl RtenDetector {
    pub fn load<P: AsRef<Path>>(model_path: P, config: DetectorConfig) -> anyhow::Result<Self> {
        let model_path = model_path.as_ref().to_path_buf();

        if !model_path.exists() {
            anyhow::bail!(
                "Detection model not found at {}. Convert the trained model to .rten format \
                 (rten-convert model.onnx) and pass its path with --model",
                model_path.display()
            );
        }

        let model = Model::load_file(&model_path)
            .with_context(|| format!("Failed to load detection model {:?}", model_path))?;
        tracing::info!(model = %model_path.display(), "loaded detection model");

        Ok(Self {
            model,
            model_path,
            config,
        })
    }
}

impl Detector for RtenDetector {
    fn detect(&self, img: &DynamicImage) -> anyhow::Result<Vec<BoundingBox>> {
        let (input, letterbox) = preprocessing::to_model_input(img, self.config.input_size);

        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| anyhow::anyhow!("Model inference failed: {:?}", e))?;
        let output: NdTensor<f32, 3> = output
            .try_into()
            .map_err(|e| anyhow::anyhow!("Unexpected model output: {:?}", e))?;

        let boxes = postprocessing::decode_output(
            &output.to_vec(),
            output.shape(),
            self.config.confidence_threshold,
            self.config.iou_threshold,
            letterbox,
            img.width(),
            img.height(),
        )?;
        tracing::debug!(count = boxes.len(), "model returned boxes");
        Ok(boxes)
    }
}
