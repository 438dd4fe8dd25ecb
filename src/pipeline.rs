use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;

/// Data that flows through the pipeline
#[derive(Clone)]
pub struct PipelineData {
    /// The current image (can be grayscale or color)
    pub image: DynamicImage,

    /// Reference to the original scan (shared efficiently via Arc)
    pub original: Arc<DynamicImage>,
}

impl PipelineData {
    /// Create PipelineData for a full image
    pub fn from_image(image: DynamicImage) -> Self {
        let original = Arc::new(image.clone());
        Self { image, original }
    }

    /// Replace the current image, keeping the original
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            image,
            original: self.original.clone(),
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Transform one image
    fn process(&self, data: PipelineData) -> Result<PipelineData>;

    /// Human-readable name for this step (used in logs and debug directories)
    fn name(&self) -> &str;
}

/// Composable pipeline of enhancement steps
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            debug: None,
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    fn save_debug(&self, dir_name: &str, image: &DynamicImage) -> Result<()> {
        if let Some(debug_config) = &self.debug {
            let step_dir = debug_config.output_dir.join(dir_name);
            std::fs::create_dir_all(&step_dir)?;
            image
                .save(step_dir.join("01.png"))
                .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
            tracing::debug!("saved debug output {}/01.png", dir_name);
        }
        Ok(())
    }

    /// Run every step in order on an input image
    pub fn run(&self, input: DynamicImage) -> Result<PipelineData> {
        self.save_debug("00_input", &input)?;

        let mut data = PipelineData::from_image(input);
        for (step_idx, step) in self.steps.iter().enumerate() {
            tracing::info!(step = step.name(), "running enhancement step");
            data = step.process(data)?;

            let dir_name = format!(
                "{:02}_{}",
                step_idx + 1,
                step.name().to_lowercase().replace(' ', "_")
            );
            self.save_debug(&dir_name, &data.image)?;
        }

        Ok(data)
    }

    /// Run each step independently on the same input, one result per step
    pub fn run_each(&self, input: DynamicImage) -> Result<Vec<(String, DynamicImage)>> {
        let data = PipelineData::from_image(input);
        self.steps
            .iter()
            .map(|step| {
                tracing::info!(step = step.name(), "applying filter");
                let out = step.process(data.clone())?;
                Ok((step.name().to_string(), out.image))
            })
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
