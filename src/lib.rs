pub mod analysis;
pub mod core;
pub mod detection;
pub mod error;
pub mod history;
pub mod measure;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod severity;

pub use analysis::{AnalysisConfig, AnalysisOutcome, Analyzer, DetectionReport};
pub use core::db::{DetectionRecord, NewDetection, RecordRepository, RecordStore};
pub use detection::{Detector, DetectorConfig, RtenDetector};
pub use error::{AnalysisError, ValidationError};
pub use models::{BoundingBox, Gender, Measurement, PatientInfo, Severity};
pub use pipeline::{DebugConfig, Pipeline, PipelineData, PipelineStep};
pub use severity::{Assessment, classify};
