use thiserror::Error;

/// Input problems detected before any side effect happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Please enter the patient's name")]
    EmptyPatientName,

    #[error("Please enter an email address to receive the report")]
    EmptyEmail,

    #[error("Patient age must be between 0 and 120, got {0}")]
    AgeOutOfRange(i64),

    #[error("Image dimensions must be positive, got {height}x{width}")]
    InvalidDimensions { height: i64, width: i64 },

    #[error("Cannot classify severity without any measurements")]
    EmptyMeasurements,

    #[error("Measurement {index} is not a finite non-negative length: {value}")]
    InvalidMeasurement { index: usize, value: f64 },
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Detector failed: {0}")]
    Detector(#[source] anyhow::Error),

    #[error("Detector did not finish within {0} seconds")]
    DetectorTimeout(u64),

    #[error("Failed to encode processed image: {0}")]
    Encoding(#[from] image::ImageError),

    #[error("Failed to assemble report: {0}")]
    Report(#[source] anyhow::Error),

    #[error("Failed to store detection record: {0}")]
    Store(#[source] anyhow::Error),
}
