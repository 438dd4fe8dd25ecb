mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from tumorscan for tests
pub use tumorscan::core::db::{
    DetectionRecord, NewDetection, RecordRepository, RecordStore, format_timestamp,
};
pub use tumorscan::{Assessment, BoundingBox, Gender, PatientInfo, Severity, classify};
