//! Severity scoring from tumor lengths relative to the scanned area.
//!
//! Each length is squared as a stand-in for the tumor's area. This ignores the
//! vertical extent of the box on purpose; see DESIGN.md before changing it.

use crate::error::ValidationError;
use crate::models::Severity;

/// Tier boundaries in percent of the image area, lower bound inclusive.
pub const MODERATE_THRESHOLD: f64 = 1.0;
pub const HIGH_THRESHOLD: f64 = 5.0;

/// Result of classifying one set of measurements.
///
/// Only [`classify`] can build one, so a stored severity always matches
/// the lengths it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    lengths: Vec<f64>,
    percentage: f64,
    severity: Severity,
}

impl Assessment {
    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    pub fn tumor_count(&self) -> usize {
        self.lengths.len()
    }

    /// Approximate share of the image covered by tumors, in percent.
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn recommendation(&self) -> &'static str {
        self.severity.recommendation()
    }

    pub fn largest(&self) -> f64 {
        self.lengths.iter().copied().fold(0.0, f64::max)
    }

    pub fn average(&self) -> f64 {
        self.lengths.iter().sum::<f64>() / self.lengths.len() as f64
    }
}

pub fn tier_for_percentage(percentage: f64) -> Severity {
    if percentage < MODERATE_THRESHOLD {
        Severity::Low
    } else if percentage < HIGH_THRESHOLD {
        Severity::Moderate
    } else {
        Severity::High
    }
}

/// Classify a non-empty set of tumor lengths against an image of
/// `image_height` x `image_width` pixels.
pub fn classify(
    lengths: &[f64],
    image_height: i64,
    image_width: i64,
) -> Result<Assessment, ValidationError> {
    if image_height <= 0 || image_width <= 0 {
        return Err(ValidationError::InvalidDimensions {
            height: image_height,
            width: image_width,
        });
    }
    if lengths.is_empty() {
        return Err(ValidationError::EmptyMeasurements);
    }
    if let Some((index, &value)) = lengths
        .iter()
        .enumerate()
        .find(|(_, l)| !l.is_finite() || **l < 0.0)
    {
        return Err(ValidationError::InvalidMeasurement { index, value });
    }

    let brain_area = image_height as f64 * image_width as f64;
    let total_tumor_area: f64 = lengths.iter().map(|l| l * l).sum();
    let percentage = 100.0 * total_tumor_area / brain_area;
    let severity = tier_for_percentage(percentage);

    tracing::debug!(
        tumors = lengths.len(),
        percentage,
        severity = severity.label(),
        "classified tumor severity"
    );

    Ok(Assessment {
        lengths: lengths.to_vec(),
        percentage,
        severity,
    })
}
