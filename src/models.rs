use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Oldest accepted patient age.
pub const MAX_AGE: u8 = 120;

/// Axis-aligned box in image pixel coordinates, as returned by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence: 1.0,
            class_id: 0,
        }
    }

    /// Horizontal extent. This is the "length" reported for a tumor.
    pub fn length(&self) -> f32 {
        self.x2 - self.x1
    }

    /// Vertical extent.
    pub fn width(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.length() * self.width()
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Clamp the box to the image and round to whole pixels for drawing.
    pub fn to_pixel_rect(&self, img_width: u32, img_height: u32) -> Option<(i32, i32, u32, u32)> {
        let x1 = self.x1.max(0.0).min(img_width as f32);
        let y1 = self.y1.max(0.0).min(img_height as f32);
        let x2 = self.x2.max(0.0).min(img_width as f32);
        let y2 = self.y2.max(0.0).min(img_height as f32);

        let w = (x2 - x1).round() as u32;
        let h = (y2 - y1).round() as u32;
        if w == 0 || h == 0 {
            return None;
        }
        Some((x1.round() as i32, y1.round() as i32, w, h))
    }
}

/// Size measurements derived from one bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub length: f64,
    pub width: f64,
    pub area: f64,
}

impl From<&BoundingBox> for Measurement {
    fn from(bbox: &BoundingBox) -> Self {
        let length = bbox.length() as f64;
        let width = bbox.width() as f64;
        Measurement {
            length,
            width,
            area: length * width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(anyhow::anyhow!("Invalid gender: {}", s)),
        }
    }
}

/// Severity tiers, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Moderate, Severity::High];

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "Low Severity",
            Severity::Moderate => "Moderate Severity",
            Severity::High => "High Severity",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Severity::Low => "Regular follow-up recommended in 6 months",
            Severity::Moderate => "Follow-up within 3 months recommended",
            Severity::High => "Immediate medical consultation advised",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    /// Accepts the stored label ("High Severity") or the bare tier ("high").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let tier = normalized.strip_suffix(" severity").unwrap_or(&normalized);
        match tier {
            "low" => Ok(Severity::Low),
            "moderate" | "medium" => Ok(Severity::Moderate),
            "high" => Ok(Severity::High),
            _ => Err(anyhow::anyhow!("Invalid severity: {}", s)),
        }
    }
}

/// Patient details entered alongside an uploaded scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientInfo {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
}

impl PatientInfo {
    /// Build from raw form input, rejecting a blank name or an age outside
    /// 0..=120.
    pub fn new(name: &str, age: i64, gender: Gender) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyPatientName);
        }
        let age = u8::try_from(age)
            .ok()
            .filter(|a| *a <= MAX_AGE)
            .ok_or(ValidationError::AgeOutOfRange(age))?;
        Ok(Self {
            name: name.to_string(),
            age,
            gender,
        })
    }

    /// Re-check a value built field by field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyPatientName);
        }
        if self.age > MAX_AGE {
            return Err(ValidationError::AgeOutOfRange(i64::from(self.age)));
        }
        Ok(())
    }
}
