pub mod email;
pub mod pdf;

use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::db::DetectionRecord;
use crate::models::{Gender, PatientInfo, Severity};
use crate::severity::Assessment;

pub use email::{EmailConfig, EmailNotifier, NotificationOutcome, Notifier};
pub use pdf::assemble_pdf;

/// Fixed disclaimer closing every report.
pub const DISCLAIMER: &str = "This report is generated by an automated system and should not be \
    used as the sole basis for medical decisions. Please consult with a healthcare professional \
    for proper diagnosis and treatment options.";

/// The fields a report shows, whether it comes from a fresh analysis or a
/// stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportData {
    pub patient_name: String,
    pub patient_age: Option<u8>,
    pub patient_gender: Option<Gender>,
    pub detection_time: Option<OffsetDateTime>,
    pub tumor_lengths: Vec<f64>,
    pub severity: Option<Severity>,
    pub recommendation: Option<String>,
}

impl ReportData {
    pub fn from_analysis(
        patient: &PatientInfo,
        assessment: &Assessment,
        detection_time: OffsetDateTime,
    ) -> Self {
        Self {
            patient_name: patient.name.clone(),
            patient_age: Some(patient.age),
            patient_gender: Some(patient.gender),
            detection_time: Some(detection_time),
            tumor_lengths: assessment.lengths().to_vec(),
            severity: Some(assessment.severity()),
            recommendation: Some(assessment.recommendation().to_string()),
        }
    }

    pub fn tumor_count(&self) -> usize {
        self.tumor_lengths.len()
    }

    pub fn age_text(&self) -> String {
        self.patient_age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn gender_text(&self) -> &str {
        self.patient_gender.map(|g| g.as_str()).unwrap_or("N/A")
    }

    pub fn severity_text(&self) -> &str {
        self.severity.map(|s| s.label()).unwrap_or("N/A")
    }

    pub fn recommendation_text(&self) -> &str {
        self.recommendation.as_deref().unwrap_or("N/A")
    }

    /// `YYYY-MM-DD HH:MM:SS`, or "N/A" when the time is unknown.
    pub fn date_text(&self) -> String {
        self.detection_time
            .and_then(|t| {
                t.format(format_description!(
                    "[year]-[month]-[day] [hour]:[minute]:[second]"
                ))
                .ok()
            })
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// One line per tumor, numbered from 1.
    pub fn measurement_lines(&self) -> Vec<String> {
        self.tumor_lengths
            .iter()
            .enumerate()
            .map(|(i, length)| format!("Tumor {}: {:.2} pixels", i + 1, length))
            .collect()
    }
}

impl From<&DetectionRecord> for ReportData {
    fn from(record: &DetectionRecord) -> Self {
        Self {
            patient_name: record.patient_name.clone(),
            patient_age: record.patient_age,
            patient_gender: record.patient_gender,
            detection_time: record.detection_time,
            tumor_lengths: record.tumor_lengths.clone(),
            severity: record.severity,
            recommendation: record.recommendation.clone(),
        }
    }
}
