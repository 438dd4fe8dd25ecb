//! One detection request from uploaded scan to stored record and report.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use time::OffsetDateTime;

use crate::core::db::{NewDetection, RecordRepository};
use crate::detection::Detector;
use crate::detection::preprocessing::denoise;
use crate::error::{AnalysisError, ValidationError};
use crate::measure::{self, Annotator};
use crate::models::{BoundingBox, Measurement, PatientInfo};
use crate::report::{NotificationOutcome, Notifier, ReportData, assemble_pdf};
use crate::severity::{self, Assessment};

pub const DEFAULT_DETECTOR_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Upper bound on a single detector call
    pub detector_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detector_timeout: DEFAULT_DETECTOR_TIMEOUT,
        }
    }
}

/// Everything produced by a run that found at least one tumor.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub record_id: i64,
    pub assessment: Assessment,
    pub boxes: Vec<BoundingBox>,
    pub measurements: Vec<Measurement>,
    pub report: ReportData,
    /// PNG of the annotated scan, as stored
    pub annotated_png: Vec<u8>,
    pub pdf: Vec<u8>,
    pub notification: NotificationOutcome,
}

#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// The detector returned no boxes. Nothing was classified or stored.
    NoTumorDetected { annotated: RgbImage },
    Detected(Box<DetectionReport>),
}

/// Reject a request before anything is written.
pub fn validate_request(patient: &PatientInfo, recipient: &str) -> Result<(), ValidationError> {
    patient.validate()?;
    if recipient.trim().is_empty() {
        return Err(ValidationError::EmptyEmail);
    }
    Ok(())
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Runs detection requests against a model, a record store and a notifier.
pub struct Analyzer<R> {
    detector: Arc<dyn Detector>,
    annotator: Annotator,
    store: R,
    notifier: Arc<dyn Notifier>,
    config: AnalysisConfig,
}

impl<R: RecordRepository> Analyzer<R> {
    pub fn new(detector: Arc<dyn Detector>, store: R, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            detector,
            annotator: Annotator::default(),
            store,
            notifier,
            config: AnalysisConfig::default(),
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    /// Run the detector on a blocking thread, bounded by the configured
    /// timeout.
    pub async fn detect(&self, image: DynamicImage) -> Result<Vec<BoundingBox>, AnalysisError> {
        let detector = Arc::clone(&self.detector);
        let task = tokio::task::spawn_blocking(move || detector.detect(&image));

        let timeout = self.config.detector_timeout;
        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(AnalysisError::DetectorTimeout(timeout.as_secs())),
            Ok(Err(join)) => Err(AnalysisError::Detector(anyhow::anyhow!(
                "detector task panicked: {join}"
            ))),
            Ok(Ok(result)) => result.map_err(AnalysisError::Detector),
        }
    }

    pub async fn analyze(
        &self,
        image: &DynamicImage,
        patient: &PatientInfo,
        recipient: &str,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        validate_request(patient, recipient)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ValidationError::InvalidDimensions {
                height: i64::from(height),
                width: i64::from(width),
            }
            .into());
        }

        tracing::info!(patient = %patient.name, width, height, "starting analysis");
        let denoised = denoise(image);
        let boxes = self.detect(denoised).await?;
        for bbox in &boxes {
            tracing::debug!(?bbox, "detected box");
        }

        let annotated = self.annotator.annotate(image, &boxes);
        if boxes.is_empty() {
            tracing::info!(patient = %patient.name, "no tumor detected");
            return Ok(AnalysisOutcome::NoTumorDetected { annotated });
        }

        let measurements = measure::extract(&boxes);
        let lengths = measure::lengths(&boxes);
        let assessment = severity::classify(&lengths, i64::from(height), i64::from(width))?;
        tracing::info!(
            tumors = assessment.tumor_count(),
            percentage = assessment.percentage(),
            severity = assessment.severity().label(),
            "classified"
        );

        let detection_time = now_micros();
        let annotated_png = encode_png(&annotated)?;
        let report = ReportData::from_analysis(patient, &assessment, detection_time);
        let pdf = assemble_pdf(&report, Some(&annotated_png)).map_err(AnalysisError::Report)?;

        let record_id = self
            .store
            .insert(&NewDetection {
                patient: patient.clone(),
                assessment: assessment.clone(),
                processed_image: Some(annotated_png.clone()),
                detection_time: Some(detection_time),
            })
            .await
            .map_err(AnalysisError::Store)?;

        let notification = self
            .notify(recipient, &report, &annotated_png, &pdf)
            .await;
        if !notification.success {
            tracing::warn!(record_id, message = %notification.message, "report not delivered");
        }

        Ok(AnalysisOutcome::Detected(Box::new(DetectionReport {
            record_id,
            assessment,
            boxes,
            measurements,
            report,
            annotated_png,
            pdf,
            notification,
        })))
    }

    /// Deliver on a blocking thread. Failures become an unsuccessful outcome.
    async fn notify(
        &self,
        recipient: &str,
        report: &ReportData,
        png: &[u8],
        pdf: &[u8],
    ) -> NotificationOutcome {
        let notifier = Arc::clone(&self.notifier);
        let recipient = recipient.to_string();
        let report = report.clone();
        let png = png.to_vec();
        let pdf = pdf.to_vec();

        tokio::task::spawn_blocking(move || notifier.send_report(&recipient, &report, &png, &pdf))
            .await
            .unwrap_or_else(NotificationOutcome::failed)
    }
}

/// Current UTC time at the precision the store keeps.
fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}
