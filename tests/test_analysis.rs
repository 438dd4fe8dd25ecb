//! End-to-end runs of the analyzer with fake detectors and notifiers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use tumorscan::analysis::{AnalysisConfig, AnalysisOutcome, Analyzer};
use tumorscan::report::{EmailNotifier, NotificationOutcome};
use tumorscan::{AnalysisError, ValidationError};

fn simulated_notifier() -> Arc<EmailNotifier> {
    Arc::new(EmailNotifier::default())
}

#[tokio::test]
async fn test_no_boxes_writes_nothing() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let detector = Arc::new(FakeDetector::new(vec![]));
    let notifier = Arc::new(RecordingNotifier::new(NotificationOutcome::sent()));
    let analyzer = Analyzer::new(detector.clone(), store, notifier.clone());

    let outcome = analyzer
        .analyze(&create_test_image(200, 200), &test_patient(), "doc@example.com")
        .await?;

    match outcome {
        AnalysisOutcome::NoTumorDetected { annotated } => {
            assert_eq!(annotated.dimensions(), (200, 200));
        }
        other => panic!("expected no tumor, got {other:?}"),
    }
    assert_eq!(detector.call_count(), 1);
    assert!(analyzer.store().list_all().await?.is_empty());
    assert!(notifier.recipients().is_empty(), "nothing to report");

    Ok(())
}

#[tokio::test]
async fn test_detection_is_stored_and_reported() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    // 20px wide box on a 200x200 scan: 400 / 40000 = 1%
    let detector = Arc::new(FakeDetector::new(vec![BoundingBox::new(
        50.0, 60.0, 70.0, 90.0,
    )]));
    let analyzer = Analyzer::new(detector, store, simulated_notifier());

    let outcome = analyzer
        .analyze(&create_test_image(200, 200), &test_patient(), "doc@example.com")
        .await?;
    let AnalysisOutcome::Detected(result) = outcome else {
        panic!("expected a detection");
    };

    assert_eq!(result.assessment.severity(), Severity::Moderate);
    assert_eq!(result.assessment.lengths(), &[20.0]);
    assert_eq!(result.measurements.len(), 1);
    assert_eq!(result.measurements[0].width, 30.0);
    assert!(result.pdf.starts_with(b"%PDF"));
    assert!(result.annotated_png.starts_with(&[0x89, b'P', b'N', b'G']));

    assert!(result.notification.success);
    assert!(result.notification.simulated);
    assert_eq!(
        result.notification.message,
        "Email sending simulated (no email credentials provided)"
    );

    let records = analyzer.store().list_all().await?;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, result.record_id);
    assert_eq!(record.patient_name, "Jane Doe");
    assert_eq!(record.tumor_count(), 1);
    assert_eq!(record.tumor_lengths, vec![20.0]);
    assert_eq!(record.severity, Some(Severity::Moderate));
    assert_eq!(record.processed_image.as_deref(), Some(&result.annotated_png[..]));
    assert_eq!(record.detection_time, result.report.detection_time);

    Ok(())
}

#[tokio::test]
async fn test_annotated_image_has_green_box() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let detector = Arc::new(FakeDetector::new(vec![BoundingBox::new(
        10.0, 10.0, 60.0, 60.0,
    )]));
    let analyzer = Analyzer::new(detector, store, simulated_notifier());

    let outcome = analyzer
        .analyze(&create_test_image(100, 100), &test_patient(), "doc@example.com")
        .await?;
    let AnalysisOutcome::Detected(result) = outcome else {
        panic!("expected a detection");
    };

    let png = image::load_from_memory(&result.annotated_png)?.to_rgb8();
    assert_eq!(png.get_pixel(10, 30).0, [0, 255, 0]);
    assert_eq!(png.get_pixel(59, 30).0, [0, 255, 0]);

    Ok(())
}

#[tokio::test]
async fn test_invalid_patient_is_rejected_before_detection() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let detector = Arc::new(FakeDetector::new(vec![BoundingBox::new(0.0, 0.0, 5.0, 5.0)]));
    let analyzer = Analyzer::new(detector.clone(), store, simulated_notifier());

    let nameless = PatientInfo {
        name: "   ".to_string(),
        age: 30,
        gender: Gender::Male,
    };
    let err = analyzer
        .analyze(&create_test_image(50, 50), &nameless, "doc@example.com")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Validation(ValidationError::EmptyPatientName)
    ));

    let err = analyzer
        .analyze(&create_test_image(50, 50), &test_patient(), "")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Validation(ValidationError::EmptyEmail)
    ));

    assert_eq!(detector.call_count(), 0);
    assert!(analyzer.store().list_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_detector_failure_is_fatal() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let analyzer = Analyzer::new(Arc::new(FailingDetector), store, simulated_notifier());

    let err = analyzer
        .analyze(&create_test_image(50, 50), &test_patient(), "doc@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Detector(_)));
    assert!(err.to_string().contains("model exploded"));
    assert!(analyzer.store().list_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_detector_timeout_is_fatal() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let analyzer = Analyzer::new(
        Arc::new(SlowDetector(Duration::from_millis(500))),
        store,
        simulated_notifier(),
    )
    .with_config(AnalysisConfig {
        detector_timeout: Duration::from_millis(20),
    });

    let err = analyzer
        .analyze(&create_test_image(50, 50), &test_patient(), "doc@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::DetectorTimeout(_)));
    assert!(analyzer.store().list_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_notification_keeps_record() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let detector = Arc::new(FakeDetector::new(vec![
        BoundingBox::new(0.0, 0.0, 30.0, 30.0),
        BoundingBox::new(100.0, 100.0, 110.0, 120.0),
    ]));
    let notifier = Arc::new(RecordingNotifier::new(NotificationOutcome::failed(
        "connection refused",
    )));
    let analyzer = Analyzer::new(detector, store, notifier.clone());

    let outcome = analyzer
        .analyze(&create_test_image(200, 200), &test_patient(), "doc@example.com")
        .await?;
    let AnalysisOutcome::Detected(result) = outcome else {
        panic!("expected a detection");
    };

    assert!(!result.notification.success);
    assert_eq!(
        result.notification.message,
        "Failed to send report: connection refused"
    );
    assert_eq!(notifier.recipients(), vec!["doc@example.com".to_string()]);

    let records = analyzer.store().list_all().await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tumor_lengths, vec![30.0, 10.0]);
    // 900 + 100 over 40000 = 2.5%
    assert_eq!(records[0].severity, Some(Severity::Moderate));

    Ok(())
}
