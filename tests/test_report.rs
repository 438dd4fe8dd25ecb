//! PDF assembly and email composition.

mod common;

use common::*;
use tumorscan::analysis::encode_png;
use tumorscan::report::email::{self, build_message, html_body};
use tumorscan::report::{EmailConfig, EmailNotifier, Notifier, ReportData, assemble_pdf};

fn sample_report() -> ReportData {
    let assessment = classify(&[50.0, 300.0], 1000, 1000).unwrap();
    ReportData::from_analysis(&test_patient(), &assessment, TEST_TIME)
}

fn sample_png() -> Vec<u8> {
    encode_png(&create_test_image(64, 48).to_rgb8()).unwrap()
}

#[test]
fn test_report_text_fields() {
    let report = sample_report();
    assert_eq!(report.tumor_count(), 2);
    assert_eq!(report.date_text(), "2024-03-15 10:30:00");
    assert_eq!(report.severity_text(), "High Severity");
    assert_eq!(
        report.measurement_lines(),
        vec!["Tumor 1: 50.00 pixels", "Tumor 2: 300.00 pixels"]
    );
}

#[test]
fn test_pdf_with_and_without_image() {
    let report = sample_report();

    let with_image = assemble_pdf(&report, Some(&sample_png())).unwrap();
    assert!(with_image.starts_with(b"%PDF"));

    let without_image = assemble_pdf(&report, None).unwrap();
    assert!(without_image.starts_with(b"%PDF"));
    assert!(without_image.len() < with_image.len());
}

#[test]
fn test_pdf_rejects_corrupt_image() {
    let report = sample_report();
    assert!(assemble_pdf(&report, Some(b"not a png")).is_err());
}

#[test]
fn test_pdf_with_many_tumors_spills_onto_new_page() {
    let lengths: Vec<f64> = (1..=40).map(f64::from).collect();
    let assessment = classify(&lengths, 1000, 1000).unwrap();
    let report = ReportData::from_analysis(&test_patient(), &assessment, TEST_TIME);
    let pdf = assemble_pdf(&report, None).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_pdf_from_stored_record() -> anyhow::Result<()> {
    let (store, _temp_dir) = create_test_store().await;
    let id = store.insert(&make_new_detection("Stored", &[10.0], TEST_TIME)).await?;
    let record = store.find(id).await?.expect("record exists");

    let report = ReportData::from(&record);
    assert_eq!(report.patient_name, "Stored");
    assert_eq!(report.severity, Some(Severity::Low));

    let pdf = assemble_pdf(&report, None)?;
    assert!(pdf.starts_with(b"%PDF"));
    Ok(())
}

#[test]
fn test_html_body_lists_findings() {
    let mut report = sample_report();
    report.patient_name = "<Jane & Co>".to_string();
    let html = html_body(&report);

    assert!(html.contains("&lt;Jane &amp; Co&gt;"));
    assert!(!html.contains("<Jane"));
    assert!(html.contains("<td>42</td>"));
    assert!(html.contains("<td>Female</td>"));
    assert!(html.contains("<td>2024-03-15 10:30:00</td>"));
    assert!(html.contains("<li>Tumor 1: 50.00 pixels</li>"));
    assert!(html.contains("<li>Tumor 2: 300.00 pixels</li>"));
    assert!(html.contains("Immediate medical consultation advised"));
}

#[test]
fn test_message_names_and_attachments() {
    let report = sample_report();
    assert_eq!(email::subject(&report), "Brain Tumor Detection Report - Jane Doe");
    assert_eq!(email::image_attachment_name(&report), "tumor_detection_Jane Doe.png");
    assert_eq!(email::pdf_attachment_name(&report), "Jane Doe_tumor_report.pdf");

    let message = build_message(
        "sender@example.com",
        "doc@example.com",
        &report,
        &sample_png(),
        b"%PDF-1.3",
    )
    .unwrap();
    let raw = String::from_utf8_lossy(&message.formatted()).to_string();
    assert!(raw.contains("Subject: Brain Tumor Detection Report - Jane Doe"));
    assert!(raw.contains("tumor_report.pdf"));
    assert!(raw.contains("image/png"));

    assert!(build_message("not an address", "doc@example.com", &report, &[], &[]).is_err());
}

#[test]
fn test_file_names_stay_inside_output_dir() {
    let dir = std::path::Path::new("/srv/reports");
    for hostile in ["/tmp/evil", "../../etc/x", "a/../../b", "..", "C:\\temp\\x", ""] {
        let mut report = sample_report();
        report.patient_name = hostile.to_string();

        for name in [
            email::image_attachment_name(&report),
            email::pdf_attachment_name(&report),
        ] {
            assert!(!name.contains('/'), "{name}");
            assert!(!name.contains('\\'), "{name}");
            let path = dir.join(&name);
            assert!(path.starts_with(dir), "{}", path.display());
            assert_eq!(path.parent(), Some(dir));
            assert!(
                path.components()
                    .all(|c| c != std::path::Component::ParentDir)
            );
        }
    }

    assert_eq!(email::safe_file_stem("/tmp/evil"), "_tmp_evil");
    assert_eq!(email::safe_file_stem("../../etc/x"), "______etc_x");
    assert_eq!(email::safe_file_stem("José-María O_Neil"), "José-María O_Neil");
    assert_eq!(email::safe_file_stem(""), "_");
}

#[test]
fn test_missing_credentials_simulate_delivery() {
    let report = sample_report();
    let partial = EmailNotifier::new(EmailConfig {
        sender_address: Some("sender@example.com".to_string()),
        sender_password: None,
        ..Default::default()
    });

    let outcome = partial.send_report("doc@example.com", &report, &[], &[]);
    assert!(outcome.success);
    assert!(outcome.simulated);
    assert_eq!(
        outcome.message,
        "Email sending simulated (no email credentials provided)"
    );
}

#[test]
fn test_email_config_hides_password() {
    let config = EmailConfig {
        sender_address: Some("sender@example.com".to_string()),
        sender_password: Some("hunter2".to_string()),
        ..Default::default()
    };
    let debug = format!("{config:?}");
    assert!(!debug.contains("hunter2"));
    assert_eq!(config.smtp_host, "smtp.gmail.com");
}
