use std::fmt::Write as _;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::report::ReportData;

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const SIMULATED_MESSAGE: &str = "Email sending simulated (no email credentials provided)";
pub const SENT_MESSAGE: &str = "Report sent successfully!";

/// Sender credentials. Sending is simulated unless both address and password
/// are set.
#[derive(Clone)]
pub struct EmailConfig {
    pub sender_address: Option<String>,
    pub sender_password: Option<String>,
    pub smtp_host: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("sender_address", &self.sender_address)
            .field("sender_password", &self.sender_password.as_ref().map(|_| "***"))
            .field("smtp_host", &self.smtp_host)
            .finish()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender_address: None,
            sender_password: None,
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
        }
    }
}

impl EmailConfig {
    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.sender_address.as_deref(), self.sender_password.as_deref()) {
            (Some(address), Some(password)) if !address.is_empty() && !password.is_empty() => {
                Some((address, password))
            }
            _ => None,
        }
    }
}

/// Result of a delivery attempt. Never an error: the analysis that produced
/// the report stands regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub success: bool,
    pub simulated: bool,
    pub message: String,
}

impl NotificationOutcome {
    pub fn simulated() -> Self {
        Self {
            success: true,
            simulated: true,
            message: SIMULATED_MESSAGE.to_string(),
        }
    }

    pub fn sent() -> Self {
        Self {
            success: true,
            simulated: false,
            message: SENT_MESSAGE.to_string(),
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            simulated: false,
            message: format!("Failed to send report: {error}"),
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Deliver a report. Blocking; callers on an async runtime should move
    /// this onto a blocking thread.
    fn send_report(
        &self,
        recipient: &str,
        data: &ReportData,
        image_png: &[u8],
        pdf: &[u8],
    ) -> NotificationOutcome;
}

/// SMTP delivery over STARTTLS.
#[derive(Debug, Clone, Default)]
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn try_send(
        &self,
        sender: &str,
        password: &str,
        recipient: &str,
        data: &ReportData,
        image_png: &[u8],
        pdf: &[u8],
    ) -> anyhow::Result<()> {
        let message = build_message(sender, recipient, data, image_png, pdf)?;
        let mailer = SmtpTransport::starttls_relay(&self.config.smtp_host)?
            .credentials(Credentials::new(sender.to_string(), password.to_string()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        mailer.send(&message)?;
        Ok(())
    }
}

impl Notifier for EmailNotifier {
    fn send_report(
        &self,
        recipient: &str,
        data: &ReportData,
        image_png: &[u8],
        pdf: &[u8],
    ) -> NotificationOutcome {
        let Some((sender, password)) = self.config.credentials() else {
            tracing::info!(recipient, "no email credentials, simulating delivery");
            return NotificationOutcome::simulated();
        };

        match self.try_send(sender, password, recipient, data, image_png, pdf) {
            Ok(()) => {
                tracing::info!(recipient, "report emailed");
                NotificationOutcome::sent()
            }
            Err(e) => {
                tracing::warn!(recipient, error = %e, "report email failed");
                NotificationOutcome::failed(e)
            }
        }
    }
}

pub fn subject(data: &ReportData) -> String {
    format!("Brain Tumor Detection Report - {}", data.patient_name)
}

/// Patient name reduced to a single path component: alphanumerics, spaces,
/// `-` and `_` are kept, anything else becomes `_`.
pub fn safe_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim().is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

pub fn image_attachment_name(data: &ReportData) -> String {
    format!("tumor_detection_{}.png", safe_file_stem(&data.patient_name))
}

pub fn pdf_attachment_name(data: &ReportData) -> String {
    format!("{}_tumor_report.pdf", safe_file_stem(&data.patient_name))
}

/// Build the multipart message: HTML summary plus PNG and PDF attachments.
pub fn build_message(
    sender: &str,
    recipient: &str,
    data: &ReportData,
    image_png: &[u8],
    pdf: &[u8],
) -> anyhow::Result<Message> {
    let from: Mailbox = sender.parse()?;
    let to: Mailbox = recipient.parse()?;

    let body = MultiPart::mixed()
        .singlepart(SinglePart::html(html_body(data)))
        .singlepart(
            Attachment::new(image_attachment_name(data))
                .body(image_png.to_vec(), ContentType::parse("image/png")?),
        )
        .singlepart(
            Attachment::new(pdf_attachment_name(data))
                .body(pdf.to_vec(), ContentType::parse("application/pdf")?),
        );

    Ok(Message::builder()
        .from(from)
        .to(to)
        .subject(subject(data))
        .multipart(body)?)
}

pub fn html_body(data: &ReportData) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<html><body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <h2>Brain Tumor Detection Report</h2>\
         <h3>Patient Information</h3>\
         <table border=\"1\" cellpadding=\"6\" style=\"border-collapse: collapse;\">\
         <tr><th>Name</th><td>{}</td></tr>\
         <tr><th>Age</th><td>{}</td></tr>\
         <tr><th>Gender</th><td>{}</td></tr>\
         <tr><th>Date</th><td>{}</td></tr>\
         </table>\
         <h3>Detection Results</h3>\
         <table border=\"1\" cellpadding=\"6\" style=\"border-collapse: collapse;\">\
         <tr><th>Number of Tumors</th><td>{}</td></tr>\
         <tr><th>Severity</th><td>{}</td></tr>\
         </table>\
         <h3>Tumor Measurements</h3><ul>",
        escape(&data.patient_name),
        data.age_text(),
        data.gender_text(),
        data.date_text(),
        data.tumor_count(),
        data.severity_text(),
    );
    for line in data.measurement_lines() {
        let _ = write!(html, "<li>{line}</li>");
    }
    let _ = write!(
        html,
        "</ul><p><strong>Recommendation:</strong> {}</p>\
         <p>Attached:</p><ul>\
         <li>Processed image showing tumor detection</li>\
         <li>Detailed PDF report</li></ul>\
         <p style=\"font-size: 12px; color: #777;\">{}</p>\
         </body></html>",
        escape(data.recommendation_text()),
        crate::report::DISCLAIMER,
    );
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
