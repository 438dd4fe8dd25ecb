use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Rgb};
use time::OffsetDateTime;
use time::macros::datetime;
use tumorscan::core::db::{NewDetection, RecordStore};
use tumorscan::detection::Detector;
use tumorscan::report::{NotificationOutcome, Notifier, ReportData};
use tumorscan::{BoundingBox, Gender, PatientInfo, classify};

/// Creates a RecordStore in a temporary directory.
/// Returns both the store and the temp directory (which must be kept alive).
pub async fn create_test_store() -> (RecordStore, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let store = RecordStore::open(dir.path().join("test.db"))
        .await
        .expect("Failed to create test store");
    (store, dir)
}

/// A grey gradient scan of the given size.
pub fn create_test_image(width: u32, height: u32) -> DynamicImage {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let v = ((x + y) % 256) as u8;
        Rgb([v, v, v])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn test_patient() -> PatientInfo {
    PatientInfo::new("Jane Doe", 42, Gender::Female).expect("valid patient")
}

pub const TEST_TIME: OffsetDateTime = datetime!(2024-03-15 10:30:00.123456 UTC);

/// Creates a NewDetection for a 1000x1000 scan with the given lengths.
pub fn make_new_detection(name: &str, lengths: &[f64], time: OffsetDateTime) -> NewDetection {
    NewDetection {
        patient: PatientInfo::new(name, 42, Gender::Female).expect("valid patient"),
        assessment: classify(lengths, 1000, 1000).expect("valid lengths"),
        processed_image: Some(vec![0x89, b'P', b'N', b'G', 1, 2, 3]),
        detection_time: Some(time),
    }
}

/// Detector returning fixed boxes and counting calls.
pub struct FakeDetector {
    pub boxes: Vec<BoundingBox>,
    pub calls: AtomicUsize,
}

impl FakeDetector {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for FakeDetector {
    fn detect(&self, _img: &DynamicImage) -> anyhow::Result<Vec<BoundingBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.boxes.clone())
    }
}

pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _img: &DynamicImage) -> anyhow::Result<Vec<BoundingBox>> {
        anyhow::bail!("model exploded")
    }
}

/// Detector that takes longer than any sensible test timeout.
pub struct SlowDetector(pub Duration);

impl Detector for SlowDetector {
    fn detect(&self, _img: &DynamicImage) -> anyhow::Result<Vec<BoundingBox>> {
        std::thread::sleep(self.0);
        Ok(vec![BoundingBox::new(0.0, 0.0, 10.0, 10.0)])
    }
}

/// Notifier that records recipients and returns a fixed outcome.
pub struct RecordingNotifier {
    pub outcome: NotificationOutcome,
    pub recipients: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new(outcome: NotificationOutcome) -> Self {
        Self {
            outcome,
            recipients: Mutex::new(Vec::new()),
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.recipients.lock().expect("lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send_report(
        &self,
        recipient: &str,
        _data: &ReportData,
        _image_png: &[u8],
        _pdf: &[u8],
    ) -> NotificationOutcome {
        self.recipients
            .lock()
            .expect("lock")
            .push(recipient.to_string());
        self.outcome.clone()
    }
}
