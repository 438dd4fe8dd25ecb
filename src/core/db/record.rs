use std::future::Future;

use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::models::{Gender, MAX_AGE, PatientInfo, Severity};
use crate::severity::Assessment;

/// One completed analysis as read back from the store.
///
/// Columns added by later schema versions are optional: rows written before
/// they existed, or holding values this version cannot interpret, read back
/// as `None` instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub id: i64,
    pub patient_name: String,
    pub patient_age: Option<u8>,
    pub patient_gender: Option<Gender>,
    pub tumor_lengths: Vec<f64>,
    pub detection_time: Option<OffsetDateTime>,
    pub processed_image: Option<Vec<u8>>,
    pub severity: Option<Severity>,
    pub recommendation: Option<String>,
}

impl DetectionRecord {
    /// Always the number of stored lengths.
    pub fn tumor_count(&self) -> usize {
        self.tumor_lengths.len()
    }

    pub(super) fn from_row(row: &SqliteRow) -> anyhow::Result<Self> {
        let id: i64 = row.try_get("id")?;

        let tumor_lengths = match lenient::<String>(row, "tumor_lengths") {
            Some(json) => serde_json::from_str::<Vec<f64>>(&json).unwrap_or_else(|e| {
                tracing::warn!(id, error = %e, "unreadable tumor lengths, treating as empty");
                Vec::new()
            }),
            None => Vec::new(),
        };

        Ok(Self {
            id,
            patient_name: lenient::<String>(row, "patient_name").unwrap_or_default(),
            patient_age: lenient::<i64>(row, "patient_age")
                .and_then(|age| u8::try_from(age).ok())
                .filter(|age| *age <= MAX_AGE),
            patient_gender: lenient::<String>(row, "patient_gender")
                .and_then(|g| g.parse().ok()),
            tumor_lengths,
            detection_time: lenient::<String>(row, "detection_time")
                .and_then(|t| parse_timestamp(&t)),
            processed_image: lenient::<Vec<u8>>(row, "processed_image"),
            severity: lenient::<String>(row, "severity").and_then(|s| s.parse().ok()),
            recommendation: lenient::<String>(row, "recommendation"),
        })
    }
}

/// Read a column, mapping NULL, a missing column, or a type mismatch to `None`.
fn lenient<T>(row: &SqliteRow, column: &str) -> Option<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<Option<T>, _>(column).ok().flatten()
}

/// Everything needed to write a record. The severity and recommendation come
/// from the [`Assessment`], so they cannot disagree with the lengths.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub patient: PatientInfo,
    pub assessment: Assessment,
    /// Encoded PNG of the annotated scan
    pub processed_image: Option<Vec<u8>>,
    /// Defaults to the insert time
    pub detection_time: Option<OffsetDateTime>,
}

pub trait RecordRepository {
    /// Create or upgrade the schema. Safe to call repeatedly.
    fn initialize(&self) -> impl Future<Output = anyhow::Result<()>>;
    /// Persist a record and return its id.
    fn insert(&self, record: &NewDetection) -> impl Future<Output = anyhow::Result<i64>>;
    /// Every record, newest first.
    fn list_all(&self) -> impl Future<Output = anyhow::Result<Vec<DetectionRecord>>>;
    /// Delete every record. Returns how many were removed.
    fn clear_all(&self) -> impl Future<Output = anyhow::Result<u64>>;
}

/// Storage format for detection times: UTC, microsecond precision, which
/// sorts lexicographically in time order.
pub fn format_timestamp(time: OffsetDateTime) -> anyhow::Result<String> {
    let utc = time.to_offset(UtcOffset::UTC);
    Ok(utc.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]"
    ))?)
}

/// Naive values are read as UTC. Rows written by older tools hold local
/// wall-clock time in the same format and shift by the local offset.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(dt) = PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ) {
        return Some(dt.assume_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Some(dt.assume_utc());
    }
    OffsetDateTime::parse(value, &Rfc3339).ok()
}
