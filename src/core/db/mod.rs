pub mod migrations;
mod record;
mod state;

use std::cmp::Ordering;
use std::path::Path;

use sqlx::Connection;
use state::StoreState;
use time::OffsetDateTime;

pub use migrations::{MIGRATIONS, Migration, MigrationStep};
pub use record::{
    DetectionRecord, NewDetection, RecordRepository, format_timestamp, parse_timestamp,
};

/// Default file name of the local record store.
pub const DEFAULT_DB_FILE: &str = "tumor_detection.db";

/// File-backed store of detection records.
#[derive(Debug)]
pub struct RecordStore {
    state: StoreState,
}

impl RecordStore {
    /// Open (creating if needed) and migrate the store at `db_file`.
    pub async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        let store = Self {
            state: StoreState::new(db_file)?,
        };
        store.initialize().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        self.state.db_file()
    }

    /// Column names currently present in the detections table.
    pub async fn columns(&self) -> anyhow::Result<Vec<String>> {
        let mut conn = self.state.conn().await?;
        let columns = migrations::columns(&mut conn).await?;
        conn.close().await?;
        Ok(columns)
    }

    /// Migrations not yet reflected in the on-disk schema.
    pub async fn pending_migrations(&self) -> anyhow::Result<Vec<Migration>> {
        let mut conn = self.state.conn().await?;
        let pending = migrations::pending(&mut conn).await?;
        conn.close().await?;
        Ok(pending)
    }

    pub async fn schema_version(&self) -> anyhow::Result<i64> {
        let mut conn = self.state.conn().await?;
        let version = migrations::schema_version(&mut conn).await?;
        conn.close().await?;
        Ok(version)
    }

    /// Look up one record by id.
    pub async fn find(&self, id: i64) -> anyhow::Result<Option<DetectionRecord>> {
        Ok(self.list_all().await?.into_iter().find(|r| r.id == id))
    }
}

impl RecordRepository for RecordStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;
        let applied = migrations::run(&mut *tx).await?;
        tx.commit().await?;
        conn.close().await?;

        if applied.is_empty() {
            tracing::debug!(db = ?self.path(), "record store schema up to date");
        } else {
            tracing::info!(db = ?self.path(), applied = applied.len(), "record store migrated");
        }
        Ok(())
    }

    async fn insert(&self, record: &NewDetection) -> anyhow::Result<i64> {
        let detection_time = record
            .detection_time
            .unwrap_or_else(OffsetDateTime::now_utc);
        let detection_time = format_timestamp(detection_time)?;
        let lengths = serde_json::to_string(record.assessment.lengths())?;
        let severity = record.assessment.severity();

        let mut conn = self.state.conn().await?;
        let id = sqlx::query(
            "INSERT INTO detections (patient_name, patient_age, patient_gender, tumor_count, \
             tumor_lengths, detection_time, processed_image, severity, recommendation) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.patient.name.as_str())
        .bind(i64::from(record.patient.age))
        .bind(record.patient.gender.as_str())
        .bind(record.assessment.tumor_count() as i64)
        .bind(lengths)
        .bind(detection_time)
        .bind(record.processed_image.as_deref())
        .bind(severity.label())
        .bind(severity.recommendation())
        .execute(&mut conn)
        .await?
        .last_insert_rowid();
        conn.close().await?;

        tracing::info!(id, severity = severity.label(), "stored detection record");
        Ok(id)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<DetectionRecord>> {
        let mut conn = self.state.conn().await?;
        let rows = sqlx::query(
            "SELECT id, patient_name, patient_age, patient_gender, tumor_lengths, \
             detection_time, processed_image, severity, recommendation \
             FROM detections ORDER BY id DESC",
        )
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        let mut records = rows
            .iter()
            .map(DetectionRecord::from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        // Newest first; rows without a readable time go last
        records.sort_by(|a, b| match (a.detection_time, b.detection_time) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(records)
    }

    async fn clear_all(&self) -> anyhow::Result<u64> {
        let mut conn = self.state.conn().await?;
        let deleted = sqlx::query("DELETE FROM detections")
            .execute(&mut conn)
            .await?
            .rows_affected();
        conn.close().await?;

        tracing::warn!(deleted, "cleared detection history");
        Ok(deleted)
    }
}
