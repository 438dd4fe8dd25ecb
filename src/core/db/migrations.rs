//! Ordered, additive schema migrations for the `detections` table.
//!
//! Every step inspects the live schema before doing anything, so running the
//! list against a database written by any earlier version (including ones that
//! never recorded a schema version) only adds what is missing.

use sqlx::Row;
use sqlx::sqlite::SqliteConnection;

pub const TABLE: &str = "detections";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    /// The base table with only the columns every version has had.
    CreateTable,
    AddColumn {
        name: &'static str,
        definition: &'static str,
    },
    CreateIndex {
        name: &'static str,
        column: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub step: MigrationStep,
}

const fn add_column(
    version: i64,
    description: &'static str,
    name: &'static str,
    definition: &'static str,
) -> Migration {
    Migration {
        version,
        description,
        step: MigrationStep::AddColumn { name, definition },
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create detections table",
        step: MigrationStep::CreateTable,
    },
    add_column(2, "add tumor count", "tumor_count", "INTEGER"),
    add_column(3, "add tumor lengths", "tumor_lengths", "TEXT"),
    add_column(4, "add detection time", "detection_time", "TIMESTAMP"),
    add_column(5, "add processed image", "processed_image", "BLOB"),
    add_column(6, "add patient age", "patient_age", "INTEGER"),
    add_column(7, "add patient gender", "patient_gender", "TEXT"),
    add_column(8, "add severity", "severity", "TEXT"),
    add_column(9, "add recommendation", "recommendation", "TEXT"),
    Migration {
        version: 10,
        description: "index detection time",
        step: MigrationStep::CreateIndex {
            name: "idx_detections_detection_time",
            column: "detection_time",
        },
    },
];

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub async fn table_exists(conn: &mut SqliteConnection) -> anyhow::Result<bool> {
    let found = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1")
        .bind(TABLE)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Column names of the detections table, in table order. Empty if the table
/// does not exist.
pub async fn columns(conn: &mut SqliteConnection) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({TABLE})"))
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| Ok(row.try_get::<String, _>("name")?))
        .collect()
}

async fn index_exists(conn: &mut SqliteConnection, name: &str) -> anyhow::Result<bool> {
    let found = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'index' AND name = $1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub async fn schema_version(conn: &mut SqliteConnection) -> anyhow::Result<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;
    Ok(version)
}

async fn set_schema_version(conn: &mut SqliteConnection, version: i64) -> anyhow::Result<()> {
    // PRAGMA values cannot be bound
    sqlx::query(&format!("PRAGMA user_version = {version}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl Migration {
    /// Whether the live schema already contains what this step adds.
    pub async fn is_applied(&self, conn: &mut SqliteConnection) -> anyhow::Result<bool> {
        match self.step {
            MigrationStep::CreateTable => table_exists(conn).await,
            MigrationStep::AddColumn { name, .. } => {
                Ok(columns(conn).await?.iter().any(|c| c.eq_ignore_ascii_case(name)))
            }
            MigrationStep::CreateIndex { name, .. } => index_exists(conn, name).await,
        }
    }

    /// Apply the step unconditionally. Use [`Migration::is_applied`] first.
    pub async fn apply(&self, conn: &mut SqliteConnection) -> anyhow::Result<()> {
        let sql = match self.step {
            MigrationStep::CreateTable => format!(
                "CREATE TABLE {TABLE} (id INTEGER PRIMARY KEY AUTOINCREMENT, patient_name TEXT)"
            ),
            MigrationStep::AddColumn { name, definition } => {
                format!("ALTER TABLE {TABLE} ADD COLUMN {name} {definition}")
            }
            MigrationStep::CreateIndex { name, column } => {
                format!("CREATE INDEX {name} ON {TABLE} ({column})")
            }
        };
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }
}

/// Migrations whose changes are missing from the live schema.
pub async fn pending(conn: &mut SqliteConnection) -> anyhow::Result<Vec<Migration>> {
    let mut missing = Vec::new();
    for migration in MIGRATIONS {
        if !migration.is_applied(conn).await? {
            missing.push(*migration);
        }
    }
    Ok(missing)
}

/// Bring the schema up to date. Returns the migrations that were applied.
pub async fn run(conn: &mut SqliteConnection) -> anyhow::Result<Vec<Migration>> {
    let mut applied = Vec::new();

    for migration in MIGRATIONS {
        if migration.is_applied(conn).await? {
            tracing::trace!(version = migration.version, "migration already applied");
            continue;
        }
        migration.apply(conn).await?;
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied schema migration"
        );
        applied.push(*migration);
    }

    if schema_version(conn).await? < latest_version() {
        set_schema_version(conn, latest_version()).await?;
    }

    Ok(applied)
}
