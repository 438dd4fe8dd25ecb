use std::path::{Path, PathBuf};

use anyhow::Context;
use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous};

/// Where the store lives and how to open it.
///
/// No connection is kept between operations: every call opens a fresh
/// connection and closes it before returning.
pub(super) struct StoreState {
    db_file: PathBuf,
    options: SqliteConnectOptions,
}

impl std::fmt::Debug for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreState")
            .field("db_file", &self.db_file)
            .finish()
    }
}

impl StoreState {
    pub(super) fn new<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        let db_file = db_file.as_ref().to_path_buf();

        if let Some(parent) = db_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                anyhow::bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_file)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Full);

        Ok(Self { db_file, options })
    }

    pub(super) fn db_file(&self) -> &Path {
        &self.db_file
    }

    /// Open a connection for the duration of one operation.
    pub(super) async fn conn(&self) -> anyhow::Result<SqliteConnection> {
        SqliteConnection::connect_with(&self.options)
            .await
            .with_context(|| format!("Failed to open record store {:?}", self.db_file))
    }
}
