// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use codepool_core::CodepoolError;
use tracing::{debug, info};

use crate::migrations::run_migrations;

/// Handle to the Codepool SQLite database.
///
/// Cloning shares the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and migrate it.
    pub async fn open(path: &str) -> Result<Self, CodepoolError> {
        Self::open_with_options(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, CodepoolError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(CodepoolError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(CodepoolError::storage)?;

        conn.call(move |conn| -> Result<(), CodepoolError> {
            if wal_mode {
                let mode: String = conn
                    .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                    .map_err(sql_err)?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(sql_err)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(sql_err)?;
            conn.busy_timeout(Duration::from_secs(5)).map_err(sql_err)?;
            run_migrations(conn)
        })
        .await
        .map_err(flatten_err)?;

        info!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the background connection.
    pub async fn close(self) -> Result<(), CodepoolError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        self.conn
            .close()
            .await
            .map_err(|e| CodepoolError::storage(e.to_string()))
    }
}

/// Convert a tokio-rusqlite error into `CodepoolError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CodepoolError {
    match e {
        tokio_rusqlite::Error::Error(inner) => sql_err(inner),
        other => CodepoolError::storage(other.to_string()),
    }
}

/// Unwrap a domain error raised inside a connection closure.
pub(crate) fn flatten_err(e: tokio_rusqlite::Error<CodepoolError>) -> CodepoolError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        other => CodepoolError::storage(other.to_string()),
    }
}

/// Classify a rusqlite error.
///
/// A violation of the outstanding-load index means another load for the
/// discount is already PENDING or RUNNING.
pub(crate) fn sql_err(e: rusqlite::Error) -> CodepoolError {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &e
        && code.code == rusqlite::ErrorCode::ConstraintViolation
        && message.contains("bucket_code_loads.discount_id")
    {
        return CodepoolError::Conflict(
            "an outstanding bucket load already exists for this discount".into(),
        );
    }
    CodepoolError::storage(e)
}

/// Parse a TEXT column into a strum enum.
pub(crate) fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
