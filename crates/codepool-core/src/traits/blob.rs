// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blob store adapter trait and the lazy CSV record reader built on it.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CodepoolError;
use crate::traits::adapter::PluginAdapter;
use crate::types::csv_blob_name;

/// Opaque key/value byte storage holding uploaded CSV files.
///
/// Blob names are flat keys; CSV uploads are stored as `<uid>.csv`.
#[async_trait]
pub trait BlobStoreAdapter: PluginAdapter {
    /// Whether a blob with this name exists.
    async fn exists(&self, name: &str) -> Result<bool, CodepoolError>;

    /// Stores `bytes` under `name`, replacing any previous content.
    ///
    /// `size` is the declared length and must match `bytes.len()`.
    async fn write(&self, name: &str, bytes: Bytes, size: u64) -> Result<(), CodepoolError>;

    /// Reads the full content of a blob. Missing blobs are `NotFound`.
    async fn read(&self, name: &str) -> Result<Bytes, CodepoolError>;

    /// Removes a blob. Removing a missing blob is not an error.
    async fn delete(&self, name: &str) -> Result<(), CodepoolError>;

    /// Opens a fresh record reader over `<uid>.csv`.
    ///
    /// Every call returns an independent reader starting at the first row.
    async fn read_csv(&self, uid: &str) -> Result<CsvRecords, CodepoolError> {
        let bytes = self.read(&csv_blob_name(uid)).await?;
        Ok(CsvRecords::from_bytes(bytes))
    }
}

/// Lazily parsed CSV records: no header row, ragged rows allowed.
///
/// Yields `Validation` for a single unreadable row (the caller may skip it)
/// and `TransientIo` when the underlying read itself fails.
pub struct CsvRecords {
    inner: csv::StringRecordsIntoIter<Cursor<Bytes>>,
}

impl CsvRecords {
    pub fn from_bytes(bytes: Bytes) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(bytes));
        Self {
            inner: reader.into_records(),
        }
    }

    /// Drains the reader, keeping the first column of every readable row
    /// verbatim. Whitespace-only codes count as skipped.
    ///
    /// Returns the codes in file order and the number of skipped rows.
    pub fn first_column(self) -> Result<(Vec<String>, usize), CodepoolError> {
        let mut codes = Vec::new();
        let mut skipped = 0usize;
        for record in self {
            match record {
                Ok(fields) => match fields.into_iter().next() {
                    Some(code) if !code.trim().is_empty() => codes.push(code),
                    _ => skipped += 1,
                },
                Err(CodepoolError::Validation(reason)) => {
                    tracing::warn!(%reason, "skipping malformed csv row");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((codes, skipped))
    }
}

impl Iterator for CsvRecords {
    type Item = Result<Vec<String>, CodepoolError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.inner.next()?;
        Some(match record {
            Ok(record) => Ok(record.iter().map(str::to_owned).collect()),
            Err(e) => match e.kind() {
                csv::ErrorKind::Io(_) => Err(CodepoolError::TransientIo {
                    message: "csv read failed".into(),
                    source: Some(Box::new(e)),
                }),
                _ => Err(CodepoolError::Validation(e.to_string())),
            },
        })
    }
}
