// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous acceptance checks for uploaded CSV files.
//!
//! Everything here runs before a bucket load exists; a rejected upload
//! leaves no trace in the blob store or the database.

use std::path::Path;

use bytes::Bytes;
use codepool_config::model::{BlobConfig, IngestConfig};
use codepool_core::{CodepoolError, CsvRecords};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub min_csv_rows: usize,
    pub max_upload_bytes: u64,
}

impl UploadPolicy {
    pub fn from_config(ingest: &IngestConfig, blob: &BlobConfig) -> Self {
        Self {
            min_csv_rows: ingest.min_csv_rows,
            max_upload_bytes: blob.max_upload_bytes,
        }
    }

    /// Check file type, size and row count. Returns the number of codes found.
    pub fn validate(&self, file_name: &str, bytes: &Bytes) -> Result<usize, CodepoolError> {
        let is_csv = Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(CodepoolError::Validation(format!(
                "`{file_name}` is not a .csv file"
            )));
        }
        if bytes.is_empty() {
            return Err(CodepoolError::Validation(format!("`{file_name}` is empty")));
        }
        if bytes.len() as u64 > self.max_upload_bytes {
            return Err(CodepoolError::Validation(format!(
                "`{file_name}` is {} bytes, the limit is {}",
                bytes.len(),
                self.max_upload_bytes
            )));
        }

        let (codes, _) = CsvRecords::from_bytes(bytes.clone()).first_column()?;
        if codes.len() < self.min_csv_rows {
            return Err(CodepoolError::Validation(format!(
                "`{file_name}` has {} codes, at least {} are required",
                codes.len(),
                self.min_csv_rows
            )));
        }
        Ok(codes.len())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default(), &BlobConfig::default())
    }
}
