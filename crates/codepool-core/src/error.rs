// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Codepool bucket code service.

use thiserror::Error;

/// The primary error type used across all Codepool crates and adapter traits.
#[derive(Debug, Error)]
pub enum CodepoolError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation collides with an outstanding bucket load or with a
    /// discount in an incompatible lifecycle state. Never retried.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rejected input (CSV below the minimum row policy, wrong file type).
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced load, discount, summary, or blob does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Blob read or bulk-write failure that may succeed on a later attempt.
    #[error("transient I/O error: {message}")]
    TransientIo {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The notification gateway did not deliver the message.
    #[error("notification error: {message}")]
    Notification {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CodepoolError {
    /// Shorthand for a [`CodepoolError::NotFound`] with a displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wrap any error (or message) as a storage error.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// Whether a retry inside the ingestion worker may succeed.
    ///
    /// Conflicts, validation failures and missing entities are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientIo { .. } | Self::Storage { .. } | Self::Timeout { .. }
        )
    }
}
