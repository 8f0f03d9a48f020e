// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory blob store for deterministic testing.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use codepool_core::{AdapterType, BlobStoreAdapter, CodepoolError, HealthStatus, PluginAdapter};

/// A blob store backed by a map.
///
/// `fail_next_reads(n)` makes the next `n` reads fail with `TransientIo`;
/// reading a name that was never written yields `NotFound`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    failing_reads: Mutex<usize>,
    reads: Mutex<usize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob directly, bypassing size checks.
    pub async fn insert(&self, name: &str, content: impl Into<Bytes>) {
        self.blobs.lock().await.insert(name.to_string(), content.into());
    }

    pub async fn remove(&self, name: &str) -> Option<Bytes> {
        self.blobs.lock().await.remove(name)
    }

    pub async fn fail_next_reads(&self, n: usize) {
        *self.failing_reads.lock().await = n;
    }

    /// Reads attempted so far, failed ones included.
    pub async fn read_count(&self) -> usize {
        *self.reads.lock().await
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory-blob"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::BlobStore
    }

    async fn health_check(&self) -> Result<HealthStatus, CodepoolError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CodepoolError> {
        Ok(())
    }
}

#[async_trait]
impl BlobStoreAdapter for MemoryBlobStore {
    async fn exists(&self, name: &str) -> Result<bool, CodepoolError> {
        Ok(self.blobs.lock().await.contains_key(name))
    }

    async fn write(&self, name: &str, bytes: Bytes, size: u64) -> Result<(), CodepoolError> {
        if bytes.len() as u64 != size {
            return Err(CodepoolError::Validation(format!(
                "declared size {size} does not match {} bytes received",
                bytes.len()
            )));
        }
        self.insert(name, bytes).await;
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Bytes, CodepoolError> {
        *self.reads.lock().await += 1;
        {
            let mut failing = self.failing_reads.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(CodepoolError::TransientIo {
                    message: format!("injected read failure for {name}"),
                    source: None,
                });
            }
        }
        self.blobs
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CodepoolError::not_found("blob", name))
    }

    async fn delete(&self, name: &str) -> Result<(), CodepoolError> {
        self.blobs.lock().await.remove(name);
        Ok(())
    }
}
