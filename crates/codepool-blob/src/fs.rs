// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory-backed blob store.
//!
//! Each blob is a file directly under the root directory. Writes go to a
//! temporary sibling first and are renamed into place, so readers never
//! observe a partially written CSV.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use codepool_core::{AdapterType, BlobStoreAdapter, CodepoolError, HealthStatus, PluginAdapter};
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CodepoolError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blob names are flat file names; anything that could escape the root
    /// is rejected.
    fn path_for(&self, name: &str) -> Result<PathBuf, CodepoolError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(CodepoolError::Validation(format!(
                "invalid blob name `{name}`"
            )));
        }
        Ok(self.root.join(name))
    }
}

fn io_err(path: &Path, e: std::io::Error) -> CodepoolError {
    CodepoolError::TransientIo {
        message: format!("blob I/O on {} failed", path.display()),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl PluginAdapter for FsBlobStore {
    fn name(&self) -> &str {
        "fs"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::BlobStore
    }

    async fn health_check(&self) -> Result<HealthStatus, CodepoolError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Unhealthy(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), CodepoolError> {
        Ok(())
    }
}

#[async_trait]
impl BlobStoreAdapter for FsBlobStore {
    async fn exists(&self, name: &str) -> Result<bool, CodepoolError> {
        let path = self.path_for(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_err(&path, e))
    }

    async fn write(&self, name: &str, bytes: Bytes, size: u64) -> Result<(), CodepoolError> {
        if bytes.len() as u64 != size {
            return Err(CodepoolError::Validation(format!(
                "declared size {size} does not match {} bytes received",
                bytes.len()
            )));
        }
        let path = self.path_for(name)?;
        let tmp = self
            .root
            .join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        file.write_all(&bytes).await.map_err(|e| io_err(&tmp, e))?;
        file.sync_all().await.map_err(|e| io_err(&tmp, e))?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path, e));
        }
        debug!(blob = name, size, "blob written");
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Bytes, CodepoolError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CodepoolError::not_found("blob", name))
            }
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), CodepoolError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}
