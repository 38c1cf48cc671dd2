//! Blob storage adapters: write image bytes somewhere durable and get back an
//! address for them.
//!
//! Two interchangeable backends exist, selected at startup: [`S3BlobStore`]
//! (public URL in a bucket) and [`LocalBlobStore`] (relative path on disk).

mod local;
mod s3;

use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use local::{LocalBlobStore, DEFAULT_IMAGE_DIR};
pub use s3::{S3BlobStore, S3Settings};

/// How callers should derive the storage key for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingStrategy {
    /// Random unique key that keeps the original file extension.
    Unique,
    /// The uploaded filename as-is; a later upload with the same name wins.
    Original,
}

/// Address of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobReference {
    /// Publicly resolvable URL.
    Url(String),
    /// Path on the local filesystem, relative to the working directory.
    Path(String),
}

impl BlobReference {
    pub fn as_str(&self) -> &str {
        match self {
            BlobReference::Url(value) | BlobReference::Path(value) => value,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            BlobReference::Url(value) | BlobReference::Path(value) => value,
        }
    }
}

impl fmt::Display for BlobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub reference: BlobReference,
    /// Number of bytes written.
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage name '{0}'")]
    InvalidName(String),
    #[error("failed to create image directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("failed to write image file {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to upload object '{key}' to bucket '{bucket}': {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Write-only byte sink the album service stores images through.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    fn naming(&self) -> NamingStrategy;

    /// Persists `bytes` under `name`. Each call is attempted exactly once.
    async fn store(
        &self,
        name: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<StoredBlob, StorageError>;
}
