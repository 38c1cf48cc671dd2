//! Album ingestion and retrieval.
//!
//! [`AlbumService`] validates an upload, writes the image through the
//! configured [`BlobStore`] and then records the metadata row through an
//! [`AlbumRepository`]. The two writes are not transactional: when the row
//! insert fails after the image was stored, the image stays behind as an
//! orphan and is only reported in the logs.

mod naming;

use std::{fmt, str::FromStr, sync::Arc};

use album_store::{
    storage::{BlobReference, BlobStore, NamingStrategy, StorageError},
    AlbumRepository, NewAlbum,
};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use album_store::AlbumMetadata;

/// Identifier assigned by the repository when an album is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AlbumId(i64);

impl AlbumId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AlbumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AlbumId {
    type Err = InvalidAlbumId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidAlbumId(s.to_string()));
        }
        s.parse::<i64>()
            .map(AlbumId)
            .map_err(|_| InvalidAlbumId(s.to_string()))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid album id '{0}'")]
pub struct InvalidAlbumId(pub String);

/// Uploaded image part as delivered by the transport.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Everything a create request carries. Missing text fields are empty strings.
#[derive(Debug, Clone, Default)]
pub struct AlbumUpload {
    pub image: Option<ImageUpload>,
    pub metadata: AlbumMetadata,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAlbum {
    pub id: AlbumId,
    /// Where the image was written, exactly as the blob store reported it.
    pub image: BlobReference,
    pub size: u64,
}

/// An album read back from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: AlbumId,
    pub image_url: String,
    pub metadata: AlbumMetadata,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid image file: {0}")]
    InvalidImage(&'static str),
    #[error(transparent)]
    InvalidId(#[from] InvalidAlbumId),
    #[error("album {0} not found")]
    NotFound(AlbumId),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to persist album metadata (image stored at {reference}): {cause:#}")]
    Persist {
        reference: String,
        cause: anyhow::Error,
    },
    #[error("failed to load album {0}: {1:#}")]
    Lookup(AlbumId, anyhow::Error),
    #[error("failed to decode metadata of album {0}: {1}")]
    CorruptMetadata(AlbumId, serde_json::Error),
}

impl ServiceError {
    /// Whether the caller, not the infrastructure, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidImage(_) | ServiceError::InvalidId(_)
        )
    }
}

/// Orchestrates blob storage and metadata persistence.
///
/// Built once at startup; holds only shared handles and is cheap to clone
/// into request handlers.
#[derive(Clone)]
pub struct AlbumService {
    repository: Arc<dyn AlbumRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl AlbumService {
    pub fn new(repository: Arc<dyn AlbumRepository>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { repository, blobs }
    }

    pub fn naming(&self) -> NamingStrategy {
        self.blobs.naming()
    }

    /// Stores the image, then inserts the metadata row.
    #[instrument(skip(self, upload))]
    pub async fn create_album(&self, upload: AlbumUpload) -> Result<CreatedAlbum, ServiceError> {
        let AlbumUpload { image, metadata } = upload;
        let image = image.ok_or(ServiceError::InvalidImage("missing image part"))?;
        let name = naming::storage_name(self.blobs.naming(), &image.filename)
            .ok_or(ServiceError::InvalidImage("missing or unusable filename"))?;

        let stored = self
            .blobs
            .store(&name, image.content_type.as_deref(), image.bytes)
            .await?;

        let id = match self
            .repository
            .create(NewAlbum {
                image_url: stored.reference.as_str(),
                metadata: &metadata,
            })
            .await
        {
            Ok(id) => AlbumId(id),
            Err(cause) => {
                warn!(
                    reference = %stored.reference,
                    error = %cause,
                    "album row insert failed; stored image is orphaned"
                );
                return Err(ServiceError::Persist {
                    reference: stored.reference.into_string(),
                    cause,
                });
            }
        };

        info!(album_id = %id, reference = %stored.reference, size = stored.size, "album created");
        Ok(CreatedAlbum {
            id,
            image: stored.reference,
            size: stored.size,
        })
    }

    /// Parses a transport-level identifier and loads the album. Malformed
    /// identifiers are rejected before the repository is consulted.
    pub async fn get_album(&self, raw_id: &str) -> Result<Album, ServiceError> {
        let id: AlbumId = raw_id.parse()?;
        self.fetch_album(id).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_album(&self, id: AlbumId) -> Result<Album, ServiceError> {
        let stored = self
            .repository
            .get_by_id(id.get())
            .await
            .map_err(|err| ServiceError::Lookup(id, err))?
            .ok_or(ServiceError::NotFound(id))?;

        let metadata = stored
            .metadata
            .decode()
            .map_err(|err| ServiceError::CorruptMetadata(id, err))?;

        Ok(Album {
            id,
            image_url: stored.image_url,
            metadata,
        })
    }
}
