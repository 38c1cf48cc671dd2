use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use super::{BlobReference, BlobStore, NamingStrategy, StorageError, StoredBlob};

pub const DEFAULT_IMAGE_DIR: &str = "./images";

/// Writes images into a fixed directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(name)),
            _ => Err(StorageError::InvalidName(name.to_string())),
        }
    }
}

impl Default for LocalBlobStore {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_DIR)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn naming(&self) -> NamingStrategy {
        NamingStrategy::Original
    }

    async fn store(
        &self,
        name: &str,
        _content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<StoredBlob, StorageError> {
        let path = self.path_for(name)?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StorageError::CreateDir(self.root.clone(), err))?;
        fs::write(&path, &bytes)
            .await
            .map_err(|err| StorageError::Write(path.clone(), err))?;

        debug!(path = %path.display(), size = bytes.len(), "image written to disk");
        Ok(StoredBlob {
            reference: BlobReference::Path(reference_for(&path)),
            size: bytes.len() as u64,
        })
    }
}

/// Display form of a written path with `.` components dropped, so the default
/// directory yields `images/cover.jpg`.
fn reference_for(path: &Path) -> String {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect::<PathBuf>()
        .display()
        .to_string()
}
