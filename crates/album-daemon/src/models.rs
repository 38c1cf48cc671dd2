use album_core::{Album, AlbumMetadata, CreatedAlbum};
use album_store::storage::BlobReference;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Multipart body accepted by `POST /albums`. Only used for the OpenAPI document.
#[derive(Debug, ToSchema)]
pub struct AlbumUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    pub artist: String,
    pub title: String,
    pub year: String,
}

/// Creation response. Remote storage reports the stored size, local storage
/// reports the path the image was written to.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateAlbumResponse {
    #[serde(rename = "albumID")]
    pub album_id: i64,
    #[serde(rename = "imageSize", skip_serializing_if = "Option::is_none")]
    pub image_size: Option<u64>,
    #[serde(rename = "imagePath", skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl From<CreatedAlbum> for CreateAlbumResponse {
    fn from(created: CreatedAlbum) -> Self {
        let (image_size, image_path) = match created.image {
            BlobReference::Url(_) => (Some(created.size), None),
            BlobReference::Path(path) => (None, Some(path)),
        };
        Self {
            album_id: created.id.get(),
            image_size,
            image_path,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlbumMetadataBody {
    pub artist: String,
    pub title: String,
    pub year: String,
}

impl From<AlbumMetadata> for AlbumMetadataBody {
    fn from(metadata: AlbumMetadata) -> Self {
        Self {
            artist: metadata.artist,
            title: metadata.title,
            year: metadata.year,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlbumResponse {
    #[serde(rename = "albumID")]
    pub album_id: i64,
    pub image_url: String,
    pub metadata: AlbumMetadataBody,
}

impl From<Album> for AlbumResponse {
    fn from(album: Album) -> Self {
        Self {
            album_id: album.id.get(),
            image_url: album.image_url,
            metadata: album.metadata.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}
