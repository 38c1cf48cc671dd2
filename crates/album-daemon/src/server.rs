use std::sync::Arc;

use album_core::{AlbumService, AlbumUpload, ImageUpload, ServiceError};
use album_store::{
    storage::{BlobStore, LocalBlobStore, S3BlobStore},
    Database,
};
use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use utoipa::OpenApi;

use crate::config::{AppConfig, StorageBackend};
use crate::models::{
    AlbumMetadataBody, AlbumResponse, AlbumUploadForm, CreateAlbumResponse, ErrorBody,
    HealthResponse,
};

const INVALID_IMAGE: &str = "Invalid image file";

pub async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;

    let db = Database::connect(&config.db_url, config.layout)
        .await
        .context("failed to open database")?;

    let blobs: Arc<dyn BlobStore> = match &config.storage {
        StorageBackend::S3(settings) => Arc::new(S3BlobStore::connect(settings.clone()).await),
        StorageBackend::Local { image_dir } => Arc::new(LocalBlobStore::new(image_dir.clone())),
    };
    info!(
        storage = config.storage.name(),
        layout = config.layout.as_str(),
        "album storage configured"
    );

    let albums = AlbumService::new(Arc::new(db), blobs);
    let state = Arc::new(AppState { albums });

    let app = build_router(state, config.max_upload_bytes).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listen socket")?;

    info!(addr = %config.listen_addr, "album-daemon listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/albums", post(create_album))
        .route("/albums/:albumID", get(get_album))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[derive(Clone)]
pub struct AppState {
    pub albums: AlbumService,
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

#[utoipa::path(
    post,
    path = "/albums",
    request_body(content = AlbumUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Album stored", body = CreateAlbumResponse),
        (status = 400, description = "Missing or unreadable image part", body = ErrorBody),
        (status = 413, description = "Upload exceeds the configured limit", body = ErrorBody),
        (status = 500, description = "Blob store or database failure", body = ErrorBody)
    )
)]
async fn create_album(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CreateAlbumResponse>, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        debug!(%rejection, "rejected non-multipart upload");
        ApiError::bad_request(INVALID_IMAGE)
    })?;
    let upload = read_upload(multipart).await?;

    let created = state.albums.create_album(upload).await?;
    Ok(Json(created.into()))
}

#[utoipa::path(
    get,
    path = "/albums/{albumID}",
    params(("albumID" = String, Path, description = "Numeric album identifier")),
    responses(
        (status = 200, description = "Album found", body = AlbumResponse),
        (status = 400, description = "Malformed album id", body = ErrorBody),
        (status = 404, description = "Album not found", body = ErrorBody),
        (status = 500, description = "Database failure", body = ErrorBody)
    )
)]
async fn get_album(
    State(state): State<Arc<AppState>>,
    Path(album_id): Path<String>,
) -> Result<Json<AlbumResponse>, ApiError> {
    let album = state.albums.get_album(&album_id).await?;
    Ok(Json(album.into()))
}

/// Collects the multipart parts. The first `image` part carrying a filename
/// wins, as does the first occurrence of each text field; unknown parts are
/// skipped.
async fn read_upload(mut multipart: Multipart) -> Result<AlbumUpload, ApiError> {
    let mut upload = AlbumUpload::default();
    let mut artist = None;
    let mut title = None;
    let mut year = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                if upload.image.is_some() {
                    continue;
                }
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload.image = Some(ImageUpload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            "artist" | "title" | "year" => {
                let value = field.text().await.map_err(multipart_error)?;
                let slot = match name.as_str() {
                    "artist" => &mut artist,
                    "title" => &mut title,
                    _ => &mut year,
                };
                if slot.is_none() {
                    *slot = Some(value);
                }
            }
            _ => {}
        }
    }

    upload.metadata.artist = artist.unwrap_or_default();
    upload.metadata.title = title.unwrap_or_default();
    upload.metadata.year = year.unwrap_or_default();
    Ok(upload)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "image exceeds the upload size limit",
        )
    } else {
        debug!(error = %err, "malformed multipart body");
        ApiError::bad_request(INVALID_IMAGE)
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidImage(_) => ApiError::bad_request(INVALID_IMAGE),
            ServiceError::InvalidId(inner) => ApiError::bad_request(inner.to_string()),
            ServiceError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "Album not found"),
            other => ApiError::internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "api error");
        } else {
            debug!(status = %self.status, message = %self.message, "request rejected");
        }
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

pub mod docs {
    use super::*;

    #[derive(OpenApi)]
    #[openapi(
        info(title = "Album Service API", version = "0.1.0"),
        paths(health, create_album, get_album),
        components(schemas(
            HealthResponse,
            AlbumUploadForm,
            CreateAlbumResponse,
            AlbumResponse,
            AlbumMetadataBody,
            ErrorBody
        ))
    )]
    pub struct ApiDoc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use album_store::{
        storage::{BlobReference, NamingStrategy, StorageError, StoredBlob},
        MetadataLayout,
    };
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use bytes::Bytes;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::Service;

    const BOUNDARY: &str = "album-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File {
            name: &'a str,
            filename: &'a str,
            content_type: &'a str,
            bytes: &'a [u8],
        },
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/albums")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    fn cover_parts() -> Vec<Part<'static>> {
        vec![
            Part::File {
                name: "image",
                filename: "cover.jpg",
                content_type: "image/jpeg",
                bytes: b"\xff\xd8\xff\xe0not-really-a-jpeg",
            },
            Part::Text("artist", "Boards"),
            Part::Text("title", "Music Has..."),
            Part::Text("year", "1998"),
        ]
    }

    struct TestApp {
        router: Router,
        db: Database,
        temp: TempDir,
    }

    async fn setup_test_app(max_upload_bytes: usize) -> TestApp {
        let temp = TempDir::new().expect("tempdir");
        let db_url = format!("sqlite://{}", temp.path().join("albums.db").display());
        let db = Database::connect(&db_url, MetadataLayout::Serialized)
            .await
            .expect("db");
        let blobs = LocalBlobStore::new(temp.path().join("images"));
        let albums = AlbumService::new(Arc::new(db.clone()), Arc::new(blobs));
        let router = build_router(Arc::new(AppState { albums }), max_upload_bytes);
        TestApp { router, db, temp }
    }

    /// Answers like an object store: a URL instead of a path.
    struct UrlBlobStore;

    #[async_trait]
    impl BlobStore for UrlBlobStore {
        fn naming(&self) -> NamingStrategy {
            NamingStrategy::Unique
        }

        async fn store(
            &self,
            name: &str,
            _content_type: Option<&str>,
            bytes: Bytes,
        ) -> Result<StoredBlob, StorageError> {
            Ok(StoredBlob {
                reference: BlobReference::Url(format!("https://covers.example/{name}")),
                size: bytes.len() as u64,
            })
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let mut app = setup_test_app(1024 * 1024).await;
        let response = app.router.call(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn created_album_can_be_fetched() {
        let mut app = setup_test_app(1024 * 1024).await;

        let response = app
            .router
            .call(upload_request(&cover_parts()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = json_body(response).await;
        let album_id = created["albumID"].as_i64().expect("integer albumID");
        let expected_path = app.temp.path().join("images").join("cover.jpg");
        assert_eq!(
            created["imagePath"],
            expected_path.display().to_string().as_str()
        );
        assert!(created.get("imageSize").is_none());
        assert!(expected_path.exists());

        let response = app
            .router
            .call(get_request(&format!("/albums/{album_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let album = json_body(response).await;
        assert_eq!(album["albumID"], album_id);
        assert_eq!(album["image_url"], created["imagePath"]);
        assert_eq!(album["metadata"]["artist"], "Boards");
        assert_eq!(album["metadata"]["title"], "Music Has...");
        assert_eq!(album["metadata"]["year"], "1998");
    }

    #[tokio::test]
    async fn remote_storage_reports_image_size() {
        let temp = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().join("albums.db").display());
        let db = Database::connect(&db_url, MetadataLayout::Discrete)
            .await
            .unwrap();
        let albums = AlbumService::new(Arc::new(db), Arc::new(UrlBlobStore));
        let mut router = build_router(Arc::new(AppState { albums }), 1024 * 1024);

        let response = router.call(upload_request(&cover_parts())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = json_body(response).await;
        assert_eq!(
            created["imageSize"],
            b"\xff\xd8\xff\xe0not-really-a-jpeg".len() as u64
        );
        assert!(created.get("imagePath").is_none());

        let album_id = created["albumID"].as_i64().unwrap();
        let response = router
            .call(get_request(&format!("/albums/{album_id}")))
            .await
            .unwrap();
        let album = json_body(response).await;
        let image_url = album["image_url"].as_str().unwrap();
        assert!(image_url.starts_with("https://covers.example/"));
        assert!(image_url.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn missing_text_fields_are_stored_empty() {
        let mut app = setup_test_app(1024 * 1024).await;
        let parts = [Part::File {
            name: "image",
            filename: "back.png",
            content_type: "image/png",
            bytes: b"\x89PNG",
        }];

        let response = app.router.call(upload_request(&parts)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let album_id = json_body(response).await["albumID"].as_i64().unwrap();

        let response = app
            .router
            .call(get_request(&format!("/albums/{album_id}")))
            .await
            .unwrap();
        let album = json_body(response).await;
        assert_eq!(album["metadata"]["artist"], "");
        assert_eq!(album["metadata"]["title"], "");
        assert_eq!(album["metadata"]["year"], "");
    }

    #[tokio::test]
    async fn unknown_album_is_not_found() {
        let mut app = setup_test_app(1024 * 1024).await;
        let response = app
            .router
            .call(get_request("/albums/999999"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Album not found");
    }

    #[tokio::test]
    async fn malformed_album_id_is_bad_request() {
        let mut app = setup_test_app(1024 * 1024).await;
        for uri in ["/albums/abc", "/albums/-4", "/albums/1.5"] {
            let response = app.router.call(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = json_body(response).await;
            assert!(body["error"].as_str().unwrap().contains("invalid album id"));
        }
    }

    #[tokio::test]
    async fn upload_without_image_is_rejected() {
        let mut app = setup_test_app(1024 * 1024).await;
        let before = app.db.count_albums().await.unwrap();

        let parts = [
            Part::Text("artist", "Boards"),
            Part::Text("title", "Music Has..."),
            Part::Text("year", "1998"),
        ];
        let response = app.router.call(upload_request(&parts)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], INVALID_IMAGE);
        assert_eq!(app.db.count_albums().await.unwrap(), before);
    }

    #[tokio::test]
    async fn image_part_without_filename_is_rejected() {
        let mut app = setup_test_app(1024 * 1024).await;
        let parts = [Part::Text("image", "just text"), Part::Text("artist", "x")];

        let response = app.router.call(upload_request(&parts)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.db.count_albums().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_multipart_body_is_rejected() {
        let mut app = setup_test_app(1024 * 1024).await;
        let request = Request::builder()
            .method("POST")
            .uri("/albums")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"artist":"Boards"}"#))
            .unwrap();

        let response = app.router.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], INVALID_IMAGE);
    }

    #[tokio::test]
    async fn oversized_upload_is_a_client_error() {
        let mut app = setup_test_app(1024).await;
        let image = vec![0u8; 8 * 1024];
        let parts = [
            Part::Text("artist", "Boards"),
            Part::File {
                name: "image",
                filename: "huge.jpg",
                content_type: "image/jpeg",
                bytes: &image,
            },
        ];

        let response = app.router.call(upload_request(&parts)).await.unwrap();
        assert!(response.status().is_client_error(), "{}", response.status());
        assert_eq!(app.db.count_albums().await.unwrap(), 0);
        assert!(!app.temp.path().join("images").join("huge.jpg").exists());
    }

    #[test]
    fn service_errors_map_to_status_codes() {
        let cases = [
            (
                ServiceError::InvalidImage("missing image part"),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::from("x".parse::<album_core::AlbumId>().unwrap_err()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::NotFound("5".parse().unwrap()),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Lookup("5".parse().unwrap(), anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn openapi_lists_album_routes() {
        let doc = docs::ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/albums"));
        assert!(doc.paths.paths.contains_key("/albums/{albumID}"));
    }
}
