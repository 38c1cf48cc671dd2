use std::{
    env,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use album_store::{
    storage::{S3Settings, DEFAULT_IMAGE_DIR},
    MetadataLayout,
};
use anyhow::{bail, Context, Result};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Where uploaded images are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    S3(S3Settings),
    Local { image_dir: PathBuf },
}

impl StorageBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::S3(_) => "s3",
            StorageBackend::Local { .. } => "local",
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub db_url: String,
    pub layout: MetadataLayout,
    pub storage: StorageBackend,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_url = get("DB_DSN")
            .or_else(|| get("DATABASE_URL"))
            .context("DB_DSN or DATABASE_URL must be configured")?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid PORT '{raw}'"))?,
            None => DEFAULT_PORT,
        };
        let host: IpAddr = get("ALBUM_LISTEN_HOST")
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
            .parse()
            .context("invalid ALBUM_LISTEN_HOST")?;

        let layout = match get("ALBUM_METADATA_LAYOUT") {
            Some(raw) => raw.parse().context("invalid ALBUM_METADATA_LAYOUT")?,
            None => MetadataLayout::default(),
        };

        let bucket = get("S3_BUCKET");
        let backend = get("ALBUM_STORAGE")
            .map(|raw| raw.to_ascii_lowercase())
            .unwrap_or_else(|| (if bucket.is_some() { "s3" } else { "local" }).to_string());

        let storage = match backend.as_str() {
            "s3" => {
                let Some(bucket) = bucket else {
                    bail!("S3_BUCKET must be configured for the s3 storage backend");
                };
                StorageBackend::S3(S3Settings {
                    bucket,
                    endpoint_url: get("ALBUM_S3_ENDPOINT_URL"),
                    public_base_url: get("ALBUM_S3_PUBLIC_URL"),
                })
            }
            "local" => StorageBackend::Local {
                image_dir: get("ALBUM_IMAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            },
            other => bail!("unknown ALBUM_STORAGE backend '{other}' (expected s3 or local)"),
        };

        let max_upload_bytes = match get("ALBUM_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("invalid ALBUM_MAX_UPLOAD_BYTES '{raw}'"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            listen_addr: SocketAddr::new(host, port),
            db_url,
            layout,
            storage,
            max_upload_bytes,
        })
    }
}
