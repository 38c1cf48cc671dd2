use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    error::DisplayErrorContext, primitives::ByteStream, types::ObjectCannedAcl, Client,
};
use bytes::Bytes;
use tracing::debug;

use super::{BlobReference, BlobStore, NamingStrategy, StorageError, StoredBlob};

/// Connection settings for the object-store backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    /// S3-compatible endpoint (MinIO, RustFS, ...). Enables path-style addressing.
    pub endpoint_url: Option<String>,
    /// Base URL objects are publicly served from.
    pub public_base_url: Option<String>,
}

impl S3Settings {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Base URL public object links are built from, without trailing slash.
    pub fn resolved_public_base_url(&self) -> String {
        match (&self.public_base_url, &self.endpoint_url) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(endpoint)) => {
                format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket)
            }
            (None, None) => format!("https://{}.s3.amazonaws.com", self.bucket),
        }
    }
}

/// Uploads images to an S3 bucket as publicly readable objects.
#[derive(Clone, Debug)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    /// Builds a client from the ambient AWS configuration (env, profile,
    /// instance metadata) with the optional endpoint override applied.
    pub async fn connect(settings: S3Settings) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::with_client(Client::from_conf(builder.build()), settings)
    }

    pub fn with_client(client: Client, settings: S3Settings) -> Self {
        let public_base_url = settings.resolved_public_base_url();
        Self {
            client,
            bucket: settings.bucket,
            public_base_url,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn naming(&self) -> NamingStrategy {
        NamingStrategy::Unique
    }

    async fn store(
        &self,
        name: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<StoredBlob, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }

        let size = bytes.len() as u64;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|err| StorageError::Upload {
                bucket: self.bucket.clone(),
                key: name.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        debug!(bucket = %self.bucket, key = name, size, "image uploaded");
        Ok(StoredBlob {
            reference: BlobReference::Url(self.object_url(name)),
            size,
        })
    }
}
