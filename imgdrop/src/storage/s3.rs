use super::{
    ObjectMetadata, ObjectStore,
    errors::{Result, StorageError},
};
use crate::{config::ObjectStoreConfig, destination::ResolvedDestination};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{Client, error::DisplayErrorContext, presigning::PresigningConfig, primitives::ByteStream};
use std::{path::Path, time::Duration};

/// Long-lived cache policy for stored images; object names are never reused.
const CACHE_CONTROL: &str = "public, max-age=31536000";

/// S3-compatible object store backend
///
/// Objects are keyed `<base>/<owner>/<filename>`. The returned URL is a presigned `GET` that
/// stays valid for `signed_url_ttl`.
pub struct S3Storage {
    client: Client,
    bucket: String,
    signed_url_ttl: Duration,
}

impl S3Storage {
    pub fn new(client: Client, bucket: impl Into<String>, signed_url_ttl: Duration) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            signed_url_ttl,
        }
    }

    /// Build a client from the standard AWS environment, with config overrides applied on top
    pub async fn from_config(config: &ObjectStoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(access_key_id), Some(secret_access_key)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "imgdrop-config",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.as_str());
        }

        Self::new(Client::from_conf(builder.build()), config.bucket.clone(), config.signed_url_ttl)
    }
}

fn remote_error(operation: &'static str, err: impl std::error::Error) -> StorageError {
    StorageError::Remote {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn prepare(&self, _destination: &ResolvedDestination) -> Result<()> {
        // Prefixes are implicit in an object store
        Ok(())
    }

    async fn persist(&self, staged: &Path, destination: &ResolvedDestination, metadata: &ObjectMetadata) -> Result<()> {
        let key = destination.object_key();
        let body = ByteStream::from_path(staged)
            .await
            .map_err(|e| remote_error("read staged file", e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(&metadata.content_type)
            .cache_control(CACHE_CONTROL)
            .metadata("uploaded-by", &metadata.uploaded_by)
            .send()
            .await
            .map_err(|e| remote_error("put_object", e))?;

        tracing::debug!(bucket = %self.bucket, key = %key, "Stored upload in object store");
        Ok(())
    }

    async fn public_url(&self, destination: &ResolvedDestination) -> Result<String> {
        let presigning = PresigningConfig::expires_in(self.signed_url_ttl).map_err(|e| remote_error("presign", e))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(destination.object_key())
            .presigned(presigning)
            .await
            .map_err(|e| remote_error("presign", e))?;

        Ok(request.uri().to_string())
    }
}
