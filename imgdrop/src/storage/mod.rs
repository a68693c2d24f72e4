//! Storage backends for persisted uploads.
//!
//! Uploads are first streamed into a staging file (see [`staging`]) and only handed to a backend
//! once they are complete, so a backend never exposes partially written content.
//!
//! - [`LocalStorage`]: files on local disk under a root directory, served back by the application
//!   itself under `/uploads/<base>/...`
//! - [`S3Storage`]: an S3-compatible object store; URLs are presigned `GET` requests
//!
//! The backend is selected by [`crate::config::StorageConfig`] and built once at startup by
//! [`build_storage`]. Handlers receive it through [`crate::AppState`] as an `Arc<dyn ObjectStore>`.

pub mod errors;
pub mod local;
pub mod s3;
pub mod staging;

pub use local::LocalStorage;
pub use s3::S3Storage;

use crate::config::{Config, StorageConfig};
use crate::destination::ResolvedDestination;
use async_trait::async_trait;
use errors::Result;
use std::{path::Path, sync::Arc};

/// Metadata recorded alongside a stored object
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub uploaded_by: String,
}

/// Trait for upload storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Make sure the destination's base exists. Must be idempotent and safe to call concurrently.
    async fn prepare(&self, destination: &ResolvedDestination) -> Result<()>;

    /// Move a fully staged file to its destination
    async fn persist(&self, staged: &Path, destination: &ResolvedDestination, metadata: &ObjectMetadata) -> Result<()>;

    /// Publicly resolvable URL for a persisted destination
    async fn public_url(&self, destination: &ResolvedDestination) -> Result<String>;

    /// Local directory the application should serve stored files from, if any
    fn static_root(&self) -> Option<&Path> {
        None
    }
}

/// Build the configured storage backend
pub async fn build_storage(config: &Config) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match &config.storage {
        StorageConfig::Local(local) => {
            tracing::info!(root = %local.root.display(), "Using local disk storage");
            Ok(Arc::new(LocalStorage::open(local.root.clone(), &config.public_base_url).await?))
        }
        StorageConfig::ObjectStore(object_store) => {
            tracing::info!(bucket = %object_store.bucket, "Using object store storage");
            Ok(Arc::new(S3Storage::from_config(object_store).await))
        }
    }
}
