use super::{
    ObjectMetadata, ObjectStore,
    errors::{Result, StorageError},
};
use crate::destination::ResolvedDestination;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage backend - stores files in `<root>/<base>/<filename>`
///
/// Files are published by the application's static file routes, so the public URL is
/// `<public_base_url>/uploads/<base>/<filename>`.
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Like [`LocalStorage::new`], but makes sure the root directory exists first
    pub async fn open(root: PathBuf, public_base_url: &str) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        Ok(Self::new(root, public_base_url))
    }

    fn destination_path(&self, destination: &ResolvedDestination) -> PathBuf {
        self.root.join(&destination.storage_path).join(&destination.generated_filename)
    }
}

fn already_exists(target: &Path) -> StorageError {
    StorageError::AlreadyExists {
        key: target.display().to_string(),
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn prepare(&self, destination: &ResolvedDestination) -> Result<()> {
        fs::create_dir_all(self.root.join(&destination.storage_path)).await?;
        Ok(())
    }

    async fn persist(&self, staged: &Path, destination: &ResolvedDestination, metadata: &ObjectMetadata) -> Result<()> {
        let target = self.destination_path(destination);

        // A hard link never replaces an existing target, so a name clash fails instead of overwriting.
        match fs::hard_link(staged, &target).await {
            Ok(()) => {
                if let Err(e) = fs::remove_file(staged).await {
                    tracing::debug!(error = %e, "Staged file left for drop cleanup");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(already_exists(&target)),
            Err(e) => {
                // Staging on another filesystem: copy next to the target under a hidden name, then link.
                tracing::debug!(error = %e, "Linking from staging failed, falling back to copy");
                let partial = target.with_file_name(format!(".{}.part", destination.generated_filename));
                let linked = match fs::copy(staged, &partial).await {
                    Ok(_) => fs::hard_link(&partial, &target).await,
                    Err(e) => Err(e),
                };
                let _ = fs::remove_file(&partial).await;
                match linked {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(already_exists(&target)),
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tracing::debug!(
            path = %target.display(),
            content_type = %metadata.content_type,
            uploaded_by = %metadata.uploaded_by,
            "Stored upload on local disk"
        );
        Ok(())
    }

    async fn public_url(&self, destination: &ResolvedDestination) -> Result<String> {
        Ok(format!(
            "{}/uploads/{}/{}",
            self.public_base_url, destination.storage_path, destination.generated_filename
        ))
    }

    fn static_root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}
