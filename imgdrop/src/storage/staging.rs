//! Temporary staging files for in-flight uploads.
//!
//! The request body is streamed into a [`StagedFile`] before the destination is resolved (form
//! fields may arrive after the file part). The file is removed when the handle is dropped, which
//! covers both the success path (after the backend has taken a copy or renamed it away) and every
//! early error return.

use super::errors::Result;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file: Option<fs::File>,
    bytes: u64,
}

impl StagedFile {
    /// Create an empty staging file inside `dir`, creating the directory if needed
    pub async fn create(dir: &Path, caller: &str) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "upload_{}_{}.part",
            crate::destination::sanitize_segment(caller),
            Uuid::new_v4().simple()
        ));
        let file = fs::OpenOptions::new().write(true).create_new(true).open(&path).await?;
        tracing::trace!(path = %path.display(), "Created staging file");

        Ok(Self {
            path,
            file: Some(file),
            bytes: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.bytes += chunk.len() as u64;
        }
        Ok(())
    }

    /// Flush and close the file so it can be handed to a backend
    pub async fn finish(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // Close before unlinking. A single blocking unlink; Drop cannot await.
        self.file.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "Removed staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging file"),
        }
    }
}
