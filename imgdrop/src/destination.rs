//! Destination resolution and filename generation for uploads.
//!
//! Every upload lands in one of two logical categories, each backed by its own base path
//! (a directory under the local storage root, or a key prefix in the object store):
//!
//! - [`Category::Profile`]: profile pictures, base `profile-images` by default
//! - [`Category::Document`]: application documents, base `application-docs` by default
//!
//! The category comes from an explicit `category` form field when the client sends one. Older
//! clients do not, and instead embed a marker (`-doc-` by default) in the caller identifier;
//! [`DestinationResolver::categorize`] keeps that convention as the fallback.

use crate::config::DestinationsConfig;
use crate::errors::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Placeholder used when the client does not identify itself.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Logical namespace an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Profile,
    Document,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Profile => write!(f, "profile"),
            Category::Document => write!(f, "document"),
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "profile" => Ok(Category::Profile),
            "document" => Ok(Category::Document),
            other => Err(Error::BadRequest {
                message: format!("Unsupported category '{other}'. Expected 'profile' or 'document'."),
            }),
        }
    }
}

/// Where an accepted upload is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDestination {
    pub category: Category,
    /// Base path for the category, relative to the storage root
    pub storage_path: String,
    /// Sanitised caller identifier, used as a key segment by the object store
    pub owner: String,
    pub generated_filename: String,
}

impl ResolvedDestination {
    /// Object key used by prefix-based stores: `<base>/<owner>/<filename>`
    pub fn object_key(&self) -> String {
        format!("{}/{}/{}", self.storage_path, self.owner, self.generated_filename)
    }
}

#[derive(Debug, Clone)]
pub struct DestinationResolver {
    profile_base: String,
    document_base: String,
    document_marker: String,
}

impl DestinationResolver {
    pub fn new(config: &DestinationsConfig) -> Self {
        Self {
            profile_base: config.profile_base.clone(),
            document_base: config.document_base.clone(),
            document_marker: config.document_marker.clone(),
        }
    }

    /// Explicit category wins; otherwise an identifier containing the document marker is a document.
    pub fn categorize(&self, caller: &str, explicit: Option<Category>) -> Category {
        if let Some(category) = explicit {
            return category;
        }
        if caller.contains(&self.document_marker) {
            Category::Document
        } else {
            Category::Profile
        }
    }

    pub fn base_for(&self, category: Category) -> &str {
        match category {
            Category::Profile => &self.profile_base,
            Category::Document => &self.document_base,
        }
    }

    pub fn resolve(&self, caller: &str, explicit: Option<Category>, extension: &str) -> ResolvedDestination {
        let category = self.categorize(caller, explicit);
        ResolvedDestination {
            category,
            storage_path: self.base_for(category).to_string(),
            owner: sanitize_segment(caller),
            generated_filename: generate_filename(caller, extension),
        }
    }
}

/// `<caller>-<unix millis>-<uuid>` followed by `extension` (which includes its leading dot).
pub fn generate_filename(caller: &str, extension: &str) -> String {
    format!(
        "{}-{}-{}{}",
        sanitize_segment(caller),
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    )
}

/// Pick an extension for a stored file: the original filename's, else one matching the declared
/// content type, else none.
pub fn extension_for(original_filename: Option<&str>, content_type: Option<&str>) -> String {
    let from_name = original_filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    let ext = from_name.or_else(|| content_type.and_then(extension_for_mime));

    ext.map(|ext| format!(".{ext}")).unwrap_or_default()
}

/// Canonical extension for a declared MIME type. `application/octet-stream` declares nothing.
fn extension_for_mime(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    if essence.is_empty() || essence == "application/octet-stream" {
        return None;
    }
    // mime_guess lists candidates alphabetically, which puts `jfif` first
    if essence == "image/jpeg" {
        return Some("jpg".to_string());
    }

    let candidates = mime_guess::get_mime_extensions_str(&essence)?;
    candidates
        .iter()
        .find(|ext| mime_guess::from_ext(ext).first().is_some_and(|mime| mime.essence_str() == essence))
        .or_else(|| candidates.first())
        .map(|ext| ext.to_string())
}

/// Reduce an arbitrary client string to a single safe path segment.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        UNKNOWN_CALLER.to_string()
    } else {
        cleaned.to_string()
    }
}
