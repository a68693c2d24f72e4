//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `IMGDROP_CONFIG`
//! environment variable. Everything is fixed at startup; there is no runtime reconfiguration.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, may be absent)
//! 2. **Environment variables** - Variables prefixed with `IMGDROP_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `IMGDROP_STORAGE__TYPE=object_store` sets the `storage.type` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `public_base_url`
//! - **Storage**: `storage.type` (`local` or `object_store`) plus backend settings
//! - **Destinations**: `destinations.profile_base`, `destinations.document_base`, `destinations.document_marker`
//! - **Uploads**: `uploads.require_image_mime`, `limits.max_file_size`, `staging_dir`
//! - **Auth**: `auth.verify_url`, `auth.timeout` - enables the verified upload endpoint
//! - **CORS**: `cors.allowed_origins`, `cors.max_age`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! IMGDROP_PORT=8080
//! IMGDROP_STORAGE__TYPE=object_store
//! IMGDROP_STORAGE__BUCKET=profile-uploads
//! IMGDROP_AUTH__VERIFY_URL=https://identity.internal/verify
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Presigned URLs cannot outlive this with SigV4.
pub const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGDROP_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Externally visible base URL, used to build links to locally stored files
    pub public_base_url: String,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Directory for in-flight uploads. Defaults to `<root>/.staging` for local storage (so the
    /// final move is a rename) and the OS temp dir for the object store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
    pub storage: StorageConfig,
    pub destinations: DestinationsConfig,
    pub uploads: UploadsConfig,
    pub limits: LimitsConfig,
    /// Identity service settings. The verified upload endpoint is only mounted when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: "http://localhost:3000".to_string(),
            enable_otel_export: false,
            staging_dir: None,
            storage: StorageConfig::default(),
            destinations: DestinationsConfig::default(),
            uploads: UploadsConfig::default(),
            limits: LimitsConfig::default(),
            auth: None,
            cors: CorsConfig::default(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Files on local disk, served back by this application under `/uploads`
    Local(LocalStorageConfig),
    /// S3-compatible object store with presigned download URLs
    ObjectStore(ObjectStoreConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local(LocalStorageConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    /// Root directory; category bases are created beneath it
    pub root: PathBuf,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    /// Region override; falls back to the standard AWS environment
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, GCS interop, ...)
    #[serde(default)]
    pub endpoint: Option<Url>,
    #[serde(default)]
    pub force_path_style: bool,
    /// Static credentials; when absent the standard AWS credential chain is used
    #[serde(default, skip_serializing)]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Lifetime of returned download URLs (max 7 days)
    #[serde(default = "ObjectStoreConfig::default_signed_url_ttl", with = "humantime_serde")]
    pub signed_url_ttl: Duration,
}

impl ObjectStoreConfig {
    fn default_signed_url_ttl() -> Duration {
        MAX_SIGNED_URL_TTL
    }
}

/// Category bases and the legacy identifier marker
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationsConfig {
    pub profile_base: String,
    pub document_base: String,
    /// Identifiers containing this substring are routed to the document base when no explicit
    /// category is sent
    pub document_marker: String,
}

impl Default for DestinationsConfig {
    fn default() -> Self {
        Self {
            profile_base: "profile-images".to_string(),
            document_base: "application-docs".to_string(),
            document_marker: "-doc-".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Reject non-`image/*` uploads on the direct endpoint. The verified endpoint always checks.
    pub require_image_mime: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum accepted file size in bytes
    pub max_file_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Endpoint that exchanges a bearer token for the caller's uid
    pub verify_url: Url,
    /// Timeout for a verification call
    #[serde(default = "AuthConfig::default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl AuthConfig {
    fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Preflight cache lifetime in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                CorsOrigin::Origin("http://127.0.0.1:5500".to_string()),
                CorsOrigin::Origin("http://localhost:5500".to_string()),
            ],
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific origin.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    /// Specific origin (e.g., `https://app.example.com`), stored in serialized form without a
    /// trailing slash so it compares equal to an `Origin` header
    #[serde(deserialize_with = "parse_origin")]
    Origin(String),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_origin<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let url = Url::parse(&s).map_err(serde::de::Error::custom)?;
    Ok(url.origin().ascii_serialization())
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| Error::Internal {
            operation: format!("Config validation: {message}"),
        };

        Url::parse(&self.public_base_url).map_err(|e| invalid(format!("public_base_url '{}' is not a URL: {e}", self.public_base_url)))?;

        let destinations = &self.destinations;
        for (name, base) in [
            ("profile_base", &destinations.profile_base),
            ("document_base", &destinations.document_base),
        ] {
            if base.is_empty() || base.contains('/') || base.contains('\\') || base.starts_with('.') {
                return Err(invalid(format!(
                    "destinations.{name} '{base}' must be a single, non-hidden path segment"
                )));
            }
        }
        if destinations.profile_base == destinations.document_base {
            return Err(invalid("destinations.profile_base and destinations.document_base must differ".to_string()));
        }
        if destinations.document_marker.is_empty() {
            return Err(invalid("destinations.document_marker cannot be empty".to_string()));
        }

        if self.limits.max_file_size == 0 {
            return Err(invalid("limits.max_file_size must be greater than 0".to_string()));
        }

        if let StorageConfig::ObjectStore(object_store) = &self.storage {
            if object_store.bucket.is_empty() {
                return Err(invalid("storage.bucket cannot be empty".to_string()));
            }
            if object_store.signed_url_ttl < Duration::from_secs(1) || object_store.signed_url_ttl > MAX_SIGNED_URL_TTL {
                return Err(invalid(format!(
                    "storage.signed_url_ttl must be between 1s and 7 days, got {:?}",
                    object_store.signed_url_ttl
                )));
            }
            if object_store.access_key_id.is_some() != object_store.secret_access_key.is_some() {
                return Err(invalid(
                    "storage.access_key_id and storage.secret_access_key must be set together".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("IMGDROP_").split("__").ignore(&["CONFIG"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Where in-flight uploads are staged
    pub fn staging_dir(&self) -> PathBuf {
        match (&self.staging_dir, &self.storage) {
            (Some(dir), _) => dir.clone(),
            (None, StorageConfig::Local(local)) => local.root.join(".staging"),
            (None, StorageConfig::ObjectStore(_)) => std::env::temp_dir().join("imgdrop"),
        }
    }
}
