use crate::{
    config::AuthConfig,
    errors::{Error, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Identity asserted by the identity service for a valid token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifiedIdentity {
    pub uid: String,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Exchange an opaque bearer token for an identity. Any failure is a [`Error::Forbidden`].
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

/// Verifies tokens by POSTing `{"token": ...}` to a configured URL and reading `{"uid": ...}` back
pub struct HttpTokenVerifier {
    client: reqwest::Client,
    verify_url: Url,
}

impl HttpTokenVerifier {
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            verify_url: config.verify_url.clone(),
        })
    }
}

fn invalid_token() -> Error {
    Error::Forbidden {
        message: "Invalid ID token.".to_string(),
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        let response = self
            .client
            .post(self.verify_url.clone())
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Token verification request failed");
                invalid_token()
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, "Identity service rejected token");
            return Err(invalid_token());
        }

        let identity: VerifiedIdentity = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Identity service returned an unreadable body");
            invalid_token()
        })?;

        if identity.uid.trim().is_empty() {
            tracing::warn!("Identity service returned an empty uid");
            return Err(invalid_token());
        }

        tracing::trace!(uid = %identity.uid, "Token verified");
        Ok(identity)
    }
}
