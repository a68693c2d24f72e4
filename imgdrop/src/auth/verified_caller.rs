use crate::{
    AppState,
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tracing::{instrument, trace};

/// Caller whose bearer token was accepted by the identity service.
///
/// Extracting this runs before any body extractor, so a rejected caller never reaches storage.
#[derive(Debug, Clone)]
pub struct VerifiedCaller {
    pub uid: String,
}

/// Token from `Authorization: Bearer <token>`, if the header is present and well formed
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for VerifiedCaller {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let verifier = state.verifier.as_ref().ok_or_else(|| Error::Forbidden {
            message: "Token verification is not configured.".to_string(),
        })?;

        let token = bearer_token(&parts.headers).ok_or_else(|| Error::Forbidden {
            message: "No ID token provided.".to_string(),
        })?;

        let identity = verifier.verify(token).await?;
        trace!(uid = %identity.uid, "Authenticated caller");

        Ok(VerifiedCaller { uid: identity.uid })
    }
}
