//! Caller verification for the verified upload endpoint.
//!
//! Verification is delegated to an external identity service: the client sends
//! `Authorization: Bearer <token>`, and the service exchanges the token for the caller's uid.
//!
//! # Modules
//!
//! - [`verifier`]: The [`TokenVerifier`] trait and its HTTP implementation
//! - [`verified_caller`]: Axum extractor that runs verification before the handler reads the body

pub mod verified_caller;
pub mod verifier;

pub use verified_caller::VerifiedCaller;
pub use verifier::{HttpTokenVerifier, TokenVerifier, VerifiedIdentity};
