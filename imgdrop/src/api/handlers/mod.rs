//! HTTP request handlers.
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching HTTP status and a
//! plain-text message.

pub mod uploads;
