//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - `POST /api/upload-profile-image`: direct upload, caller named by the `userId` form field
//! - `POST /uploadProfilePicture`: verified upload, caller identified by a bearer token
//! - `GET /uploads/<base>/<file>`: stored files (local storage only)
//! - `GET /healthz`, `GET /openapi.json`
//!
//! # OpenAPI Documentation
//!
//! Upload endpoints are annotated with `utoipa`; the document is served at `/openapi.json`.

pub mod handlers;
pub mod models;
