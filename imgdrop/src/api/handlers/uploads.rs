//! Multipart upload endpoints.
//!
//! Both endpoints run the same pipeline:
//!
//! 1. **Receiving**: walk the multipart fields, streaming the file part into a staging file
//! 2. **Validating**: content type (where required), size limit, non-empty file
//! 3. **Persisting**: resolve the destination and hand the staged file to the storage backend
//! 4. **Responding**: build the public URL; the staging file is removed when it goes out of scope
//!
//! They differ in how the form is read and who the caller is, captured by [`UploadSurface`].

use crate::api::models::uploads::UploadResponse;
use crate::auth::VerifiedCaller;
use crate::config::Config;
use crate::destination::{Category, DestinationResolver, UNKNOWN_CALLER, extension_for};
use crate::errors::{Error, Result};
use crate::storage::{ObjectMetadata, staging::StagedFile};
use crate::AppState;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use tracing::{debug, info, instrument, warn};

/// Content type assumed for file parts that do not declare one
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// How an upload endpoint reads its multipart form
#[derive(Debug, Clone, Copy)]
pub struct UploadSurface {
    /// Name of the form field carrying the file
    pub file_field: &'static str,
    pub missing_file_message: &'static str,
    /// Reject parts whose declared content type is not `image/*`
    pub require_image_mime: bool,
    /// Extension forced onto stored names; `None` keeps the original one
    pub fixed_extension: Option<&'static str>,
}

impl UploadSurface {
    pub const VERIFIED: Self = Self {
        file_field: "image",
        missing_file_message: "No image file provided.",
        require_image_mime: true,
        fixed_extension: Some(".jpg"),
    };

    pub fn direct(config: &Config) -> Self {
        Self {
            file_field: "profileImage",
            missing_file_message: "No file was uploaded.",
            require_image_mime: config.uploads.require_image_mime,
            fixed_extension: None,
        }
    }
}

/// Everything collected from a multipart form, with the file already staged on disk
#[derive(Debug)]
struct ReceivedUpload {
    staged: StagedFile,
    original_filename: Option<String>,
    /// Content type as declared by the client, if any
    content_type: Option<String>,
    user_id: Option<String>,
    category: Option<Category>,
}

fn multipart_error(context: &str, e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: "Request body exceeds the maximum allowed size".to_string(),
        }
    } else {
        Error::BadRequest {
            message: format!("{context}: {}", e.body_text()),
        }
    }
}

fn too_large(max_file_size: u64) -> Error {
    Error::PayloadTooLarge {
        message: format!(
            "File size exceeds maximum allowed size of {} bytes ({} MB)",
            max_file_size,
            max_file_size / (1024 * 1024)
        ),
    }
}

/// Receiving + Validating: stream the form, staging the file part as it arrives.
///
/// Returning early drops the remaining body unread, and drops any staging file created so far.
async fn receive_upload(multipart: &mut Multipart, surface: UploadSurface, config: &Config, caller_hint: &str) -> Result<ReceivedUpload> {
    let max_file_size = config.limits.max_file_size;
    let staging_dir = config.staging_dir();

    let mut file: Option<(StagedFile, Option<String>, Option<String>)> = None;
    let mut user_id: Option<String> = None;
    let mut category: Option<Category> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to parse multipart data", e))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            name if name == surface.file_field => {
                if file.is_some() {
                    return Err(Error::BadRequest {
                        message: format!("Only one '{}' file may be uploaded per request.", surface.file_field),
                    });
                }

                let content_type = field.content_type().map(|s| s.to_string());
                if surface.require_image_mime && !content_type.as_deref().is_some_and(|ct| ct.starts_with("image/")) {
                    debug!(content_type = ?content_type, "Rejecting non-image upload");
                    return Err(Error::BadRequest {
                        message: "Invalid file type. Only images are allowed.".to_string(),
                    });
                }

                let filename = field.file_name().map(|s| s.to_string());
                let mut staged = StagedFile::create(&staging_dir, user_id.as_deref().unwrap_or(caller_hint)).await?;

                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| multipart_error("Failed to read file chunk", e))?
                {
                    if staged.bytes() + chunk.len() as u64 > max_file_size {
                        warn!(
                            received = staged.bytes() + chunk.len() as u64,
                            max_file_size = max_file_size,
                            "File size limit exceeded, aborting upload"
                        );
                        return Err(too_large(max_file_size));
                    }
                    staged.write_chunk(&chunk).await?;
                }
                staged.finish().await?;

                debug!(filename = ?filename, bytes = staged.bytes(), "Staged file part");
                file = Some((staged, filename, content_type));
            }
            "userId" => {
                user_id = Some(field.text().await.map_err(|e| multipart_error("Failed to read userId", e))?);
            }
            "category" => {
                let value = field.text().await.map_err(|e| multipart_error("Failed to read category", e))?;
                category = Some(value.parse()?);
            }
            _ => {
                // Ignore unknown fields (forward compatibility)
            }
        }
    }

    let (staged, original_filename, content_type) = file.ok_or_else(|| Error::BadRequest {
        message: surface.missing_file_message.to_string(),
    })?;

    if staged.bytes() == 0 {
        return Err(Error::BadRequest {
            message: "File cannot be empty".to_string(),
        });
    }

    Ok(ReceivedUpload {
        staged,
        original_filename,
        content_type,
        user_id,
        category,
    })
}

/// Persisting + Responding
async fn store_upload(state: &AppState, received: ReceivedUpload, caller: &str, surface: UploadSurface) -> Result<Json<UploadResponse>> {
    let extension = match surface.fixed_extension {
        Some(ext) => ext.to_string(),
        None => extension_for(received.original_filename.as_deref(), received.content_type.as_deref()),
    };

    let destination = DestinationResolver::new(&state.config.destinations).resolve(caller, received.category, &extension);

    state.storage.prepare(&destination).await?;
    let metadata = ObjectMetadata {
        content_type: received.content_type.clone().unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        uploaded_by: caller.to_string(),
    };
    state.storage.persist(received.staged.path(), &destination, &metadata).await?;
    let url = state.storage.public_url(&destination).await?;

    let bytes = received.staged.bytes();
    drop(received.staged);

    info!(
        caller = %caller,
        category = %destination.category,
        filename = %destination.generated_filename,
        bytes = bytes,
        "File uploaded successfully"
    );

    Ok(Json(UploadResponse::stored(url, destination.category)))
}

#[utoipa::path(
    post,
    path = "/api/upload-profile-image",
    tag = "uploads",
    summary = "Upload image",
    description = "Upload a file for the caller named in `userId`. Identifiers containing the document marker are \
                   stored as documents unless `category` says otherwise.",
    request_body(content = crate::api::models::uploads::DirectUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing or invalid file"),
        (status = 405, description = "Method not allowed"),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "Storage failure")
    )
)]
#[instrument(skip_all)]
pub async fn upload_profile_image(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>> {
    let surface = UploadSurface::direct(&state.config);
    let received = receive_upload(&mut multipart, surface, &state.config, UNKNOWN_CALLER).await?;

    let caller = received
        .user_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string());

    store_upload(&state, received, &caller, surface).await
}

#[utoipa::path(
    post,
    path = "/uploadProfilePicture",
    tag = "uploads",
    summary = "Upload profile picture",
    description = "Upload an image for the caller identified by the bearer token. The token is checked before the \
                   body is read.",
    request_body(content = crate::api::models::uploads::VerifiedUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Missing image or non-image content type"),
        (status = 403, description = "Missing or invalid bearer token"),
        (status = 405, description = "Method not allowed"),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "Storage failure")
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(uid = %caller.uid))]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    caller: VerifiedCaller,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let received = receive_upload(&mut multipart, UploadSurface::VERIFIED, &state.config, &caller.uid).await?;
    store_upload(&state, received, &caller.uid, UploadSurface::VERIFIED).await
}

/// Fallback for upload routes hit with an unsupported method
pub async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

#[cfg(test)]
mod tests {
    use crate::api::models::uploads::UploadResponse;
    use crate::destination::Category;
    use crate::test_utils::{create_test_app, create_test_config, files_in, mock_identity_service};
    use axum::http::{Method, StatusCode};
    use axum_test::{
        TestServer,
        multipart::{MultipartForm, Part},
    };
    use std::path::Path;
    use url::Url;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n-not-really-a-png-but-bytes";

    fn image_part(bytes: &[u8], filename: &str, mime: &str) -> Part {
        Part::bytes(bytes.to_vec()).file_name(filename).mime_type(mime)
    }

    /// Fetch a returned URL back through the same server
    async fn fetch(server: &TestServer, url: &str) -> Vec<u8> {
        let path = Url::parse(url).unwrap().path().to_string();
        let response = server.get(&path).await;
        response.assert_status_ok();
        response.as_bytes().to_vec()
    }

    fn stored_under(root: &Path, base: &str) -> Vec<String> {
        files_in(&root.join(base))
    }

    #[tokio::test]
    async fn test_direct_upload_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(
                MultipartForm::new()
                    .add_text("userId", "alice")
                    .add_part("profileImage", image_part(PNG, "me.PNG", "image/png")),
            )
            .await;

        response.assert_status_ok();
        let body: UploadResponse = response.json();
        assert_eq!(body.message, "File uploaded successfully.");
        assert_eq!(body.category, Category::Profile);
        assert!(body.url.starts_with("http://localhost:3000/uploads/profile-images/alice-"));
        assert!(body.url.ends_with(".png"));

        assert_eq!(fetch(&server, &body.url).await, PNG);
        assert_eq!(stored_under(root.path(), "profile-images").len(), 1);
        assert!(files_in(&root.path().join(".staging")).is_empty());
    }

    #[tokio::test]
    async fn test_document_marker_routes_to_documents() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(
                MultipartForm::new()
                    .add_text("userId", "bob-doc-cv")
                    .add_part("profileImage", image_part(b"%PDF-1.7", "cv.pdf", "application/pdf")),
            )
            .await;

        response.assert_status_ok();
        let body: UploadResponse = response.json();
        assert_eq!(body.category, Category::Document);
        assert!(body.url.contains("/uploads/application-docs/bob-doc-cv-"));
        assert_eq!(fetch(&server, &body.url).await, b"%PDF-1.7");
        assert!(stored_under(root.path(), "profile-images").is_empty());
    }

    #[tokio::test]
    async fn test_file_before_user_id_still_resolves_destination() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(
                MultipartForm::new()
                    .add_part("profileImage", image_part(b"doc", "a.txt", "text/plain"))
                    .add_text("userId", "carol-doc-1"),
            )
            .await;

        response.assert_status_ok();
        let body: UploadResponse = response.json();
        assert_eq!(body.category, Category::Document);
        assert!(body.url.contains("/carol-doc-1-"));
    }

    #[tokio::test]
    async fn test_explicit_category_wins() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(
                MultipartForm::new()
                    .add_text("userId", "dave")
                    .add_text("category", "document")
                    .add_part("profileImage", image_part(PNG, "scan.png", "image/png")),
            )
            .await;

        response.assert_status_ok();
        let body: UploadResponse = response.json();
        assert_eq!(body.category, Category::Document);
    }

    #[tokio::test]
    async fn test_unknown_category_rejected() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(
                MultipartForm::new()
                    .add_text("category", "avatar")
                    .add_part("profileImage", image_part(PNG, "a.png", "image/png")),
            )
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(stored_under(root.path(), "profile-images").is_empty());
    }

    #[tokio::test]
    async fn test_missing_user_id_defaults_to_unknown() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(MultipartForm::new().add_part("profileImage", image_part(PNG, "a.png", "image/png")))
            .await;

        response.assert_status_ok();
        let body: UploadResponse = response.json();
        assert!(body.url.contains("/uploads/profile-images/unknown-"));
    }

    #[tokio::test]
    async fn test_extension_follows_declared_type_or_is_omitted() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(MultipartForm::new().add_part("profileImage", Part::bytes(PNG.to_vec()).mime_type("image/jpeg")))
            .await;
        response.assert_status_ok();
        assert!(response.json::<UploadResponse>().url.ends_with(".jpg"));

        let response = server
            .post("/api/upload-profile-image")
            .multipart(MultipartForm::new().add_part("profileImage", Part::bytes(PNG.to_vec())))
            .await;
        response.assert_status_ok();
        let url = response.json::<UploadResponse>().url;
        let stored_name = url.rsplit('/').next().unwrap();
        assert!(!stored_name.contains('.'), "unexpected extension in {stored_name}");
        assert_eq!(fetch(&server, &url).await, PNG);
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(MultipartForm::new().add_text("userId", "alice"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "No file was uploaded.");
        assert!(stored_under(root.path(), "profile-images").is_empty());
    }

    #[tokio::test]
    async fn test_wrong_field_name_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(MultipartForm::new().add_part("image", image_part(PNG, "a.png", "image/png")))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(stored_under(root.path(), "profile-images").is_empty());
    }

    #[tokio::test]
    async fn test_non_image_rejected_when_required() {
        let root = tempfile::tempdir().unwrap();
        let mut config = create_test_config(root.path());
        config.uploads.require_image_mime = true;
        let server = create_test_app(config).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(
                MultipartForm::new()
                    .add_text("userId", "alice")
                    .add_part("profileImage", image_part(b"#!/bin/sh", "run.sh", "text/x-shellscript")),
            )
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "Invalid file type. Only images are allowed.");
        assert!(stored_under(root.path(), "profile-images").is_empty());
        assert!(files_in(&root.path().join(".staging")).is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(MultipartForm::new().add_part("profileImage", image_part(b"", "a.png", "image/png")))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(files_in(&root.path().join(".staging")).is_empty());
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut config = create_test_config(root.path());
        config.limits.max_file_size = 16;
        let server = create_test_app(config).await;

        let response = server
            .post("/api/upload-profile-image")
            .multipart(MultipartForm::new().add_part("profileImage", image_part(&[7u8; 64], "big.png", "image/png")))
            .await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert!(stored_under(root.path(), "profile-images").is_empty());
        assert!(files_in(&root.path().join(".staging")).is_empty());
    }

    #[tokio::test]
    async fn test_repeat_uploads_get_distinct_urls() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let mut urls = Vec::new();
        for content in [b"first".as_slice(), b"second".as_slice()] {
            let response = server
                .post("/api/upload-profile-image")
                .multipart(
                    MultipartForm::new()
                        .add_text("userId", "erin")
                        .add_part("profileImage", image_part(content, "p.jpg", "image/jpeg")),
                )
                .await;
            response.assert_status_ok();
            urls.push(response.json::<UploadResponse>().url);
        }

        assert_ne!(urls[0], urls[1]);
        assert_eq!(fetch(&server, &urls[0]).await, b"first");
        assert_eq!(fetch(&server, &urls[1]).await, b"second");
        assert_eq!(stored_under(root.path(), "profile-images").len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server.get("/api/upload-profile-image").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.text(), "Method Not Allowed");

        let response = server.put("/api/upload-profile-image").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_preflight_returns_no_content() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .method(Method::OPTIONS, "/api/upload-profile-image")
            .add_header("origin", "http://localhost:5500")
            .add_header("access-control-request-method", "POST")
            .add_header("access-control-request-headers", "authorization,content-type")
            .await;

        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(response.header("access-control-allow-origin"), "http://localhost:5500");
        assert_eq!(response.header("access-control-max-age"), "3600");
        let methods = response.header("access-control-allow-methods");
        assert!(methods.to_str().unwrap().contains("POST"));
    }

    #[tokio::test]
    async fn test_verified_upload_requires_token() {
        let root = tempfile::tempdir().unwrap();
        let identity = mock_identity_service("good-token", "uid-1").await;
        let server = create_test_app(create_test_config(root.path()).with_identity_service(&identity)).await;

        let response = server
            .post("/uploadProfilePicture")
            .multipart(MultipartForm::new().add_part("image", image_part(PNG, "a.png", "image/png")))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.text(), "Unauthorized: No ID token provided.");
        assert!(stored_under(root.path(), "profile-images").is_empty());
        assert!(identity.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verified_upload_rejects_invalid_token() {
        let root = tempfile::tempdir().unwrap();
        let identity = mock_identity_service("good-token", "uid-1").await;
        let server = create_test_app(create_test_config(root.path()).with_identity_service(&identity)).await;

        let response = server
            .post("/uploadProfilePicture")
            .add_header("authorization", "Bearer forged-token")
            .multipart(MultipartForm::new().add_part("image", image_part(PNG, "a.png", "image/png")))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.text(), "Unauthorized: Invalid ID token.");
        assert!(stored_under(root.path(), "profile-images").is_empty());
        assert!(files_in(&root.path().join(".staging")).is_empty());
    }

    #[tokio::test]
    async fn test_verified_upload_stores_jpg_for_uid() {
        let root = tempfile::tempdir().unwrap();
        let identity = mock_identity_service("good-token", "uid-42").await;
        let server = create_test_app(create_test_config(root.path()).with_identity_service(&identity)).await;

        let response = server
            .post("/uploadProfilePicture")
            .add_header("authorization", "Bearer good-token")
            .multipart(
                MultipartForm::new()
                    // userId is not trusted on this endpoint
                    .add_text("userId", "someone-doc-else")
                    .add_part("image", image_part(PNG, "photo.png", "image/png")),
            )
            .await;

        response.assert_status_ok();
        let body: UploadResponse = response.json();
        assert_eq!(body.category, Category::Profile);
        assert!(body.url.contains("/uploads/profile-images/uid-42-"));
        assert!(body.url.ends_with(".jpg"));
        assert_eq!(fetch(&server, &body.url).await, PNG);
    }

    #[tokio::test]
    async fn test_verified_upload_rejects_non_image() {
        let root = tempfile::tempdir().unwrap();
        let identity = mock_identity_service("good-token", "uid-1").await;
        let server = create_test_app(create_test_config(root.path()).with_identity_service(&identity)).await;

        let response = server
            .post("/uploadProfilePicture")
            .add_header("authorization", "Bearer good-token")
            .multipart(MultipartForm::new().add_part("image", image_part(b"{}", "a.json", "application/json")))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "Invalid file type. Only images are allowed.");
        assert!(stored_under(root.path(), "profile-images").is_empty());
    }

    #[tokio::test]
    async fn test_verified_upload_missing_image() {
        let root = tempfile::tempdir().unwrap();
        let identity = mock_identity_service("good-token", "uid-1").await;
        let server = create_test_app(create_test_config(root.path()).with_identity_service(&identity)).await;

        let response = server
            .post("/uploadProfilePicture")
            .add_header("authorization", "Bearer good-token")
            .multipart(MultipartForm::new().add_part("profileImage", image_part(PNG, "a.png", "image/png")))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "No image file provided.");
    }

    #[tokio::test]
    async fn test_verified_route_absent_without_auth_config() {
        let root = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(root.path())).await;

        let response = server
            .post("/uploadProfilePicture")
            .multipart(MultipartForm::new().add_part("image", image_part(PNG, "a.png", "image/png")))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }
}
