use crate::destination::Category;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Reference to a stored upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    /// Publicly resolvable URL of the stored object
    pub url: String,
    pub category: Category,
}

impl UploadResponse {
    pub fn stored(url: String, category: Category) -> Self {
        Self {
            message: "File uploaded successfully.".to_string(),
            url,
            category,
        }
    }
}

/// Multipart body of the direct upload endpoint (documentation only)
#[derive(ToSchema)]
#[allow(unused, non_snake_case)]
pub struct DirectUploadForm {
    /// Image file
    #[schema(value_type = String, format = Binary)]
    pub profileImage: Vec<u8>,
    /// Caller identifier; defaults to `unknown`
    pub userId: Option<String>,
    /// `profile` or `document`. When absent, identifiers containing the document marker are
    /// treated as documents.
    pub category: Option<Category>,
}

/// Multipart body of the verified upload endpoint (documentation only)
#[derive(ToSchema)]
#[allow(unused)]
pub struct VerifiedUploadForm {
    /// Image file, must be sent with an `image/*` content type
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    /// `profile` (default) or `document`
    pub category: Option<Category>,
}
