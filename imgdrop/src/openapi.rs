//! OpenAPI document for the upload endpoints, served at `/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Bearer token scheme used by the verified upload endpoint.
struct BearerSecurityAddon;

impl Modify for BearerSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("ID token")
                        .description(Some(
                            "ID token issued by the identity service:\n\n\
                            ```\nAuthorization: Bearer YOUR_ID_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::uploads::upload_profile_image,
        api::handlers::uploads::upload_profile_picture,
    ),
    components(schemas(
        api::models::uploads::UploadResponse,
        api::models::uploads::DirectUploadForm,
        api::models::uploads::VerifiedUploadForm,
        crate::destination::Category,
    )),
    modifiers(&BearerSecurityAddon),
    tags(
        (name = "uploads", description = "Image and document uploads"),
    ),
    info(
        title = "imgdrop",
        description = "Upload images and documents, get back a public URL.",
    )
)]
pub struct ApiDoc;
