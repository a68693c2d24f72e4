//! # imgdrop: image upload service
//!
//! `imgdrop` accepts multipart uploads, stores them on local disk or in an S3-compatible object
//! store, and answers with a public URL for the stored file.
//!
//! ## Request Flow
//!
//! Two upload endpoints share one pipeline:
//!
//! - `POST /api/upload-profile-image` trusts the `userId` form field to name the caller.
//! - `POST /uploadProfilePicture` identifies the caller by exchanging the bearer token with an
//!   external identity service (see [`auth`]). It is only mounted when `auth` is configured.
//!
//! The file part is streamed into a staging file while the form is read. Once the form is
//! complete, [`destination::DestinationResolver`] picks the category base (profile images or
//! application documents) and a collision-free filename, and the configured
//! [`storage::ObjectStore`] moves the staged file into place. The staging file is removed whether
//! or not the upload succeeds.
//!
//! ## Configuration
//!
//! See [`config`]. Everything is loaded once at startup from YAML plus `IMGDROP_` environment
//! variables and shared read-only through [`AppState`].
//!
//! ## Running
//!
//! ```no_run
//! use imgdrop::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     imgdrop::telemetry::init_telemetry(config.enable_otel_export)?;
//!     Application::new(config).await?.serve(std::future::pending()).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod destination;
pub mod errors;
mod openapi;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod test_utils;

use crate::api::handlers::uploads::{method_not_allowed, upload_profile_image, upload_profile_picture};
use crate::auth::{HttpTokenVerifier, TokenVerifier};
use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::storage::ObjectStore;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request},
    http::{self, HeaderValue, Method, StatusCode},
    middleware::{Next, from_fn},
    response::Response,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

/// Multipart framing and text fields on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .storage(storage)
///     .maybe_verifier(verifier)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn ObjectStore>,
    /// Present when `auth` is configured
    pub verifier: Option<Arc<dyn TokenVerifier>>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let allow_origin = if cors_config.allowed_origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Origin(origin) = origin {
                origins.push(origin.parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// `CorsLayer` answers preflights with `200`; clients of this service expect `204`.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

/// Build the application router.
///
/// Upload routes answer any method other than `POST` (and CORS preflights) with `405`. Stored
/// files are served under `/uploads/<base>/` only when the backend keeps them on local disk.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = &state.config;
    let body_limit = usize::try_from(config.limits.max_file_size.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX);

    let mut upload_routes = Router::new().route(
        "/api/upload-profile-image",
        post(upload_profile_image).fallback(method_not_allowed),
    );

    if state.verifier.is_some() {
        upload_routes = upload_routes.route(
            "/uploadProfilePicture",
            post(upload_profile_picture).fallback(method_not_allowed),
        );
    } else {
        debug!("No identity service configured, verified upload endpoint disabled");
    }

    let mut router = Router::new()
        .merge(upload_routes.layer(DefaultBodyLimit::max(body_limit)))
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    if let Some(root) = state.storage.static_root() {
        for base in [&config.destinations.profile_base, &config.destinations.document_base] {
            router = router.nest_service(&format!("/uploads/{base}"), ServeDir::new(root.join(base)));
        }
    }

    let cors_layer = create_cors_layer(config)?;

    let router = router
        .with_state(state)
        .layer(cors_layer)
        .layer(from_fn(preflight_no_content))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application struct that owns the router and its configuration.
///
/// 1. **Initialization** ([`Application::new`]): builds the storage backend and token verifier
/// 2. **Serving** ([`Application::serve`]): runs until the shutdown future resolves, then
///    flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting imgdrop with configuration: {:#?}", config);

        let storage = storage::build_storage(&config).await?;

        let verifier = match &config.auth {
            Some(auth) => {
                info!(verify_url = %auth.verify_url, "Verified uploads enabled");
                Some(Arc::new(HttpTokenVerifier::new(auth)?) as Arc<dyn TokenVerifier>)
            }
            None => None,
        };

        let app_state = AppState::builder()
            .config(config.clone())
            .storage(storage)
            .maybe_verifier(verifier)
            .build();

        let router = build_router(app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "imgdrop listening on http://{}, public base URL {}",
            bind_addr, self.config.public_base_url
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
