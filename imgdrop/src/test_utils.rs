//! Test utilities for integration testing.

use crate::config::{AuthConfig, Config, LocalStorageConfig, StorageConfig};
use axum_test::TestServer;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

/// reqwest is built without a default rustls provider; main installs one, tests do it here
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Local-storage config rooted at `root`, staging under `<root>/.staging`, no identity service
pub fn create_test_config(root: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage: StorageConfig::Local(LocalStorageConfig { root: root.to_path_buf() }),
        ..Default::default()
    }
}

impl Config {
    /// Enable the verified endpoint against a mocked identity service
    pub fn with_identity_service(mut self, server: &MockServer) -> Self {
        self.auth = Some(AuthConfig {
            verify_url: format!("{}/verify", server.uri()).parse().expect("mock server URL"),
            timeout: Duration::from_secs(2),
        });
        self
    }
}

pub async fn create_test_app(config: Config) -> TestServer {
    install_crypto_provider();
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Identity service that accepts exactly `token` as `uid` and rejects everything else with 401
pub async fn mock_identity_service(token: &str, uid: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .and(body_json(serde_json::json!({ "token": token })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "uid": uid })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    server
}

/// Names of regular files directly inside `dir`; empty if the directory does not exist
pub fn files_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path: &PathBuf| path.is_file())
        .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}
