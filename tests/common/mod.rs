#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use hal_downloader::api::server::{create_router, AppState};
use hal_downloader::config::Config;
use hal_downloader::error::{HubError, Result};
use hal_downloader::models::download::{FetchRequest, HubAccount, ModelHub};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BASE_PATH: &str = "/hal-fun-downloader";
pub const VALID_TOKEN: &str = "hf_valid_token";

pub const CATALOG: &str = r#"[
    {"local_path": "org/modelA", "repo_id": "org/repo-a"},
    {"local_path": "checkpoints/flux-dev.safetensors", "repo_id": "black-forest-labs/FLUX.1-dev",
     "filename": "flux1-dev.safetensors",
     "license": {"required": true, "url": "https://huggingface.co/black-forest-labs/FLUX.1-dev"}},
    {"local_path": "vae/ae.safetensors", "repo_id": "org/repo-b", "subfolder": "vae"}
]"#;

/// Hub stand-in serving generated files
pub struct TestHub {
    files: TempDir,
    valid_tokens: Mutex<HashSet<String>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl TestHub {
    pub fn new() -> Self {
        Self {
            files: TempDir::new().unwrap(),
            valid_tokens: Mutex::new(HashSet::from([VALID_TOKEN.to_string()])),
            failing: HashSet::new(),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, path_in_repo: &str) -> Self {
        self.failing.insert(path_in_repo.to_string());
        self
    }

    /// Make every fetch take `delay`
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn revoke(&self, token: &str) {
        self.valid_tokens.lock().unwrap().remove(token);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelHub for TestHub {
    async fn whoami(&self, token: &str) -> Result<HubAccount> {
        if self.valid_tokens.lock().unwrap().contains(token) {
            Ok(HubAccount {
                name: "hal-tester".to_string(),
            })
        } else {
            Err(HubError::InvalidToken.into())
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&request.path_in_repo) {
            return Err(HubError::Fetch(format!("404 for {}", request.path_in_repo)).into());
        }

        let path = self
            .files
            .path()
            .join(&request.repo_id)
            .join(&request.path_in_repo);
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, b"fake weights")?;
        Ok(path)
    }

    fn hub_name(&self) -> &str {
        "test-hub"
    }
}

/// Service wired to a temporary state directory
pub struct TestService {
    pub temp_dir: TempDir,
    pub config: Config,
    pub hub: Arc<TestHub>,
    pub state: AppState,
}

impl TestService {
    pub fn new() -> Self {
        Self::with_hub(CATALOG, TestHub::new())
    }

    pub fn with_hub(catalog: &str, hub: TestHub) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let catalog_path = temp_dir.path().join("model_config.json");
        std::fs::write(&catalog_path, catalog).unwrap();

        let mut config = Config::default();
        config.storage.state_dir = temp_dir.path().join("state");
        config.storage.catalog_path = catalog_path;
        config.storage.models_root = temp_dir.path().join("models");

        let hub = Arc::new(hub);
        let state = AppState::from_config(&config, hub.clone()).unwrap();

        Self {
            temp_dir,
            config,
            hub,
            state,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone(), BASE_PATH)
    }

    pub fn models_root(&self) -> PathBuf {
        self.config.storage.models_root.clone()
    }
}

/// Send a request the way the panel does: JSON body, no `Content-Type`
pub async fn send(router: &Router, method: Method, path: &str, body: Option<&str>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(format!("{BASE_PATH}{path}"))
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
    send(router, Method::GET, path, None).await
}

pub async fn post(router: &Router, path: &str, body: &str) -> (StatusCode, Value) {
    send(router, Method::POST, path, Some(body)).await
}
