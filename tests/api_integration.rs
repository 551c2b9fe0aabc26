mod common;

use axum::http::StatusCode;
use common::{get, post, TestHub, TestService, CATALOG, VALID_TOKEN};
use hal_downloader::api::server::AppState;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_health_and_config() {
    let service = TestService::new();
    let router = service.router();

    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, body) = get(&router, "/config").await;
    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["local_path"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        vec![
            "org/modelA",
            "checkpoints/flux-dev.safetensors",
            "vae/ae.safetensors"
        ]
    );
    assert_eq!(body[1]["license"]["required"], json!(true));
}

#[tokio::test]
async fn test_config_picks_up_catalog_edits() {
    let service = TestService::new();
    let router = service.router();

    std::fs::write(
        &service.config.storage.catalog_path,
        r#"[{"local_path": "org/modelZ"}]"#,
    )
    .unwrap();

    let (_, body) = get(&router, "/config").await;
    assert_eq!(body, json!([{"local_path": "org/modelZ"}]));
}

#[tokio::test]
async fn test_unreadable_catalog_is_503() {
    let service = TestService::new();
    let router = service.router();
    std::fs::write(&service.config.storage.catalog_path, "not json").unwrap();

    let (status, body) = get(&router, "/config").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("model catalog"));
}

#[tokio::test]
async fn test_active_round_trip() {
    let service = TestService::new();
    let router = service.router();

    let (status, body) = get(&router, "/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"enabled_models": [], "model_status": {}}));

    let posted = json!({
        "enabled_models": ["modelA", "not-in-catalog"],
        "model_status": {"ae.safetensors": {"downloaded": true}}
    });
    let (status, body) = post(&router, "/active", &posted.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (_, body) = get(&router, "/active").await;
    assert_eq!(body, posted);
}

#[tokio::test]
async fn test_toggle_on_then_off_restores_set() {
    let service = TestService::new();
    let router = service.router();

    post(
        &router,
        "/active",
        r#"{"enabled_models": ["ae.safetensors"]}"#,
    )
    .await;
    let (_, original) = get(&router, "/active").await;

    post(
        &router,
        "/active",
        r#"{"enabled_models": ["ae.safetensors", "modelA"], "model_status": {}}"#,
    )
    .await;
    post(
        &router,
        "/active",
        r#"{"enabled_models": ["ae.safetensors"], "model_status": {}}"#,
    )
    .await;

    let (_, after) = get(&router, "/active").await;
    assert_eq!(after["enabled_models"], original["enabled_models"]);
}

#[tokio::test]
async fn test_invalid_active_leaves_store_unchanged() {
    let service = TestService::new();
    let router = service.router();
    post(&router, "/active", r#"{"enabled_models": ["modelA"]}"#).await;

    for body in [
        "{not json",
        r#"{"model_status": {}}"#,
        r#"{"enabled_models": "modelA"}"#,
        r#"{"enabled_models": ["modelA", "modelA"]}"#,
    ] {
        let (status, response) = post(&router, "/active", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(response["error"].is_string());
    }

    let (_, body) = get(&router, "/active").await;
    assert_eq!(body["enabled_models"], json!(["modelA"]));
}

#[tokio::test]
async fn test_enable_then_download_scenario() {
    let service = TestService::new();
    let router = service.router();

    let (_, mut active) = get(&router, "/active").await;
    active["enabled_models"] = json!(["modelA"]);
    post(&router, "/active", &active.to_string()).await;

    let (_, active) = get(&router, "/active").await;
    assert_eq!(active["enabled_models"], json!(["modelA"]));

    let (status, body) = post(&router, "/download", r#"{"model_name": "modelA"}"#).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["status"]
        .as_str()
        .unwrap()
        .starts_with("Successfully downloaded modelA to org/modelA"));
    assert_eq!(body["results"][0]["ok"], json!(true));
    assert!(body.get("error").is_none());

    let (_, active) = get(&router, "/active").await;
    assert_eq!(active["model_status"], json!({"modelA": {"downloaded": true}}));
    assert!(service.models_root().join("org/modelA").exists());

    let (_, active) = get(&router, "/active").await;
    assert_eq!(active["model_status"]["modelA"]["downloaded"], json!(true));
}

#[tokio::test]
async fn test_download_request_validation() {
    let service = TestService::new();
    let router = service.router();

    for body in ["{}", r#"{"model_name": ""}"#, r#"{"model_names": []}"#] {
        let (status, response) = post(&router, "/download", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"], json!("Error: No model name provided"));
    }

    let (status, response) = post(&router, "/download", r#"{"model_name": "modelB"}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        response["error"],
        json!("No matching models found for modelB. Did you mean 'modelA'?")
    );
    assert_eq!(service.hub.fetch_count(), 0);
}

#[tokio::test]
async fn test_gated_download_requires_login() {
    let service = TestService::new();
    let router = service.router();

    let (status, body) = post(
        &router,
        "/download",
        r#"{"model_names": ["modelA", "flux-dev.safetensors"]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("flux-dev.safetensors"), "{error}");
    assert!(error.contains("https://huggingface.co/black-forest-labs/FLUX.1-dev"));

    // Nothing is fetched when any requested model is gated
    assert_eq!(service.hub.fetch_count(), 0);
    let (_, active) = get(&router, "/active").await;
    assert_eq!(active["model_status"], json!({}));
}

#[tokio::test]
async fn test_login_flow() {
    let service = TestService::new();
    let router = service.router();

    let (_, body) = get(&router, "/login-status").await;
    assert_eq!(body, json!({"logged_in": false}));

    let (status, _) = post(&router, "/login", r#"{"token": "  "}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&router, "/login", r#"{"token": "hf_wrong"}"#).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().starts_with("Login failed"));
    let (_, body) = get(&router, "/login-status").await;
    assert_eq!(body, json!({"logged_in": false}));

    let (status, body) = post(
        &router,
        "/login",
        &json!({"token": format!(" {VALID_TOKEN}\n")}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"], json!("hal-tester"));

    let (_, body) = get(&router, "/login-status").await;
    assert_eq!(body, json!({"logged_in": true}));

    let (status, body) = post(
        &router,
        "/download",
        r#"{"model_name": "flux-dev.safetensors"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(service
        .models_root()
        .join("checkpoints/flux-dev.safetensors")
        .exists());

    let (status, _) = post(&router, "/logout", "").await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get(&router, "/login-status").await;
    assert_eq!(body, json!({"logged_in": false}));

    // Logging out twice is fine
    let (status, _) = post(&router, "/logout", "").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_session_survives_restart() {
    let service = TestService::new();
    post(
        &service.router(),
        "/login",
        &json!({"token": VALID_TOKEN}).to_string(),
    )
    .await;

    let restarted = AppState::from_config(&service.config, service.hub.clone()).unwrap();
    let router = hal_downloader::api::server::create_router(restarted, common::BASE_PATH);
    let (_, body) = get(&router, "/login-status").await;
    assert_eq!(body, json!({"logged_in": true}));
}

#[tokio::test]
async fn test_rejected_token_logs_out() {
    let service = TestService::new();
    let router = service.router();
    post(&router, "/login", &json!({"token": VALID_TOKEN}).to_string()).await;

    service.hub.revoke(VALID_TOKEN);

    let (status, body) = post(
        &router,
        "/download",
        r#"{"model_name": "flux-dev.safetensors"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["results"][0]["ok"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("log in again"));

    let (_, body) = get(&router, "/login-status").await;
    assert_eq!(body, json!({"logged_in": false}));
    assert_eq!(service.hub.fetch_count(), 0);
}

#[tokio::test]
async fn test_batch_reports_each_item() {
    let service = TestService::with_hub(CATALOG, TestHub::new().failing_on("vae/ae.safetensors"));
    let router = service.router();

    let (status, body) = post(
        &router,
        "/download",
        r#"{"model_names": ["modelA", "ae.safetensors"]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        body["status"],
        json!("Downloaded 1 of 2 models; failed: ae.safetensors")
    );
    assert_eq!(body["error"], body["status"]);
    assert_eq!(body["results"][0]["model_name"], json!("modelA"));
    assert_eq!(body["results"][0]["ok"], json!(true));
    assert_eq!(body["results"][1]["ok"], json!(false));

    let (_, active) = get(&router, "/active").await;
    assert_eq!(active["model_status"], json!({"modelA": {"downloaded": true}}));
}

#[tokio::test]
async fn test_existing_file_is_not_fetched_again() {
    let service = TestService::new();
    let router = service.router();

    post(&router, "/download", r#"{"model_name": "modelA"}"#).await;
    let (status, body) = post(&router, "/download", r#"{"model_name": "modelA"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("File already exists at org/modelA"));
    assert_eq!(service.hub.fetch_count(), 1);
}

#[tokio::test]
async fn test_background_job_completes() {
    let service = TestService::new();
    let router = service.router();

    let (status, body) = post(
        &router,
        "/download",
        r#"{"model_names": ["modelA"], "wait": false}"#,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_u64().unwrap();

    let mut job = json!(null);
    for _ in 0..100 {
        let (status, body) = get(&router, &format!("/download/jobs/{job_id}")).await;
        assert_eq!(status, StatusCode::OK);
        job = body;
        if job["state"] != json!("running") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(job["state"], json!("completed"));
    assert_eq!(job["model_names"], json!(["modelA"]));
    assert_eq!(job["report"]["results"][0]["ok"], json!(true));

    let (_, active) = get(&router, "/active").await;
    assert_eq!(active["model_status"]["modelA"]["downloaded"], json!(true));
}

#[tokio::test]
async fn test_background_job_can_be_cancelled() {
    let service = TestService::with_hub(CATALOG, TestHub::new().slow(Duration::from_secs(30)));
    let router = service.router();

    let (status, body) = post(
        &router,
        "/download",
        r#"{"model_name": "modelA", "wait": false}"#,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_u64().unwrap();

    let (status, job) = post(&router, &format!("/download/jobs/{job_id}/cancel"), "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["state"], json!("cancelled"));

    let (_, job) = get(&router, &format!("/download/jobs/{job_id}")).await;
    assert_eq!(job["state"], json!("cancelled"));

    let (_, active) = get(&router, "/active").await;
    assert_eq!(active["model_status"], json!({}));
    assert!(!service.models_root().join("org/modelA").exists());
}

#[tokio::test]
async fn test_logout_during_job_stops_gated_items() {
    let service = TestService::with_hub(CATALOG, TestHub::new().slow(Duration::from_millis(300)));
    let router = service.router();
    post(&router, "/login", &json!({"token": VALID_TOKEN}).to_string()).await;

    let (status, body) = post(
        &router,
        "/download",
        r#"{"model_names": ["modelA", "flux-dev.safetensors"], "wait": false}"#,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    let job_id = body["job_id"].as_u64().unwrap();

    // modelA is still transferring
    let (status, _) = post(&router, "/logout", "").await;
    assert_eq!(status, StatusCode::OK);

    let mut job = json!(null);
    for _ in 0..200 {
        let (_, body) = get(&router, &format!("/download/jobs/{job_id}")).await;
        job = body;
        if job["state"] != json!("running") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(job["state"], json!("failed"), "{job}");
    assert_eq!(job["report"]["results"][0]["ok"], json!(true));
    assert_eq!(job["report"]["results"][1]["ok"], json!(false));
    assert!(job["report"]["results"][1]["message"]
        .as_str()
        .unwrap()
        .contains("Log in"));

    let (_, body) = get(&router, "/login-status").await;
    assert_eq!(body, json!({"logged_in": false}));
    assert_eq!(service.hub.fetch_count(), 1);
    assert!(!service
        .models_root()
        .join("checkpoints/flux-dev.safetensors")
        .exists());
}

#[tokio::test]
async fn test_detached_download_is_still_planned_up_front() {
    let service = TestService::new();
    let router = service.router();

    let (status, _) = post(
        &router,
        "/download",
        r#"{"model_name": "flux-dev.safetensors", "wait": false}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&router, "/download/jobs/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_check_downloads() {
    let service = TestService::new();
    let router = service.router();
    post(&router, "/download", r#"{"model_name": "modelA"}"#).await;

    let (status, body) = get(&router, "/check/model").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("✓ modelA is downloaded"));

    let (_, body) = get(&router, "/check/safetensors").await;
    assert_eq!(
        body["status"],
        json!("✗ flux-dev.safetensors is not downloaded\n✗ ae.safetensors is not downloaded")
    );

    let (status, body) = get(&router, "/check/zzz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("No matching models found for zzz"));
}

#[tokio::test]
async fn test_unknown_routes() {
    let service = TestService::new();
    let router = service.router();

    let (status, body) = get(&router, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let request = axum::http::Request::builder()
        .uri("/api/hal-fun-downloader/config")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(router, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
