#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use buildhub_core::build::template::{CODE_END_MARKER, CODE_START_MARKER};
use buildhub_core::build::BuildCommand;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use buildhub_api::config::{BuildConfig, ServerConfig};
use buildhub_api::router::build_app_router;
use buildhub_api::state::AppState;

/// Exercise with a template in every test environment.
pub const EXERCISE: &str = "nft-burn";

/// Template target file used by the tests, relative to the working copy.
pub const TARGET_FILE: &str = "src/NFT.hs";

/// A router wired to temporary template and build directories.
///
/// Keep the value alive for the duration of the test; dropping it removes
/// the directories.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub root: TempDir,
}

impl TestApp {
    pub fn builds_dir(&self) -> PathBuf {
        self.root.path().join("builds")
    }
}

/// Build a test `ServerConfig` rooted at `root`, running `script` through
/// `sh -c` as the build tool.
pub fn test_config(root: &std::path::Path, script: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        build: BuildConfig {
            templates_dir: root.join("templates"),
            builds_dir: root.join("builds"),
            target_file: PathBuf::from(TARGET_FILE),
            command: BuildCommand::new("sh", ["-c", script]),
            timeout: Some(Duration::from_secs(10)),
            stream_grace: Duration::from_millis(20),
            job_retention: Duration::from_secs(3600),
        },
    }
}

/// Build the full application router (same middleware stack as production)
/// over a fresh temp directory holding one `nft-burn` template.
pub fn build_test_app(script: &str) -> TestApp {
    let root = tempfile::tempdir().expect("temp dir");

    let template = root.path().join("templates").join(EXERCISE);
    std::fs::create_dir_all(template.join("src")).expect("template dir");
    std::fs::write(
        template.join(TARGET_FILE),
        format!("module NFT where\n-- {CODE_START_MARKER}\nplaceholder = ()\n-- {CODE_END_MARKER}\n"),
    )
    .expect("template file");
    std::fs::write(template.join("project.cabal"), "name: nft\n").expect("cabal file");

    let config = test_config(root.path(), script);
    let state = AppState::new(&config);
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        root,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read a whole NDJSON body, one value per line.
pub async fn body_ndjson(response: Response<Body>) -> Vec<serde_json::Value> {
    let bytes = tokio::time::timeout(Duration::from_secs(15), response.into_body().collect())
        .await
        .expect("event stream should close")
        .unwrap()
        .to_bytes();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Submit `code` for the test exercise and return the new job id.
pub async fn submit(app: &TestApp, code: &str) -> String {
    let response = post_json(
        app.router.clone(),
        &format!("/api/v1/exercises/{EXERCISE}/builds"),
        serde_json::json!({ "code": code }),
    )
    .await;
    assert_eq!(response.status(), 202);
    let json = body_json(response).await;
    json["data"]["job_id"].as_str().unwrap().to_string()
}

/// Poll the status endpoint until the job reaches a terminal status.
pub async fn wait_for_terminal(app: &TestApp, job_id: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let response = get(app.router.clone(), &format!("/api/v1/builds/{job_id}")).await;
            let json = body_json(response).await;
            let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
            if status == "completed" || status == "failed" {
                return json["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job should finish")
}
