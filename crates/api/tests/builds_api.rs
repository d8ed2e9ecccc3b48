//! Integration tests for build submission, status queries and event streams.

mod common;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{
    body_json, body_ndjson, build_test_app, get, post_json, submit, wait_for_terminal, EXERCISE,
    TARGET_FILE,
};
use serde_json::json;
use tower::ServiceExt;

const FAILING_BUILD: &str = "sleep 0.3; \
    echo 'Building library for nft-0.1.0..' ; \
    echo 'src/NFT.hs:3:1: error:' >&2; \
    echo '    parse error on input burn' >&2; \
    exit 1";

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_202_with_pending_job() {
    let app = build_test_app("sleep 0.2");

    let response = post_json(
        app.router.clone(),
        &format!("/api/v1/exercises/{EXERCISE}/builds"),
        json!({ "code": "burn = ()" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "pending");
    let job_id = json["data"]["job_id"].as_str().expect("job id");
    assert!(job_id.starts_with("nft-burn-"));
}

#[tokio::test]
async fn empty_code_returns_400() {
    let app = build_test_app("true");

    for body in [json!({ "code": "" }), json!({ "code": "   \n" }), json!({})] {
        let response = post_json(
            app.router.clone(),
            &format!("/api/v1/exercises/{EXERCISE}/builds"),
            body,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "INVALID_INPUT");
    }
    assert!(app.state.jobs.is_empty());
}

#[tokio::test]
async fn malformed_body_returns_json_400() {
    let app = build_test_app("true");

    for (content_type, body) in [("application/json", "{not json"), ("text/plain", "x = 1")] {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/api/v1/exercises/{EXERCISE}/builds"))
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "BAD_REQUEST");
        assert!(json["error"].is_string());
    }
    assert!(app.state.jobs.is_empty());
}

#[tokio::test]
async fn unknown_exercise_returns_404() {
    let app = build_test_app("true");

    let response = post_json(
        app.router.clone(),
        "/api/v1/exercises/no-such-exercise/builds",
        json!({ "code": "x = 1" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.state.jobs.is_empty());
}

#[tokio::test]
async fn malformed_exercise_name_returns_400() {
    let app = build_test_app("true");

    let response = post_json(
        app.router.clone(),
        "/api/v1/exercises/nft.burn/builds",
        json!({ "code": "x = 1" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_submissions_get_distinct_jobs() {
    let app = build_test_app("echo done");

    let submissions = (0..10).map(|i| {
        let app = &app;
        async move { submit(app, &format!("value{i} = {i}")).await }
    });
    let ids = futures::future::join_all(submissions).await;

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    for (i, id) in ids.iter().enumerate() {
        let snapshot = wait_for_terminal(&app, id).await;
        assert_eq!(snapshot["status"], "completed");

        let injected =
            std::fs::read_to_string(app.builds_dir().join(id).join(TARGET_FILE)).unwrap();
        assert!(injected.contains(&format!("value{i} = {i}")));
        assert!(!injected.contains("placeholder"));
    }
}

// ---------------------------------------------------------------------------
// Status query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_returns_404() {
    let app = build_test_app("true");

    let response = get(app.router.clone(), "/api/v1/builds/nft-burn-missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(app.router.clone(), "/api/v1/builds/nft-burn-missing/events").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_reports_success_and_output() {
    let app = build_test_app("echo 'Linking nft'");
    let job_id = submit(&app, "burn = ()").await;

    let snapshot = wait_for_terminal(&app, &job_id).await;

    assert_eq!(snapshot["id"], job_id);
    assert_eq!(snapshot["exercise"], EXERCISE);
    assert_eq!(snapshot["status"], "completed");
    assert_eq!(snapshot["success"], true);
    assert_eq!(snapshot["output"], "Linking nft\n");
    assert!(snapshot["last_error"].is_null());
}

#[tokio::test]
async fn status_is_unsettled_while_running() {
    let app = build_test_app("sleep 1");
    let job_id = submit(&app, "burn = ()").await;

    let response = get(app.router.clone(), &format!("/api/v1/builds/{job_id}")).await;
    let json = body_json(response).await;

    assert!(json["data"]["success"].is_null());
    assert!(["pending", "preparing", "building"]
        .contains(&json["data"]["status"].as_str().unwrap()));
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn event_stream_follows_a_successful_build() {
    let app = build_test_app("sleep 0.3; echo 'Compiling NFT'");
    let job_id = submit(&app, "burn = ()").await;

    let response = get(app.router.clone(), &format!("/api/v1/builds/{job_id}/events")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );

    let events = body_ndjson(response).await;
    let statuses: Vec<_> = events.iter().map(|e| e["status"].as_str().unwrap()).collect();

    assert!(statuses.contains(&"building"));
    assert_eq!(statuses.iter().filter(|s| **s == "completed").count(), 1);
    assert_eq!(statuses.last(), Some(&"completed"));

    let progress: Vec<_> = events.iter().map(|e| e["progress"].as_u64().unwrap()).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));

    assert!(events
        .iter()
        .any(|e| e["output_chunk"] == "Compiling NFT\n"));
    assert!(events.iter().all(|e| e["job_id"] == job_id));
}

#[tokio::test]
async fn event_stream_reports_compiler_errors() {
    let app = build_test_app(FAILING_BUILD);
    let job_id = submit(&app, "burn = (").await;

    let response = get(app.router.clone(), &format!("/api/v1/builds/{job_id}/events")).await;
    let events = body_ndjson(response).await;

    let last = events.last().expect("terminal event");
    assert_eq!(last["status"], "failed");
    assert_eq!(last["diagnostic"]["line"], 3);
    assert_eq!(last["diagnostic"]["file"], "NFT.hs");
    assert!(last["diagnostic"]["message"]
        .as_str()
        .unwrap()
        .contains("parse error on input burn"));

    assert!(events
        .iter()
        .any(|e| e["status"] == "building" && e["raw_error_chunk"].is_string()));
    assert!(events.iter().all(|e| e["status"] != "completed"));

    let snapshot = wait_for_terminal(&app, &job_id).await;
    assert_eq!(snapshot["success"], false);
    assert_eq!(snapshot["last_error"], last["diagnostic"]);
}

#[tokio::test]
async fn late_subscriber_stream_closes_immediately() {
    let app = build_test_app("echo fast");
    let job_id = submit(&app, "burn = ()").await;
    wait_for_terminal(&app, &job_id).await;

    let started = Instant::now();
    let response = get(app.router.clone(), &format!("/api/v1/builds/{job_id}/events")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = body_ndjson(response).await;
    assert!(events.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn concurrent_jobs_have_isolated_streams() {
    let app = build_test_app("sleep 0.3; echo ok");
    let first = submit(&app, "a = 1").await;
    let second = submit(&app, "b = 2").await;

    let (first_events, second_events) = tokio::join!(
        async {
            let r = get(app.router.clone(), &format!("/api/v1/builds/{first}/events")).await;
            body_ndjson(r).await
        },
        async {
            let r = get(app.router.clone(), &format!("/api/v1/builds/{second}/events")).await;
            body_ndjson(r).await
        },
    );

    assert!(first_events.iter().all(|e| e["job_id"] == first));
    assert!(second_events.iter().all(|e| e["job_id"] == second));
    assert_eq!(first_events.last().unwrap()["status"], "completed");
    assert_eq!(second_events.last().unwrap()["status"], "completed");
}
