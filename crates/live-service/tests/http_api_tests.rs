//! HTTP API tests.
//!
//! Drive the full router (middleware, handlers, error mapping) with
//! `tower::ServiceExt::oneshot` over the in-memory harness.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use live_service::middleware::CALLER_HEADER;
use live_service::observability::HealthState;
use live_service::routes::{build_routes, AppState};
use live_test_utils::TestHarness;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    health: Arc<HealthState>,
    harness: TestHarness,
}

impl TestApp {
    fn new(harness: TestHarness) -> Self {
        let health = Arc::new(HealthState::new());
        let state = Arc::new(AppState {
            calls: harness.calls.clone(),
        });
        Self {
            router: build_routes(state, Arc::clone(&health), None),
            health,
            harness,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        caller: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), anyhow::Error> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(CALLER_HEADER, caller);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, value))
    }
}

fn friends() -> TestApp {
    TestApp::new(TestHarness::builder().with_friends("alice", "bob").build())
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_calls_require_caller_header() -> Result<(), anyhow::Error> {
    let app = friends();

    let (status, body) = app
        .send(Method::GET, "/v1/live/rooms/current", None, None)
        .await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn test_call_flow_over_http() -> Result<(), anyhow::Error> {
    let app = friends();

    let (status, created) = app
        .send(
            Method::POST,
            "/v1/live/rooms",
            Some("alice"),
            Some(json!({"type": "user_call", "participants": ["bob"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = created["room_id"].as_str().unwrap_or_default().to_string();
    assert!(!room_id.is_empty());
    assert_eq!(created["ring_timeout_seconds"], 60);

    let (status, current) = app
        .send(Method::GET, "/v1/live/rooms/current", Some("bob"), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["room"]["id"], room_id.as_str());

    let (status, joined) = app
        .send(
            Method::POST,
            &format!("/v1/live/rooms/{room_id}/join"),
            Some("bob"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        joined["token"],
        format!("token:{room_id}:bob:participant").as_str()
    );
    assert_eq!(joined["room"]["numParticipants"], 2);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/v1/live/rooms/{room_id}"),
            Some("alice"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .send(
            Method::DELETE,
            &format!("/v1/live/rooms/{room_id}"),
            Some("alice"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "CALL_NOT_FOUND");

    assert_eq!(app.harness.store.live_key_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_reject_and_leave_return_no_content() -> Result<(), anyhow::Error> {
    let app = friends();
    let created = app
        .harness
        .calls
        .create_room("alice", live_test_utils::user_call_request("bob"))
        .await?;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/v1/live/rooms/{}/reject", created.room_id),
            Some("alice"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "REJECT_NOT_ALLOWED");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/v1/live/rooms/{}/reject", created.room_id),
            Some("bob"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/v1/live/rooms/{}/leave", created.room_id),
            Some("alice"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "CALL_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn test_busy_callee_is_conflict() -> Result<(), anyhow::Error> {
    let app = TestApp::new(
        TestHarness::builder()
            .with_friends("alice", "bob")
            .with_friends("carol", "bob")
            .build(),
    );
    app.harness
        .calls
        .create_room("alice", live_test_utils::user_call_request("bob"))
        .await?;

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/live/rooms",
            Some("carol"),
            Some(json!({"type": "user_call", "participants": ["bob"]})),
        )
        .await?;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "ALREADY_IN_CALL");
    Ok(())
}

#[tokio::test]
async fn test_malformed_requests_are_bad_requests() -> Result<(), anyhow::Error> {
    let app = friends();

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/live/rooms/not-a-room/join",
            Some("alice"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_PARAMETER");

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/live/rooms",
            Some("alice"),
            Some(json!({"type": "conference", "participants": ["bob"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_PARAMETER");

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/live/rooms",
            Some("alice"),
            Some(json!({"type": "user_call", "participants": []})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_PARAMETER");
    Ok(())
}

#[tokio::test]
async fn test_missing_relation_is_forbidden() -> Result<(), anyhow::Error> {
    let app = TestApp::new(TestHarness::new());

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/live/rooms",
            Some("alice"),
            Some(json!({"type": "user_call", "participants": ["bob"]})),
        )
        .await?;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "RELATION_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn test_group_room_endpoint() -> Result<(), anyhow::Error> {
    let app = TestApp::new(
        TestHarness::builder()
            .with_group("g-7", &["alice", "bob"])
            .build(),
    );

    let (status, body) = app
        .send(Method::GET, "/v1/live/groups/g-7/room", Some("bob"), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "CALL_NOT_FOUND");

    let (status, _) = app
        .send(
            Method::POST,
            "/v1/live/rooms",
            Some("alice"),
            Some(json!({"type": "group_call", "group_id": "g-7", "participants": ["bob"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, view) = app
        .send(Method::GET, "/v1/live/groups/g-7/room", Some("bob"), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["room"]["groupId"], "g-7");
    Ok(())
}

#[tokio::test]
async fn test_cache_outage_is_internal_error() -> Result<(), anyhow::Error> {
    let app = friends();
    app.harness.store.set_unavailable(true);

    let (status, body) = app
        .send(Method::GET, "/v1/live/rooms/current", Some("alice"), None)
        .await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "INTERNAL_ERROR");
    // Cache details stay out of the response
    assert!(!body.to_string().contains("cache unavailable"));
    Ok(())
}

#[tokio::test]
async fn test_probes() -> Result<(), anyhow::Error> {
    let app = friends();

    let (status, _) = app.send(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::GET, "/ready", None, None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.health.set_ready();
    let (status, _) = app.send(Method::GET, "/ready", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
