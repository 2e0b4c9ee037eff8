//! Caller identity middleware.
//!
//! Authentication happens at the gateway, which forwards the verified user
//! id in `X-User-Id`. This layer rejects requests without it and stores a
//! [`Caller`] in request extensions for handlers.

use crate::errors::LiveError;
use axum::{extract::Request, middleware::Next, response::IntoResponse};
use tracing::instrument;

/// Header carrying the authenticated user id.
pub const CALLER_HEADER: &str = "x-user-id";

/// The authenticated user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Require a non-empty caller id header.
///
/// # Response
///
/// - 401 Unauthorized if the header is missing, empty or not valid UTF-8
#[instrument(skip_all, name = "live.middleware.identity")]
pub async fn require_caller(mut req: Request, next: Next) -> Result<impl IntoResponse, LiveError> {
    let caller = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "live.middleware.identity", "Missing caller header");
            LiveError::Unauthorized("Missing caller identity".to_string())
        })?;

    req.extensions_mut().insert(Caller(caller));
    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(caller): Extension<Caller>| async move { caller.0 }),
            )
            .layer(axum::middleware::from_fn(require_caller))
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/whoami")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_blank_header_is_unauthorized() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/whoami")
                    .header(CALLER_HEADER, "   ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_caller_reaches_handler() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/whoami")
                    .header(CALLER_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"alice");
    }
}
