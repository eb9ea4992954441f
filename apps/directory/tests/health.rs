use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt; // for `oneshot`

use keyproof_directory::config::DirectoryConfig;
use keyproof_directory::router::build_router;
use keyproof_directory::state::DirectoryState;

fn test_app() -> axum::Router {
    build_router(DirectoryState::new(DirectoryConfig::default()))
}

#[tokio::test]
async fn health_live_returns_200_with_status_ok() {
    let request = Request::builder()
        .uri("/health/live")
        .body(Body::empty())
        .unwrap();

    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let request = Request::builder()
        .uri("/health/live")
        .body(Body::empty())
        .unwrap();

    let response = test_app().oneshot(request).await.unwrap();
    let request_id = response.headers().get("x-request-id").unwrap();
    assert!(uuid::Uuid::parse_str(request_id.to_str().unwrap()).is_ok());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let request = Request::builder()
        .uri("/api/nope")
        .body(Body::empty())
        .unwrap();

    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
