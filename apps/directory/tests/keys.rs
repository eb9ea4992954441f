use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;

use keyproof_directory::config::DirectoryConfig;
use keyproof_directory::router::build_router;
use keyproof_directory::state::DirectoryState;
use keyproof_shared::api::keys::{encode_public_key, KeyBundleResponse};
use keyproof_shared::ids::{KeyId, UserId};

fn test_app() -> axum::Router {
    build_router(DirectoryState::new(DirectoryConfig::default()))
}

fn put_keys(user_id: &str, public_key: &str, key_id: KeyId) -> Request<Body> {
    let body = serde_json::json!({ "public_key": public_key, "key_id": key_id });
    Request::builder()
        .method(Method::PUT)
        .uri(format!("/api/users/{user_id}/keys"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_keys(user_id: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/users/{user_id}/keys"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn unpublished_user_is_404_with_json_error() {
    let response = test_app()
        .oneshot(get_keys(&UserId::new().to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not found");
}

#[tokio::test]
async fn malformed_user_id_is_400() {
    let response = test_app().oneshot(get_keys("not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn published_bundle_is_served_back() {
    let app = test_app();
    let user_id = UserId::new();
    let key_id = KeyId::new();
    let key = encode_public_key(&[4u8; 32]);

    let response = app
        .clone()
        .oneshot(put_keys(&user_id.to_string(), &key, key_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(get_keys(&user_id.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bundle: KeyBundleResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(bundle.user_id, user_id);
    assert_eq!(bundle.key_id, key_id);
    assert_eq!(bundle.public_key, key);
}

#[tokio::test]
async fn wrong_length_key_is_400() {
    let response = test_app()
        .oneshot(put_keys(
            &UserId::new().to_string(),
            &encode_public_key(&[4u8; 31]),
            KeyId::new(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn same_key_id_with_different_key_is_409() {
    let app = test_app();
    let user_id = UserId::new().to_string();
    let key_id = KeyId::new();

    let first = app
        .clone()
        .oneshot(put_keys(&user_id, &encode_public_key(&[1u8; 32]), key_id))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let again = app
        .clone()
        .oneshot(put_keys(&user_id, &encode_public_key(&[1u8; 32]), key_id))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CREATED);

    let conflict = app
        .clone()
        .oneshot(put_keys(&user_id, &encode_public_key(&[2u8; 32]), key_id))
        .await
        .unwrap();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let current = app.oneshot(get_keys(&user_id)).await.unwrap();
    assert_eq!(
        body_json(current).await["public_key"],
        encode_public_key(&[1u8; 32])
    );
}

#[tokio::test]
async fn new_key_id_replaces_bundle() {
    let app = test_app();
    let user_id = UserId::new().to_string();
    let rotated = KeyId::new();

    app.clone()
        .oneshot(put_keys(&user_id, &encode_public_key(&[1u8; 32]), KeyId::new()))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(put_keys(&user_id, &encode_public_key(&[2u8; 32]), rotated))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bundle: KeyBundleResponse =
        serde_json::from_value(body_json(app.oneshot(get_keys(&user_id)).await.unwrap()).await)
            .unwrap();
    assert_eq!(bundle.key_id, rotated);
    assert_eq!(bundle.public_key, encode_public_key(&[2u8; 32]));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let config = DirectoryConfig {
        max_body_bytes: 64,
        ..Default::default()
    };
    let app = build_router(DirectoryState::new(config));
    let response = app
        .oneshot(put_keys(
            &UserId::new().to_string(),
            &"A".repeat(512),
            KeyId::new(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
