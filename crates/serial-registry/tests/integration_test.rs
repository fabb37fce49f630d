//! Integration tests for the Serial Registry console and API

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serial_registry::{create_router, AppState, MemorySerialStore, SerialStore};
use tagpage_common::Nonces;
use tower::ServiceExt; // for `oneshot`

const SECRET: &str = "integration-test-secret";
const ADMIN_ID: u64 = 1;

fn create_test_app() -> (axum::Router, Arc<MemorySerialStore>) {
    let store = Arc::new(MemorySerialStore::new());
    let state = AppState {
        storage: store.clone(),
        nonces: Nonces::new(SECRET),
    };
    (create_router(state), store)
}

fn admin_token() -> String {
    Nonces::new(SECRET).issue("add_serial", &ADMIN_ID.to_string(), ADMIN_ID)
}

fn post_form(body: String, role: &str) -> Request<Body> {
    Request::builder()
        .uri("/admin/serials")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-user-id", ADMIN_ID.to_string())
        .header("x-user-role", role)
        .body(Body::from(body))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _store) = create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "serial-registry");
}

#[tokio::test]
async fn test_add_serial_from_console() {
    let (app, store) = create_test_app();

    let body = format!(
        "serial_number=SN-100&item_no=42&_token={}&add_serial=1",
        admin_token()
    );
    let response = app.oneshot(post_form(body, "admin")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/admin/serials?added=1"
    );

    let record = store.find_by_serial("SN-100").await.unwrap().unwrap();
    assert_eq!(record.item_no, 42);
    assert!(!record.used);
}

#[tokio::test]
async fn test_add_duplicate_serial_redirects_with_error() {
    let (app, store) = create_test_app();
    store.insert("SN-100", 42, true).await.unwrap();

    let body = format!(
        "serial_number=SN-100&item_no=7&_token={}&add_serial=1",
        admin_token()
    );
    let response = app.oneshot(post_form(body, "admin")).await.unwrap();

    assert_eq!(
        response.headers()[header::LOCATION],
        "/admin/serials?error=duplicate"
    );

    let record = store.find_by_serial("SN-100").await.unwrap().unwrap();
    assert_eq!(record.item_no, 42);
    assert!(record.used);
}

#[tokio::test]
async fn test_add_serial_requires_valid_token() {
    let (app, store) = create_test_app();

    let body = "serial_number=SN-100&item_no=42&_token=deadbeef&add_serial=1".to_string();
    let response = app.oneshot(post_form(body, "admin")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(store.find_by_serial("SN-100").await.unwrap().is_none());
}

#[tokio::test]
async fn test_add_serial_requires_operator() {
    let (app, store) = create_test_app();

    let body = format!(
        "serial_number=SN-100&item_no=42&_token={}&add_serial=1",
        admin_token()
    );
    let response = app.oneshot(post_form(body, "customer")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(store.find_by_serial("SN-100").await.unwrap().is_none());
}

#[tokio::test]
async fn test_add_serial_rejects_bad_product() {
    let (app, store) = create_test_app();

    let body = format!(
        "serial_number=SN-100&item_no=abc&_token={}&add_serial=1",
        admin_token()
    );
    let response = app.oneshot(post_form(body, "admin")).await.unwrap();

    assert_eq!(
        response.headers()[header::LOCATION],
        "/admin/serials?error=invalid"
    );
    assert!(store.find_by_serial("SN-100").await.unwrap().is_none());
}

#[tokio::test]
async fn test_console_previews_next_unused() {
    let (app, store) = create_test_app();
    store.insert("SN-1", 42, true).await.unwrap();
    store.insert("SN-2", 42, false).await.unwrap();
    store.insert("SN-3", 42, false).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/serials?added=1&product=7")
                .header("x-user-id", ADMIN_ID.to_string())
                .header("x-user-role", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let html = body_string(response).await;
    assert!(html.contains("Serial number added."));
    assert!(html.contains(r#"name="next_serial_42" value="SN-2" readonly"#));
    assert!(html.contains(r#"name="next_serial_7" value="" placeholder="No unused serials" readonly"#));
}

#[tokio::test]
async fn test_get_serial_and_next_unused_api() {
    let (app, store) = create_test_app();
    store.insert("SN-1", 42, false).await.unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/serials/SN-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["serial"]["item_no"], 42);
    assert_eq!(json["serial"]["used"], false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/products/42/next-unused")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["next_unused"]["serial_number"], "SN-1");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/serials/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
