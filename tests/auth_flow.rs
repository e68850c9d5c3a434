mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn login_issues_a_session_for_a_known_center() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "shop_id": "monzon", "operator": "Ana" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["shop"]["id"], "monzon");
    assert!(body["expires_in"].as_i64().expect("expiry") > 0);

    let token = body["access_token"].as_str().expect("token");
    let (status, me) = app.request("GET", "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["shop_id"], "monzon");
    assert_eq!(me["operator"], "Ana");
}

#[tokio::test]
async fn login_rejects_an_unknown_center() {
    let app = TestApp::spawn().await;
    let (status, body) = app
        .request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "shop_id": "madrid" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error").contains("madrid"));
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = TestApp::spawn().await;

    let (status, _) = app.request("GET", "/api/shops", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("GET", "/api/records", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request("GET", "/api/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn shop_catalog_is_served_to_sessions() {
    let app = TestApp::spawn().await;
    let token = app.login("barbastro").await;

    let (status, shops) = app.request("GET", "/api/shops", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shops.as_array().map(Vec::len), Some(4));

    let (status, services) = app
        .request("GET", "/api/shops/services", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let services = services.as_array().expect("service list");
    assert_eq!(services.len(), 6);
    assert!(services.contains(&json!("Sustitución parabrisas")));
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::spawn().await;
    let (status, body) = app.request("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
