use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use keyserver::extractor::{AdminSecret, ADMIN_SECRET_HEADER};
use keyserver::interactions::InteractionSettings;
use keyserver::keys::{FileKeyStore, KeyService, LifecycleConfig, MemoryKeyStore};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "s3cret";

fn app_with(service: KeyService) -> Router {
    keyserver::app(
        Arc::new(service),
        AdminSecret(Some(SECRET.to_string())),
        Arc::new(InteractionSettings::default()),
    )
}

fn memory_app() -> Router {
    app_with(KeyService::new(
        MemoryKeyStore::new(),
        LifecycleConfig::default(),
    ))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn admin_post(uri: &str, secret: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(ADMIN_SECRET_HEADER, secret)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn generate(app: &Router, body: Value) -> String {
    let (status, value) = send(app, admin_post("/admin/generate", SECRET, body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["success"], true);
    value["key"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn generate_requires_admin_secret() {
    let app = memory_app();
    let (status, value) = send(
        &app,
        admin_post("/admin/generate", "wrong", json!({"duration": "1d"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(value, json!({"error": "unauthorized"}));

    let unconfigured = keyserver::app(
        Arc::new(KeyService::new(
            MemoryKeyStore::new(),
            LifecycleConfig::default(),
        )),
        AdminSecret(None),
        Arc::new(InteractionSettings::default()),
    );
    let (status, _) = send(
        &unconfigured,
        admin_post("/admin/generate", "", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_reports_expiry() {
    let app = memory_app();
    let (status, value) = send(
        &app,
        admin_post("/admin/generate", SECRET, json!({"duration": "7d"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["key"].as_str().unwrap().len(), 16);
    assert!(value["expires"].as_i64().is_some());

    let (_, lifetime) = send(
        &app,
        admin_post("/admin/generate", SECRET, json!({"duration": "lifetime"})),
    )
    .await;
    assert!(lifetime["expires"].is_null());

    let (status, _) = send(
        &app,
        admin_post("/admin/generate", SECRET, json!({"duration": "1y"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn raw_generate(content_type: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/admin/generate")
        .header(ADMIN_SECRET_HEADER, SECRET);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn generate_rejects_bodies_it_cannot_read() {
    let service = Arc::new(KeyService::new(
        MemoryKeyStore::new(),
        LifecycleConfig::default(),
    ));
    let app = keyserver::app(
        service.clone(),
        AdminSecret(Some(SECRET.to_string())),
        Arc::new(InteractionSettings::default()),
    );

    let unreadable = [
        (Some("application/x-www-form-urlencoded"), r#"{"duration":"1d"}"#),
        (Some("text/plain"), r#"{"duration":"1d"}"#),
        (None, r#"{"duration":"1d"}"#),
        (Some("application/json"), r#"{"duration":"1d""#),
        (Some("application/json"), r#"{"duration":7}"#),
        (Some("application/json"), r#"["1d"]"#),
    ];
    for (content_type, body) in unreadable {
        let (status, value) = send(&app, raw_generate(content_type, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{content_type:?} {body}");
        assert!(value["error"].as_str().unwrap().starts_with("bad request"));
    }
    assert!(service.list_all().await.is_empty());

    let (status, value) = send(&app, raw_generate(None, "")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(value["expires"].is_null());

    let (status, value) = send(
        &app,
        raw_generate(Some("application/json; charset=utf-8"), r#"{"duration":"1d"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(value["expires"].as_i64().is_some());
    assert_eq!(service.list_all().await.len(), 2);
}

#[tokio::test]
async fn validate_binds_then_rejects_other_hardware() {
    let app = memory_app();
    let key = generate(&app, json!({"duration": "lifetime", "userid": "42"})).await;

    let (status, value) = send(
        &app,
        get(&format!("/validate?key={key}&userid=42&hwid=pc-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({"valid": true, "hwid": "pc-1"}));

    let (_, value) = send(
        &app,
        get(&format!("/validate?key={key}&userid=42&hwid=pc-2")),
    )
    .await;
    assert_eq!(value, json!({"valid": false, "reason": "hwid_mismatch"}));

    let (_, value) = send(
        &app,
        get(&format!("/validate?key={key}&userid=7&hwid=pc-1")),
    )
    .await;
    assert_eq!(value["reason"], "wrong_owner");
}

#[tokio::test]
async fn validate_reports_missing_and_unknown() {
    let app = memory_app();
    let (status, value) = send(&app, get("/validate?key=ABC&userid=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({"valid": false, "reason": "missing_params"}));

    let (_, value) = send(&app, get("/validate?key=ABC&userid=1&hwid=")).await;
    assert_eq!(value["reason"], "missing_params");

    let (_, value) = send(&app, get("/validate?key=ABC&userid=1&hwid=x")).await;
    assert_eq!(value, json!({"valid": false, "reason": "not_found"}));
}

#[tokio::test]
async fn admin_listing_and_deletion() {
    let app = memory_app();
    let owned = generate(&app, json!({"duration": "1d", "userid": "42"})).await;
    generate(&app, json!({})).await;

    let list = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(ADMIN_SECRET_HEADER, SECRET)
            .body(Body::empty())
            .unwrap()
    };
    let (_, all) = send(&app, list("/admin/keys")).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, mine) = send(&app, list("/admin/keys?userid=42")).await;
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["key"], owned.as_str());
    assert_eq!(mine[0]["used"], false);
    assert!(mine[0]["hwid"].is_null());

    let remove = |uri: String| {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(ADMIN_SECRET_HEADER, SECRET)
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, remove(format!("/admin/keys/{owned}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, value) = send(&app, remove(format!("/admin/keys/{owned}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value, json!({"error": "not found"}));

    let (_, value) = send(
        &app,
        get(&format!("/validate?key={owned}&userid=42&hwid=pc")),
    )
    .await;
    assert_eq!(value["reason"], "not_found");
}

#[tokio::test]
async fn hardware_binding_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");

    let store = FileKeyStore::open(&path).await.unwrap();
    let app = app_with(KeyService::new(store, LifecycleConfig::default()));
    let key = generate(&app, json!({"duration": "lifetime", "userid": "42"})).await;
    let (_, value) = send(
        &app,
        get(&format!("/validate?key={key}&userid=42&hwid=pc-1")),
    )
    .await;
    assert_eq!(value["valid"], true);

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        raw[key.as_str()],
        json!({"expires": null, "used": false, "owner": "42", "hwid": "pc-1"})
    );

    let reopened = FileKeyStore::open(&path).await.unwrap();
    let app = app_with(KeyService::new(reopened, LifecycleConfig::default()));
    let (_, value) = send(
        &app,
        get(&format!("/validate?key={key}&userid=42&hwid=pc-2")),
    )
    .await;
    assert_eq!(value["reason"], "hwid_mismatch");
}
