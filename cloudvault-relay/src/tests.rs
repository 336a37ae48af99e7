//! Router-level tests: real handlers, SQLite in memory, objects in a tempdir.

use crate::config::RelayConfig;
use crate::server::build_router;
use crate::state::AppState;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use cloudvault_core::{LocalObjectStore, SqliteStore};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt; // for `.oneshot()`

const JWT_SECRET: &str = "test-jwt-secret";
const BASE_URL: &str = "http://relay.test";
const MIB: usize = 1024 * 1024;

fn test_config() -> RelayConfig {
    RelayConfig {
        jwt_secret: JWT_SECRET.to_string(),
        presign_secret: "test-presign-secret".to_string(),
        public_base_url: BASE_URL.to_string(),
        presign_batch_size: 2,
        ..Default::default()
    }
}

fn setup() -> (axum::Router, TempDir) {
    let tmp = TempDir::new().unwrap();
    let config = test_config();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let objects = Arc::new(
        LocalObjectStore::new(
            tmp.path(),
            &config.bucket,
            &config.public_base_url,
            config.presign_secret.as_bytes(),
        )
        .unwrap(),
    );
    let state = AppState::with_stores(store, objects, &config);
    (build_router(state, &config), tmp)
}

fn token(owner: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "sub": owner, "exp": exp }),
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn request(method: Method, uri: &str, owner: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("authorization", format!("Bearer {}", token(owner)));
    }
    match body {
        Some(val) => builder.body(Body::from(val.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
    (status, body)
}

fn envelope(tag: &str) -> Value {
    json!({
        "version": 1,
        "kdf": "pbkdf2",
        "kdfParams": { "iterations": 600000, "hash": "sha256", "dkLen": 32 },
        "cipher": "aes-256-gcm",
        "salt": "AAAAAAAAAAAAAAAAAAAAAA==",
        "iv": "AAAAAAAAAAAAAAAA",
        "tag": tag,
        "ciphertext": "e30="
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _tmp) = setup();
    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_missing_or_bad_bearer_is_unauthorized() {
    let (app, _tmp) = setup();
    let (status, _) = send(&app, request(Method::GET, "/api/v1/sync/pull", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::get("/api/v1/sync/pull")
        .header("authorization", "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_sync_flow() {
    let (app, _tmp) = setup();

    let (status, _) = send(&app, request(Method::GET, "/api/v1/sync/pull", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/sync/init",
            Some("u1"),
            Some(json!({ "vaultName": "Personal", "envelope": envelope("AAAA") })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
    assert!(body["updatedAt"].is_string());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/sync/push",
            Some("u1"),
            Some(json!({ "envelope": envelope("BBBB"), "ifMatchVersion": 1, "version": 2 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);

    // Stale writer
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/sync/push",
            Some("u1"),
            Some(json!({ "envelope": envelope("CCCC"), "ifMatchVersion": 1, "version": 2 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Version conflict");

    let (status, body) = send(&app, request(Method::GET, "/api/v1/sync/pull", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);
    assert_eq!(body["envelope"]["tag"], "BBBB");

    // Other owners see nothing
    let (status, _) = send(&app, request(Method::GET, "/api/v1/sync/pull", Some("u2"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_rejects_bad_bodies() {
    let (app, _tmp) = setup();

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/sync/push",
            Some("u1"),
            Some(json!({ "envelope": envelope("AAAA"), "ifMatchVersion": 0, "version": 5 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(Method::POST, "/api/v1/sync/push", Some("u1"), Some(json!({ "bogus": true }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut huge = envelope("AAAA");
    huge["ciphertext"] = Value::String("A".repeat(2 * MIB));
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/sync/push",
            Some("u1"),
            Some(json!({ "envelope": huge, "ifMatchVersion": 0, "version": 1 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_oversized_body_with_content_length_gets_json_error() {
    let (app, _tmp) = setup();

    let mut huge = envelope("AAAA");
    huge["ciphertext"] = Value::String("A".repeat(2 * MIB));
    let body = json!({ "envelope": huge, "ifMatchVersion": 0, "version": 1 }).to_string();
    let req = Request::post("/api/v1/sync/push")
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .header("authorization", format!("Bearer {}", token("u1")))
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
}

fn presigned_path(url: &str) -> String {
    url.strip_prefix(BASE_URL).unwrap().to_string()
}

#[tokio::test]
async fn test_backup_flow() {
    let (app, tmp) = setup();
    let size = 5 * MIB + 10;

    let (status, session) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/init",
            Some("u1"),
            Some(json!({ "snapshotId": "snap-1", "sizeBytes": size, "partSizeBytes": 5 * MIB })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["key"], "vaults/u1/snap-1.enc");
    assert_eq!(session["partCount"], 2);
    assert_eq!(session["maxPartsPerRequest"], 2);
    let key = session["key"].as_str().unwrap().to_string();
    let upload_id = session["uploadId"].as_str().unwrap().to_string();

    let (status, presigned) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/presign-parts",
            Some("u1"),
            Some(json!({ "key": key, "uploadId": upload_id, "partNumbers": [2, 1] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(presigned["expiresInSeconds"], 3600);
    let urls = presigned["urls"].as_array().unwrap();
    assert_eq!(urls[0]["partNumber"], 1);
    assert_eq!(urls[1]["partNumber"], 2);

    let bodies = [vec![1u8; 5 * MIB], vec![2u8; 10]];
    let mut parts = Vec::new();
    for (url, body) in urls.iter().zip(bodies.iter()) {
        let req = Request::put(presigned_path(url["url"].as_str().unwrap()))
            .body(Body::from(body.clone()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let etag = resp.headers()["etag"].to_str().unwrap().to_string();
        parts.push(json!({ "partNumber": url["partNumber"], "etag": etag }));
    }

    let (status, completed) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/complete",
            Some("u1"),
            Some(json!({ "key": key, "uploadId": upload_id, "parts": parts, "expectedPartCount": 2 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", completed);
    assert!(completed["etag"].as_str().unwrap().ends_with("-2"));

    let object = tmp.path().join("cloudvault/objects/vaults/u1/snap-1.enc");
    assert_eq!(std::fs::metadata(object).unwrap().len(), size as u64);
}

#[tokio::test]
async fn test_backup_ownership_and_signatures() {
    let (app, _tmp) = setup();

    let (_, session) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/init",
            Some("u1"),
            Some(json!({ "snapshotId": "snap-1", "sizeBytes": 1024 })),
        ),
    )
    .await;
    let key = session["key"].as_str().unwrap().to_string();
    let upload_id = session["uploadId"].as_str().unwrap().to_string();

    // Another owner cannot touch the key, even with the right upload id
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/presign-parts",
            Some("u2"),
            Some(json!({ "key": key, "uploadId": upload_id, "partNumbers": [1] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, presigned) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/presign-parts",
            Some("u1"),
            Some(json!({ "key": key, "uploadId": upload_id, "partNumbers": [1] })),
        ),
    )
    .await;
    let url = presigned["urls"][0]["url"].as_str().unwrap();
    let tampered = presigned_path(url).replace("partNumber=1", "partNumber=2");
    let req = Request::put(tampered).body(Body::from("x")).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Gaps are rejected before the object store is asked
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/complete",
            Some("u1"),
            Some(json!({
                "key": key,
                "uploadId": upload_id,
                "parts": [{ "partNumber": 2, "etag": "\"abc\"" }],
                "expectedPartCount": 2
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/backup/abort",
            Some("u1"),
            Some(json!({ "key": key, "uploadId": upload_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aborted"], true);
}

#[tokio::test]
async fn test_pairing_flow() {
    let (app, _tmp) = setup();

    let (status, started) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/pairing/start",
            Some("u1"),
            Some(json!({ "deviceName": "Phone", "deviceType": "mobile" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = started["code"].as_str().unwrap().to_string();

    let status_uri = format!("/api/v1/pairing/status?code={}", code);
    let (status, body) = send(&app, request(Method::GET, &status_uri, Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert!(body.get("deviceId").is_none());

    // Codes are scoped to the owner that started them
    let (status, _) = send(
        &app,
        request(Method::POST, "/api/v1/pairing/claim", Some("u2"), Some(json!({ "code": code }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, claimed) = send(
        &app,
        request(Method::POST, "/api/v1/pairing/claim", Some("u1"), Some(json!({ "code": code }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let device_id = claimed["deviceId"].as_str().unwrap().to_string();
    let device_token = claimed["deviceToken"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request(Method::POST, "/api/v1/pairing/claim", Some("u1"), Some(json!({ "code": code }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, request(Method::GET, &status_uri, Some("u1"), None)).await;
    assert_eq!(body["status"], "claimed");
    assert_eq!(body["deviceId"], device_id.as_str());
    assert_eq!(body["deviceType"], "mobile");

    let (status, devices) = send(&app, request(Method::GET, "/api/v1/devices", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(devices.as_array().unwrap().len(), 1);
    assert!(devices[0].get("tokenHash").is_none());

    let heartbeat = |token: &str| {
        Request::post("/api/v1/devices/heartbeat")
            .header("authorization", format!("Device {}", token))
            .body(Body::empty())
            .unwrap()
    };
    let (status, body) = send(&app, heartbeat(&device_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["lastSeenAt"].is_string());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/pairing/revoke",
            Some("u1"),
            Some(json!({ "deviceId": device_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, _) = send(&app, heartbeat(&device_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/pairing/revoke",
            Some("u1"),
            Some(json!({ "deviceId": device_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pairing_status_requires_code() {
    let (app, _tmp) = setup();
    let (status, body) = send(
        &app,
        request(Method::GET, "/api/v1/pairing/status", Some("u1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_pairing_rejects_malformed_code() {
    let (app, _tmp) = setup();
    let (status, _) = send(
        &app,
        request(Method::POST, "/api/v1/pairing/claim", Some("u1"), Some(json!({ "code": "nope" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
