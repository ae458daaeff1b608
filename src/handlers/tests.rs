use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::config::Config;
use crate::face::{CapturedPhoto, ChainMode, FaceProvider, FaceVerificationChain, FaceVerificationResult, ProviderError};
use crate::middleware::auth::Claims;
use crate::store::MemoryStore;
use crate::{create_router, AppState};

struct AlwaysMatch;

#[async_trait]
impl FaceProvider for AlwaysMatch {
    fn name(&self) -> &str {
        "always-match"
    }

    fn available(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _captured: &CapturedPhoto,
        _reference_url: &str,
        _timeout: Duration,
    ) -> Result<FaceVerificationResult, ProviderError> {
        Ok(FaceVerificationResult {
            success: true,
            face_detected: true,
            match_score: 0.95,
            is_live: true,
            is_fake: false,
            confidence: 0.95,
            provider_name: "always-match".to_string(),
            reasoning: None,
        })
    }
}

fn app() -> Router {
    app_with(Config::for_tests())
}

fn app_with(config: Config) -> Router {
    let chain = FaceVerificationChain::new(ChainMode::Sequential)
        .with_provider(Arc::new(AlwaysMatch), Duration::from_secs(1));
    let state = AppState::new(config, Arc::new(MemoryStore::new()), "memory", chain);
    create_router(state)
}

fn session(user_id: Uuid, role: &str) -> String {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: now + 3600,
        iat: now,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap();
    format!("Bearer {}", token)
}

/// On-campus peer address
const CAMPUS_PEER: [u8; 4] = [192, 168, 1, 23];

async fn send(app: &Router, method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    send_from(app, CAMPUS_PEER, None, method, uri, auth, body).await
}

async fn send_from(
    app: &Router,
    peer: [u8; 4],
    forwarded_for: Option<&str>,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from((peer, 50_000))));
    if let Some(xff) = forwarded_for {
        builder = builder.header("X-Forwarded-For", xff);
    }
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

async fn provision(app: &Router, admin: &str, student: Uuid) {
    let (status, _) = send(app, Method::PUT, "/api/v1/admin/location", Some(admin), Some(json!({
        "name": "SMK Negeri 1",
        "reference_latitude": -6.2001,
        "reference_longitude": 106.8167,
        "radius_meters": 100.0,
        "allowed_ssids": ["SMK-WIFI"],
        "allowed_ip_ranges": ["192.168.1.0/24"]
    }))).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/v1/admin/biometrics/{}", student);
    let (status, body) = send(app, Method::PUT, &uri, Some(admin), Some(json!({
        "fingerprint_hash": "device-hash-1",
        "reference_photo_url": "https://cdn.example.com/ref/student.jpg"
    }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("reference_fingerprint_hash").is_none());
}

fn evidence(user_id: Uuid, fingerprint: &str) -> Value {
    json!({
        "userId": user_id,
        "latitude": -6.2000,
        "longitude": 106.8166,
        "fingerprintHash": fingerprint,
        "timestampMillis": Utc::now().timestamp_millis()
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["face_providers"][0], "always-match");
}

#[tokio::test]
async fn test_attendance_requires_session() {
    let app = app();
    let user = Uuid::new_v4();

    let (status, _) = send(&app, Method::POST, "/api/v1/attendance/validate", None, Some(evidence(user, "x"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/v1/attendance/today", Some("Bearer not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = app();
    let student = session(Uuid::new_v4(), "student");

    let (status, _) = send(&app, Method::GET, "/api/v1/admin/security-events", Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_evidence_is_bad_request() {
    let app = app();
    let user = Uuid::new_v4();
    let auth = session(user, "student");

    let mut body = evidence(user, "device-hash-1");
    body["latitude"] = json!(123.0);
    let (status, _) = send(&app, Method::POST, "/api/v1/attendance/validate", Some(&auth), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_location_fails_closed() {
    let app = app();
    let user = Uuid::new_v4();
    let auth = session(user, "student");

    let (status, body) = send(&app, Method::POST, "/api/v1/attendance/validate", Some(&auth), Some(evidence(user, "x"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["violations"][0], "LOCATION_CONFIG_MISSING");
    assert_eq!(body["action"], "CONTACT_ADMIN");
}

#[tokio::test]
async fn test_validate_then_verify_face_records_check_in() {
    let app = app();
    let admin = session(Uuid::new_v4(), "admin");
    let user = Uuid::new_v4();
    let auth = session(user, "student");
    provision(&app, &admin, user).await;

    // No SSID in the evidence; the peer address matches the allowed range
    let (status, body) = send(&app, Method::POST, "/api/v1/attendance/validate", Some(&auth), Some(evidence(user, "device-hash-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true, "unexpected result: {}", body);
    assert_eq!(body["action"], "PROCEED_PHOTO");
    assert_eq!(body["data"]["attendanceType"], "check-in");
    assert_eq!(body["data"]["networkSignature"], "ip:192.168.1.0/24");
    let token = body["data"]["proceedToken"].as_str().unwrap().to_string();

    let photo = STANDARD.encode(b"\xff\xd8\xff\xe0 jpeg bytes");
    let (status, body) = send(&app, Method::POST, "/api/v1/attendance/verify-face", Some(&auth), Some(json!({
        "userId": user,
        "photo": photo,
        "proceedToken": token
    }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true, "unexpected result: {}", body);
    assert_eq!(body["data"]["provider"], "always-match");

    let (status, body) = send(&app, Method::GET, "/api/v1/attendance/today", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CHECKED_IN");
    assert!(body["record"]["check_in_time"].is_string());
}

#[tokio::test]
async fn test_fingerprint_mismatch_is_visible_to_admin() {
    let app = app();
    let admin = session(Uuid::new_v4(), "admin");
    let user = Uuid::new_v4();
    let auth = session(user, "student");
    provision(&app, &admin, user).await;

    let (_, body) = send(&app, Method::POST, "/api/v1/attendance/validate", Some(&auth), Some(evidence(user, "other-device"))).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["violations"][0], "FINGERPRINT_MISMATCH");
    assert_eq!(body["severity"], "HIGH");

    let mut events = Vec::new();
    for _ in 0..50 {
        let (status, body) = send(&app, Method::GET, "/api/v1/admin/security-events?limit=10", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        events = body.as_array().cloned().unwrap_or_default();
        if !events.is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    tokio_test::assert_ok!(events.first().ok_or("no security events"));
    assert_eq!(events[0]["event_type"], "FINGERPRINT_MISMATCH");
    assert_eq!(events[0]["user_id"], json!(user));
}

#[tokio::test]
async fn test_delete_unknown_biometric_is_not_found() {
    let app = app();
    let admin = session(Uuid::new_v4(), "admin");

    let uri = format!("/api/v1/admin/biometrics/{}", Uuid::new_v4());
    let (status, body) = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_body_ip_and_forged_forwarded_for_are_ignored() {
    let app = app();
    let admin = session(Uuid::new_v4(), "admin");
    let user = Uuid::new_v4();
    let auth = session(user, "student");
    provision(&app, &admin, user).await;

    let mut body = evidence(user, "device-hash-1");
    body["ipAddress"] = json!("192.168.1.99");
    let (status, body) = send_from(
        &app,
        [8, 8, 8, 8],
        Some("192.168.1.99"),
        Method::POST,
        "/api/v1/attendance/validate",
        Some(&auth),
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false, "unexpected result: {}", body);
    assert_eq!(body["violations"][0], "NETWORK_MISMATCH");
}

#[tokio::test]
async fn test_trusted_proxy_uses_rightmost_forwarded_hop() {
    let mut config = Config::for_tests();
    config.trusted_proxy_hops = 1;
    let app = app_with(config);
    let admin = session(Uuid::new_v4(), "admin");
    let user = Uuid::new_v4();
    let auth = session(user, "student");
    provision(&app, &admin, user).await;

    // Client-written entry on the left, proxy-observed address on the right
    let (_, body) = send_from(
        &app,
        [10, 0, 0, 2],
        Some("192.168.1.99, 8.8.8.8"),
        Method::POST,
        "/api/v1/attendance/validate",
        Some(&auth),
        Some(evidence(user, "device-hash-1")),
    )
    .await;
    assert_eq!(body["violations"][0], "NETWORK_MISMATCH");

    let (_, body) = send_from(
        &app,
        [10, 0, 0, 2],
        Some("8.8.8.8, 192.168.1.40"),
        Method::POST,
        "/api/v1/attendance/validate",
        Some(&auth),
        Some(evidence(user, "device-hash-1")),
    )
    .await;
    assert_eq!(body["success"], true, "unexpected result: {}", body);
    assert_eq!(body["data"]["networkSignature"], "ip:192.168.1.0/24");
}
