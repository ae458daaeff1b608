//! Attendance Guard
//!
//! Layered verification server for school attendance. A check-in or
//! check-out is accepted only after location, network, device and
//! behavioural checks pass and the face check confirms the user.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ATTENDANCE GUARD                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌────────────────────┐  ┌─────────────────┐  │
//! │  │  API      │  │  Validation        │  │  Face Provider  │  │
//! │  │  (Axum)   │─▶│  Pipeline          │─▶│  Chain          │  │
//! │  │  JWT auth │  │  (proceed token)   │  │  (fallback/race)│  │
//! │  └───────────┘  └─────────┬──────────┘  └────────┬────────┘  │
//! │                           ▼                      ▼           │
//! │                ┌──────────────────────────────────────┐      │
//! │                │ AttendanceStore (PostgreSQL/memory)  │      │
//! │                └──────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod face;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod service;
pub mod store;
pub mod token;
pub mod validation;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};

use config::Config;
use face::FaceVerificationChain;
use service::AttendanceService;
use store::AttendanceStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub service: Arc<AttendanceService>,
    pub store_kind: &'static str,
    pub face_providers: Vec<String>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn AttendanceStore>,
        store_kind: &'static str,
        chain: FaceVerificationChain,
    ) -> Self {
        let face_providers = chain.provider_names();
        let service = Arc::new(AttendanceService::new(store, chain, &config));
        Self { config, service, store_kind, face_providers }
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check));

    // Attendance routes (user JWT auth)
    let attendance_routes = Router::new()
        .route("/api/v1/attendance/validate", post(handlers::attendance::validate))
        .route("/api/v1/attendance/verify-face", post(handlers::attendance::verify_face))
        .route("/api/v1/attendance/today", get(handlers::attendance::today))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_user_auth
        ));

    // Admin routes (user JWT auth + admin role)
    let admin_routes = Router::new()
        .route("/api/v1/admin/location", put(handlers::admin::put_location))
        .route(
            "/api/v1/admin/biometrics/:user_id",
            put(handlers::admin::put_biometric).delete(handlers::admin::delete_biometric),
        )
        .route("/api/v1/admin/security-events", get(handlers::admin::security_events))
        .layer(axum_middleware::from_fn(middleware::auth::require_admin))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_user_auth
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(attendance_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
