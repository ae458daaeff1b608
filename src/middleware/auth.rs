//! Authentication middleware
//!
//! Sessions are issued by the school's identity service and signed with the
//! shared `JWT_SECRET`. This server only verifies them.

use axum::{
    extract::{State, Request},
    middleware::Next,
    response::Response,
    http::{header::AUTHORIZATION, HeaderMap},
};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::{AppState, AppError};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // User ID
    pub role: String,     // student | teacher | admin
    pub exp: usize,       // Expiration timestamp
    pub iat: usize,       // Issued at
}

/// User context extracted from JWT
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub role: String,
}

impl UserContext {
    /// Check if user has admin role
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Middleware: Require user JWT authentication
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default()
    )?;

    let claims = token_data.claims;

    let user_ctx = UserContext {
        user_id: Uuid::parse_str(&claims.sub).map_err(|_| AppError::TokenInvalid)?,
        role: claims.role,
    };

    req.extensions_mut().insert(user_ctx);

    Ok(next.run(req).await)
}

/// Middleware: Require admin role (layered after `require_user_auth`)
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let user = req.extensions()
        .get::<UserContext>()
        .ok_or(AppError::Unauthorized)?;

    if !user.is_admin() {
        tracing::warn!("Admin required but user {} has role '{}'", user.user_id, user.role);
        return Err(AppError::Forbidden);
    }

    Ok(next.run(req).await)
}

/// Client address as seen by the server.
///
/// With no trusted proxies this is the TCP peer. Behind `trusted_hops`
/// proxies it is the X-Forwarded-For entry that many places from the right;
/// everything left of it was written by the client.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted_hops: usize) -> Option<String> {
    if trusted_hops == 0 {
        return peer.map(|ip| ip.to_string());
    }

    let forwarded: Vec<&str> = headers
        .get_all("X-Forwarded-For")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if forwarded.len() < trusted_hops {
        tracing::warn!(
            "X-Forwarded-For has {} entries, expected at least {}",
            forwarded.len(),
            trusted_hops
        );
        return None;
    }

    forwarded[forwarded.len() - trusted_hops]
        .parse::<IpAddr>()
        .ok()
        .map(|ip| ip.to_string())
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let auth_header = req.headers()
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<UserContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<IpAddr> {
        Some(IpAddr::from([8, 8, 8, 8]))
    }

    #[test]
    fn test_client_ip_ignores_forwarded_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("192.168.1.23"));
        assert_eq!(client_ip(&headers, peer(), 0).as_deref(), Some("8.8.8.8"));
        assert!(client_ip(&headers, None, 0).is_none());
    }

    #[test]
    fn test_client_ip_counts_from_the_right() {
        // Client forged the first entry; the proxy appended what it saw
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("192.168.1.23, 8.8.4.4"));
        assert_eq!(client_ip(&headers, peer(), 1).as_deref(), Some("8.8.4.4"));
        assert_eq!(client_ip(&headers, peer(), 2).as_deref(), Some("192.168.1.23"));
    }

    #[test]
    fn test_client_ip_short_or_garbage_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("not-an-ip"));
        assert!(client_ip(&headers, peer(), 1).is_none());
        assert!(client_ip(&headers, peer(), 2).is_none());
        assert!(client_ip(&HeaderMap::new(), peer(), 1).is_none());
    }
}
