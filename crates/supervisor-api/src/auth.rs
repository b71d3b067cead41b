//! Authentication (§4.I): optional bearer-token JWT (roles
//! `admin > operator > viewer`) and/or a static API-key header.
//!
//! An `async fn middleware(request, next) -> Result<Response, Response>`
//! that extracts from headers, validates, stashes the result in request
//! extensions, then calls `next` — a role check with two possible
//! credential sources.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::ApiState;

pub const HEADER_API_KEY: &str = "x-api-key";

/// §4.I "bearer-token (JWT with roles `admin > operator > viewer`)". Ord is
/// derived in declaration order, so `Role::Viewer < Role::Operator <
/// Role::Admin` falls out of the enum itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

#[derive(Debug, Deserialize)]
struct Claims {
    role: Role,
}

/// Authentication configuration, loaded by `supervisor-server` from
/// file/env. Per §4.I authentication is optional: when neither mechanism is
/// configured every request is treated as `Role::Admin`.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub static_api_key: Option<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.jwt_secret.is_some() || self.static_api_key.is_some()
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<Role, ApiError> {
        if !self.is_enabled() {
            return Ok(Role::Admin);
        }

        if let Some(expected) = &self.static_api_key {
            if let Some(provided) = headers.get(HEADER_API_KEY).and_then(|v| v.to_str().ok()) {
                if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                    return Ok(Role::Admin);
                }
            }
        }

        if let Some(secret) = &self.jwt_secret {
            if let Some(token) = bearer_token(headers) {
                let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
                    .map_err(|_| ApiError::Unauthorized)?
                    .claims;
                return Ok(claims.role);
            }
        }

        Err(ApiError::Unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Constant-time comparison for the static API key; the JWT path gets the
/// equivalent guarantee from `jsonwebtoken`'s own HMAC verification.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn require_min_role(required: Role, state: ApiState, mut request: Request, next: Next) -> Result<Response, Response> {
    let role = state.auth.authenticate(request.headers()).map_err(|e| e.into_response())?;
    if role < required {
        return Err(ApiError::Forbidden.into_response());
    }
    request.extensions_mut().insert(role);
    Ok(next.run(request).await)
}

/// Read endpoints (`GET /v1/status`, `/v1/config`, `/v1/config/history`)
/// require at least `viewer` (§4.I).
pub async fn require_viewer(State(state): State<ApiState>, request: Request, next: Next) -> Result<Response, Response> {
    require_min_role(Role::Viewer, state, request, next).await
}

/// `POST /v1/config`, `/v1/config/validate`, `/v1/control/reload` require at
/// least `operator` (§4.I).
pub async fn require_operator(State(state): State<ApiState>, request: Request, next: Next) -> Result<Response, Response> {
    require_min_role(Role::Operator, state, request, next).await
}

/// `POST /v1/control/restart` requires `admin` (§4.I).
pub async fn require_admin(State(state): State<ApiState>, request: Request, next: Next) -> Result<Response, Response> {
    require_min_role(Role::Admin, state, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_admin_over_operator_over_viewer() {
        assert!(Role::Admin > Role::Operator);
        assert!(Role::Operator > Role::Viewer);
    }

    #[test]
    fn disabled_auth_allows_everything() {
        let config = AuthConfig::default();
        assert!(!config.is_enabled());
        assert_eq!(config.authenticate(&HeaderMap::new()).unwrap(), Role::Admin);
    }

    #[test]
    fn missing_credentials_are_rejected_when_enabled() {
        let config = AuthConfig { jwt_secret: None, static_api_key: Some("secret".to_string()) };
        assert!(matches!(config.authenticate(&HeaderMap::new()), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn matching_static_api_key_authenticates_as_admin() {
        let config = AuthConfig { jwt_secret: None, static_api_key: Some("secret".to_string()) };
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_API_KEY, "secret".parse().unwrap());
        assert_eq!(config.authenticate(&headers).unwrap(), Role::Admin);
    }

    #[test]
    fn mismatched_static_api_key_is_rejected() {
        let config = AuthConfig { jwt_secret: None, static_api_key: Some("secret".to_string()) };
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_API_KEY, "wrong".parse().unwrap());
        assert!(matches!(config.authenticate(&headers), Err(ApiError::Unauthorized)));
    }
}
