use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::auth::validate_jwt;
use crate::config::SecurityConfig;
use crate::state::AppState;

use super::AccessError;

/// Caller identity behind a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// The one credential a request presents. An API key header wins over
/// any session that might also be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Session(Identity),
}

impl Credential {
    pub fn from_headers(headers: &HeaderMap, security: &SecurityConfig) -> Result<Self, AccessError> {
        let api_key = headers
            .get(security.api_key_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(key) = api_key {
            return Ok(Credential::ApiKey(key.to_string()));
        }

        let token = bearer_token(headers)?
            .or_else(|| cookie_value(headers, &security.session_cookie))
            .ok_or_else(|| AccessError::Unauthenticated("Missing session".to_string()))?;

        let claims = validate_jwt(&token, &security.jwt_secret).map_err(|e| {
            tracing::warn!("Session rejected: {}", e);
            AccessError::Unauthenticated("Invalid session".to_string())
        })?;

        Ok(Credential::Session(Identity { user_id: claims.sub, email: claims.email }))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AccessError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AccessError::Unauthenticated("Invalid Authorization header format".to_string()))?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        _ => Err(AccessError::Unauthenticated(
            "Authorization header must use Bearer token format".to_string(),
        )),
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Credential
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AccessError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Credential::from_headers(&parts.headers, &state.config.security)
    }
}
