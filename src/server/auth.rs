//! Request extractors for the shared secret and the tenant token.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::AppState;
use crate::common::address::valid_token;
use crate::common::AppError;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header selecting the tenant instance.
pub const INSTANCE_TOKEN_HEADER: &str = "x-instance-token";

/// Proof that the caller presented the configured shared secret.
pub struct ApiKey;

/// Validated tenant token from header or `?token=` query.
pub struct InstanceToken(pub String);

/// Like [`InstanceToken`] but absence is not an error; used by `/init`,
/// which also accepts the token in its JSON body.
pub struct MaybeInstanceToken(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing api key header".to_string()))?;

        if provided != state.api_key {
            return Err(AppError::Unauthorized("invalid api key".to_string()));
        }

        Ok(ApiKey)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for InstanceToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| AppError::BadRequest("missing instance token".to_string()))?;

        if !valid_token(&token) {
            return Err(AppError::BadRequest(
                "invalid instance token format".to_string(),
            ));
        }

        Ok(InstanceToken(token))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeInstanceToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        match token_from_parts(parts) {
            Some(token) if !valid_token(&token) => Err(AppError::BadRequest(
                "invalid instance token format".to_string(),
            )),
            token => Ok(MaybeInstanceToken(token)),
        }
    }
}

// Tokens are alphanumeric plus dash/underscore, so the raw query needs
// no percent-decoding.
fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(INSTANCE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
