//! Custom Axum extractors for request credentials.
//!
//! Provides:
//! - `ViewerTokens`: optional owner bearer and guest token, never rejects
//! - `GuestToken`: optional `X-Guest-Token`; the core decides whether it is required
//! - `OwnerAuth`: verified owner id from `Authorization: Bearer ...`

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use std::convert::Infallible;
use uuid::Uuid;
use wishlist_core::{CoreError, Credentials};
use wishlist_sdk::objects::GUEST_TOKEN_HEADER;

use crate::api::error::ApiError;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn guest_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(GUEST_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Whatever credentials a public read carries.
#[derive(Debug, Default)]
pub struct ViewerTokens {
    pub owner: Option<String>,
    pub guest: Option<String>,
}

impl ViewerTokens {
    pub fn credentials(&self) -> Credentials<'_> {
        Credentials {
            owner_token: self.owner.as_deref(),
            guest_token: self.guest.as_deref(),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ViewerTokens {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ViewerTokens {
            owner: bearer_token(&parts.headers),
            guest: guest_token(&parts.headers),
        })
    }
}

pub struct GuestToken(pub Option<String>);

impl GuestToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for GuestToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(GuestToken(guest_token(&parts.headers)))
    }
}

/// The authenticated owner of a lifecycle request.
pub struct OwnerAuth(pub Uuid);

impl FromRequestParts<AppState> for OwnerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| CoreError::Auth("missing bearer token".to_string()))?;
        Ok(OwnerAuth(state.core.authenticate_owner(&token)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_blank_guest_token_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(GUEST_TOKEN_HEADER, HeaderValue::from_static("  "));
        assert_eq!(guest_token(&headers), None);

        headers.insert(GUEST_TOKEN_HEADER, HeaderValue::from_static("guest.token"));
        assert_eq!(guest_token(&headers).as_deref(), Some("guest.token"));
    }
}
