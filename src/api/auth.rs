//! Bearer token authentication middleware for the messaging API.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use super::types::ApiResponse;

/// Shared auth state injected via axum middleware state.
#[derive(Clone)]
pub struct AuthState {
    token: Arc<SecretString>,
}

impl AuthState {
    pub fn new(token: SecretString) -> Self {
        Self {
            token: Arc::new(token),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        bool::from(
            candidate
                .as_bytes()
                .ct_eq(self.token.expose_secret().as_bytes()),
        )
    }
}

/// Auth middleware that validates a bearer token from header or query param.
///
/// Browser WebSocket clients can't set headers, so `?token=xxx` is accepted
/// too.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if let Some(auth_header) = headers.get("authorization")
        && let Ok(value) = auth_header.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
        && auth.matches(token)
    {
        return next.run(request).await;
    }

    // Percent-decode before comparing so encoded tokens still match.
    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some(raw_token) = pair.strip_prefix("token=") {
                let decoded =
                    urlencoding::decode(raw_token).unwrap_or(std::borrow::Cow::Borrowed(raw_token));
                if auth.matches(&decoded) {
                    return next.run(request).await;
                }
            }
        }
    }

    tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::err(
            "unauthorized",
            "Invalid or missing auth token",
        )),
    )
        .into_response()
}
