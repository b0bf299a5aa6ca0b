use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::ApiState;
use crate::error::ArbiterError;

/// Header carrying the shared arbiter secret.
pub const AUTH_HEADER: &str = "pjx-arbiterauth";

/// Reject any request whose auth header does not match the configured key.
pub async fn require_auth(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key == state.auth_key.as_ref());

    if !authorized {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected request with missing or wrong auth key"
        );
        return ArbiterError::Unauthorized.into_response();
    }

    next.run(request).await
}
