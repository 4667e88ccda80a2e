//! Authentication middleware for sreq-admin
//!
//! Resolves `Authorization: Bearer <token>` to a [`Caller`] and stores it as
//! a request extension. Role checks happen in the handlers, before any
//! backup file is touched.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sreq_common::api::auth::{parse_bearer, ApiAuthError, Caller};
use tracing::warn;

use crate::{ApiError, AppState};

/// Authentication middleware
///
/// Returns 401 Unauthorized if the token is missing or unknown.
///
/// **Note:** This is applied to protected routes only.
/// Health endpoint (/health) does NOT use this middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized(ApiAuthError::MissingToken.to_string()))?;

    let header = header.to_str().map_err(|_| {
        ApiError::Unauthorized(
            ApiAuthError::MalformedHeader("not valid ASCII".to_string()).to_string(),
        )
    })?;

    let token = parse_bearer(header).map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let caller = state.tokens.authenticate(token).map_err(|e| {
        warn!(path = %request.uri().path(), "Rejected request with unknown token");
        ApiError::Unauthorized(e.to_string())
    })?;

    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Require the administrator role
pub fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.is_admin() {
        Ok(())
    } else {
        warn!(
            username = %caller.username,
            role = %caller.role,
            "Administrative operation denied"
        );
        Err(ApiError::Forbidden(format!(
            "administrator role required (caller '{}' has role '{}')",
            caller.username, caller.role
        )))
    }
}
