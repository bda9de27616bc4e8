//! Request middleware: bearer authentication, permission gate and deadline

use crate::{
    auth::{jwt::bearer_token, PermissionDenied},
    handlers::response::ApiError,
    AppState,
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use quizbank_core::{ErrorContext, QuizbankError, User};
use std::time::Duration;
use tracing::{debug, warn};

/// Resolve the bearer token to a user and store it in the request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            QuizbankError::authentication("Missing or malformed Authorization header", "auth_middleware")
        })?;

    let user = state.auth.validate_access(token).await?;
    debug!(user_id = user.id, path = %request.uri().path(), "Authenticated request");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Permission required by one endpoint
#[derive(Clone)]
pub struct PermissionGate {
    pub state: AppState,
    pub permission: &'static str,
}

/// Allow the request when any of the caller's roles grants the gate's permission
pub async fn permission_middleware(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request.extensions().get::<User>().ok_or_else(|| {
        QuizbankError::authentication("Authentication required", "permission_gate")
    })?;

    if !gate.state.auth.is_allowed(user, gate.permission).await {
        warn!(user_id = user.id, permission = gate.permission, "Permission denied");
        return Err(PermissionDenied::new(gate.permission, user.id).into());
    }

    Ok(next.run(request).await)
}

/// Fail requests that outlive the configured deadline with 504
pub async fn timeout_middleware(
    State(deadline): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(path = %path, timeout_ms = deadline.as_millis() as u64, "Request deadline exceeded");
            ApiError(QuizbankError::Timeout {
                operation: path,
                duration_ms: deadline.as_millis() as u64,
                context: ErrorContext::new("timeout_middleware"),
            })
            .into_response()
        }
    }
}
