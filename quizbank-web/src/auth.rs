//! Authentication and authorization
//!
//! Bearer tokens are checked by [`crate::middleware::auth_middleware`], which
//! stores the resolved [`User`] in the request extensions. Handlers read it
//! back through the [`AuthUser`] extractor.

pub mod database;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod policy;
pub mod users;

use crate::handlers::response::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};
use quizbank_core::{ErrorContext, QuizbankError, User};

pub use policy::{PolicyEngine, ADMIN_ROLE};
pub use users::AuthService;

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                ApiError(QuizbankError::authentication(
                    "Authentication required",
                    "auth_extractor",
                ))
            })
    }
}

/// Rejection for a caller none of whose roles grants the permission
#[derive(Debug)]
pub struct PermissionDenied {
    pub required_permission: String,
    pub user_id: i64,
}

impl PermissionDenied {
    pub fn new(required_permission: &str, user_id: i64) -> Self {
        Self {
            required_permission: required_permission.to_string(),
            user_id,
        }
    }
}

impl From<PermissionDenied> for ApiError {
    fn from(denied: PermissionDenied) -> Self {
        ApiError(QuizbankError::Authorization {
            message: format!("Required permission: {}", denied.required_permission),
            context: ErrorContext::new("permission_gate")
                .with_metadata("user_id", &denied.user_id.to_string()),
            permission: Some(denied.required_permission),
        })
    }
}
