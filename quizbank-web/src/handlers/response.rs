//! JSON envelopes shared by every endpoint

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use quizbank_core::{ErrorKind, PageMeta, QuizbankError};
use serde::Serialize;
use serde_json::json;

/// Success envelope: `{"status": "success", "data": ..., "meta": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
            meta: None,
        })
    }

    pub fn paged(data: T, meta: PageMeta) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
            meta: Some(meta),
        })
    }

    pub fn created(data: T) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Self::success(data))
    }
}

/// Error returned by handlers; rendered as `{"status": "error", "message": ...}`
#[derive(Debug)]
pub struct ApiError(pub QuizbankError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<QuizbankError> for ApiError {
    fn from(error: QuizbankError) -> Self {
        Self(error)
    }
}

/// JSON request body; malformed or incomplete bodies become a 400 in the error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(QuizbankError::validation(rejection.body_text(), "request_body"))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match &self.0 {
            QuizbankError::Validation { message, .. }
            | QuizbankError::Authentication { message, .. }
            | QuizbankError::Authorization { message, .. }
            | QuizbankError::Conflict { message, .. } => message.clone(),
            QuizbankError::NotFound { resource, .. } => format!("Not found: {}", resource),
            QuizbankError::Serialization(e) => format!("Invalid JSON: {}", e),
            QuizbankError::Timeout { .. } => "Request timed out".to_string(),
            other => match other.context() {
                Some(context) => format!("Internal server error (error id: {})", context.error_id),
                None => "Internal server error".to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.log();
        let status = self.status_code();
        let body = json!({
            "status": "error",
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}
