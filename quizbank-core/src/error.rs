//! Unified error handling system
//!
//! Structured error types with context, mapped onto the client-facing
//! categories the HTTP layer turns into status codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type QuizbankResult<T> = Result<T, QuizbankError>;

/// Error context providing additional information for debugging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Client-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Timeout,
    Internal,
}

/// Main error type for the quizbank system
#[derive(Error, Debug)]
pub enum QuizbankError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    #[error("Authorization error: {message}")]
    Authorization {
        message: String,
        permission: Option<String>,
        context: ErrorContext,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl QuizbankError {
    pub fn validation(message: impl Into<String>, component: &str) -> Self {
        QuizbankError::Validation {
            message: message.into(),
            field: None,
            context: ErrorContext::new(component),
        }
    }

    pub fn authentication(message: impl Into<String>, component: &str) -> Self {
        QuizbankError::Authentication {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn authorization(permission: &str, component: &str) -> Self {
        QuizbankError::Authorization {
            message: format!("missing permission: {}", permission),
            permission: Some(permission.to_string()),
            context: ErrorContext::new(component),
        }
    }

    pub fn not_found(resource: impl Into<String>, component: &str) -> Self {
        QuizbankError::NotFound {
            resource: resource.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn conflict(message: impl Into<String>, component: &str) -> Self {
        QuizbankError::Conflict {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn internal(message: impl Into<String>, component: &str) -> Self {
        QuizbankError::Internal {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component),
        }
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            QuizbankError::Validation { context, .. } => Some(context),
            QuizbankError::Authentication { context, .. } => Some(context),
            QuizbankError::Authorization { context, .. } => Some(context),
            QuizbankError::NotFound { context, .. } => Some(context),
            QuizbankError::Conflict { context, .. } => Some(context),
            QuizbankError::Storage { context, .. } => Some(context),
            QuizbankError::Config { context, .. } => Some(context),
            QuizbankError::Timeout { context, .. } => Some(context),
            QuizbankError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Category used to pick a status code at the HTTP boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuizbankError::Validation { .. } | QuizbankError::Serialization(_) => {
                ErrorKind::Validation
            }
            QuizbankError::Authentication { .. } => ErrorKind::Authentication,
            QuizbankError::Authorization { .. } => ErrorKind::Authorization,
            QuizbankError::NotFound { .. } => ErrorKind::NotFound,
            QuizbankError::Conflict { .. } => ErrorKind::Conflict,
            QuizbankError::Timeout { .. } => ErrorKind::Timeout,
            QuizbankError::Storage { .. }
            | QuizbankError::Config { .. }
            | QuizbankError::Io(_)
            | QuizbankError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller, rather than the server, caused the error
    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal | ErrorKind::Timeout)
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        if self.is_client_error() {
            warn!(error_id = ?error_id, error = %self, "Request rejected");
        } else {
            error!(error_id = ?error_id, error = %self, "Internal error occurred");
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::QuizbankError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::QuizbankError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::QuizbankError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::QuizbankError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            QuizbankError::validation("bad", "test").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            QuizbankError::authentication("nope", "test").kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            QuizbankError::authorization("roles:read", "test").kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            QuizbankError::not_found("user 7", "test").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            QuizbankError::conflict("dup", "test").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(storage_error!("db down", "test").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_context_builder() {
        let context = ErrorContext::new("store")
            .with_operation("create_user")
            .with_metadata("username", "alice")
            .with_suggestion("retry later");

        assert_eq!(context.component, "store");
        assert_eq!(context.operation.as_deref(), Some("create_user"));
        assert_eq!(context.metadata.get("username").map(String::as_str), Some("alice"));
        assert_eq!(context.recovery_suggestions.len(), 1);
        assert!(!context.error_id.is_empty());
    }

    #[test]
    fn test_client_errors() {
        assert!(QuizbankError::conflict("dup", "test").is_client_error());
        assert!(!QuizbankError::internal("boom", "test").is_client_error());
        let timeout = QuizbankError::Timeout {
            operation: "request".to_string(),
            duration_ms: 10,
            context: ErrorContext::new("test"),
        };
        assert!(!timeout.is_client_error());
    }
}
