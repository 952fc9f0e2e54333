use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured API error carried across the HTTP boundary.
///
/// `kind` drives the status code; `message` is human-readable; `field` names
/// the offending request field for validation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    Validation,
    NotFound,
    Provider,
    Storage,
    Cancelled,
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Validation,
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::NotFound,
            message: message.into(),
            field: None,
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Provider,
            message: message.into(),
            field: None,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Storage,
            message: message.into(),
            field: None,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Cancelled,
            message: message.into(),
            field: None,
        }
    }

    /// HTTP status code this error renders as.
    pub fn status_code(&self) -> u16 {
        match self.kind {
            ApiErrorKind::Validation => 400,
            ApiErrorKind::NotFound => 404,
            ApiErrorKind::Provider => 502,
            ApiErrorKind::Storage => 500,
            ApiErrorKind::Cancelled => 499,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
