use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    InvalidInput,
    TooEarly,
    TooFarAhead,
    UnknownMode,
    Transport,
    MalformedResponse,
    OperationFailed,
    NotFound,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Every rule violation found in one pass over the input.
    pub fn validation(errors: Vec<String>) -> Self {
        Self {
            code: ErrorCode::Validation,
            message: "validation failed".to_string(),
            errors,
        }
    }
}

#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ApiException {
    pub code: ErrorCode,
    pub message: String,
    pub errors: Vec<String>,
}

impl From<ApiException> for ApiError {
    fn from(value: ApiException) -> Self {
        Self {
            code: value.code,
            message: value.message,
            errors: value.errors,
        }
    }
}

impl From<ApiError> for ApiException {
    fn from(value: ApiError) -> Self {
        let message = if value.errors.is_empty() {
            value.message
        } else {
            format!("{}: {}", value.message, value.errors.join("; "))
        };
        Self {
            code: value.code,
            message,
            errors: value.errors,
        }
    }
}
