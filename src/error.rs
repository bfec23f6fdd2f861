// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Which write of a submission failed.
///
/// Record creation and the counter increment are separate remote calls, so
/// the caller must be able to tell them apart when deciding what to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceStage {
    RecordCreation,
    CounterIncrement,
}

impl fmt::Display for PersistenceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceStage::RecordCreation => write!(f, "record creation"),
            PersistenceStage::CounterIncrement => write!(f, "counter increment"),
        }
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Incomplete or malformed input. Blocks advancement, never sent to a backend.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Insufficient balance: {required} coins required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },

    /// The operation is not allowed in the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Camera or geolocation unavailable. Recoverable by manual entry or upload.
    #[error("Device error: {0}")]
    Device(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Failed during {stage}: {message}")]
    Persistence {
        stage: PersistenceStage,
        message: String,
    },

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn record_creation(message: impl Into<String>) -> Self {
        AppError::Persistence {
            stage: PersistenceStage::RecordCreation,
            message: message.into(),
        }
    }

    pub fn counter_increment(message: impl Into<String>) -> Self {
        AppError::Persistence {
            stage: PersistenceStage::CounterIncrement,
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Device(_)
                | AppError::Upload(_)
                | AppError::Persistence { .. }
                | AppError::Verification(_)
                | AppError::Database(_)
        )
    }

    /// Whether this error is a client-side validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::InsufficientBalance { .. }
        )
    }

    /// Human-readable message suitable for a toast in the UI.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized | AppError::InvalidToken => {
                "Please sign in to continue.".to_string()
            }
            AppError::InsufficientBalance { .. } => {
                "You don't have enough coins to redeem this reward.".to_string()
            }
            AppError::Device(msg) => format!("{}. Please enter it manually or upload a photo.", msg),
            AppError::Upload(_) => "Failed to upload image. Please try again.".to_string(),
            AppError::Persistence {
                stage: PersistenceStage::RecordCreation,
                ..
            } => "Failed to record tree planting. Please try again.".to_string(),
            AppError::Persistence {
                stage: PersistenceStage::CounterIncrement,
                ..
            } => "Your tree was recorded but your coins could not be updated yet. Please try again."
                .to_string(),
            AppError::Verification(_) => "Verification failed. Please try again.".to_string(),
            AppError::Database(_) | AppError::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            }
            AppError::InsufficientBalance { .. } => (
                StatusCode::BAD_REQUEST,
                "insufficient_balance",
                Some(self.to_string()),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "invalid_state", Some(msg.clone())),
            AppError::Device(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "device_error",
                Some(msg.clone()),
            ),
            AppError::Upload(msg) => {
                tracing::warn!(error = %msg, "Upload error");
                (StatusCode::BAD_GATEWAY, "upload_error", None)
            }
            AppError::Persistence { stage, message } => {
                tracing::error!(%stage, error = %message, "Persistence error");
                let code = match stage {
                    PersistenceStage::RecordCreation => "record_creation_failed",
                    PersistenceStage::CounterIncrement => "counter_increment_failed",
                };
                (StatusCode::SERVICE_UNAVAILABLE, code, None)
            }
            AppError::Verification(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "verification_failed",
                Some(msg.clone()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message: self.user_message(),
            retryable: self.is_retryable(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
