// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use treequest::error::{AppError, PersistenceStage};

async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[test]
fn test_retryable_errors() {
    assert!(AppError::Device("No camera".to_string()).is_retryable());
    assert!(AppError::Upload("timeout".to_string()).is_retryable());
    assert!(AppError::record_creation("unavailable").is_retryable());
    assert!(AppError::counter_increment("unavailable").is_retryable());
    assert!(AppError::Verification("blurry".to_string()).is_retryable());
    assert!(AppError::Database("unavailable".to_string()).is_retryable());
}

#[test]
fn test_non_retryable_errors() {
    assert!(!AppError::Validation("Species is required".to_string()).is_retryable());
    assert!(!AppError::InsufficientBalance {
        required: 250,
        available: 50
    }
    .is_retryable());
    assert!(!AppError::Conflict("Already committed".to_string()).is_retryable());
    assert!(!AppError::NotFound("Reward x".to_string()).is_retryable());
    assert!(!AppError::Unauthorized.is_retryable());
}

#[test]
fn test_validation_classification() {
    assert!(AppError::Validation("x".to_string()).is_validation());
    assert!(AppError::InsufficientBalance {
        required: 1,
        available: 0
    }
    .is_validation());
    assert!(!AppError::Upload("x".to_string()).is_validation());
}

#[test]
fn test_persistence_stage_in_message() {
    let err = AppError::counter_increment("rpc timeout");
    assert!(matches!(
        err,
        AppError::Persistence {
            stage: PersistenceStage::CounterIncrement,
            ..
        }
    ));
    assert_eq!(
        err.to_string(),
        "Failed during counter increment: rpc timeout"
    );
}

#[test]
fn test_user_messages_hide_internals() {
    let msg = AppError::Database("grpc status 14 at 10.0.0.3".to_string()).user_message();
    assert!(!msg.contains("10.0.0.3"));

    let msg = AppError::Device("Location unavailable".to_string()).user_message();
    assert!(msg.starts_with("Location unavailable"));
    assert!(msg.contains("manually"));
}

#[tokio::test]
async fn test_insufficient_balance_response() {
    let (status, json) = body_json(AppError::InsufficientBalance {
        required: 250,
        available: 50,
    })
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "insufficient_balance");
    assert_eq!(json["retryable"], false);
    assert!(json["details"].as_str().unwrap().contains("250"));
}

#[tokio::test]
async fn test_persistence_response_codes() {
    let (status, json) = body_json(AppError::record_creation("down")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "record_creation_failed");
    assert_eq!(json["retryable"], true);
    assert!(json.get("details").is_none());

    let (_, json) = body_json(AppError::counter_increment("down")).await;
    assert_eq!(json["error"], "counter_increment_failed");
}

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
        (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
        (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
        (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
        (AppError::Conflict("x".into()), StatusCode::CONFLICT),
        (AppError::Device("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
        (AppError::Upload("x".into()), StatusCode::BAD_GATEWAY),
        (AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (err, expected) in cases {
        let label = err.to_string();
        assert_eq!(err.into_response().status(), expected, "{}", label);
    }
}
