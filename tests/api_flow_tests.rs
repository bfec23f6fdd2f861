// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end HTTP tests over the in-memory backend.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use treequest::backend::BackendClient;
use treequest::config::Config;
use treequest::middleware::auth::SERVICE_ROLE;

mod common;
use common::{
    create_test_app, create_test_app_with, create_test_jwt, data_url, profile_with_coins,
    RejectingLiveness, JPEG_BYTES, PNG_BYTES,
};

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Drive a new workflow through to ready_to_commit. Returns its id.
async fn ready_workflow(app: &Router, token: &str) -> String {
    let (status, wf) = send(app, "POST", "/api/plantings", token, None).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = wf["id"].as_str().unwrap().to_string();
    let base = format!("/api/plantings/{}", id);

    let (status, _) = send(
        app,
        "PUT",
        &format!("{}/details", base),
        token,
        Some(json!({ "species": "oak", "location": "Central Park" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, wf) = send(app, "POST", &format!("{}/advance", base), token, None).await;
    assert_eq!(wf["step"], "tree_photo");

    let photo = json!({ "data_url": data_url("image/png", PNG_BYTES) });
    let (status, wf) = send(app, "PUT", &format!("{}/photo", base), token, Some(photo.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wf["has_tree_photo"], true);

    let (_, wf) = send(app, "POST", &format!("{}/advance", base), token, None).await;
    assert_eq!(wf["step"], "selfie_verification");
    send(app, "PUT", &format!("{}/photo", base), token, Some(photo)).await;
    let (_, wf) = send(app, "POST", &format!("{}/advance", base), token, None).await;
    assert_eq!(wf["step"], "liveness_check");

    let (status, wf) = send(app, "POST", &format!("{}/liveness", base), token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wf["step"], "ready_to_commit");
    id
}

#[tokio::test]
async fn test_me_creates_profile_on_first_call() {
    let (app, _, backend) = create_test_app();
    let token = create_test_jwt("newcomer", None);

    let (status, me) = send(&app, "GET", "/api/me", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], "newcomer");
    assert_eq!(me["trees"], 0);
    assert_eq!(me["coins"], 0);

    assert!(backend.get_profile("newcomer").await.unwrap().is_some());

    // Second call reuses the same profile
    let (status, again) = send(&app, "GET", "/api/me", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["created_at"], me["created_at"]);
}

#[tokio::test]
async fn test_planting_as_first_call_creates_profile() {
    let (app, _, backend) = create_test_app();
    let token = create_test_jwt("straight-to-planting", None);

    // No /api/me first
    let id = ready_workflow(&app, &token).await;
    assert!(backend
        .get_profile("straight-to-planting")
        .await
        .unwrap()
        .is_some());

    let (status, receipt) = send(
        &app,
        "POST",
        &format!("/api/plantings/{}/commit", id),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["credit"]["applied"], true);
    assert_eq!(receipt["credit"]["trees"], 1);
}

#[tokio::test]
async fn test_full_planting_flow_credits_once() {
    let (app, state, backend) = create_test_app();
    let token = create_test_jwt("planter", None);
    send(&app, "GET", "/api/me", &token, None).await;

    let id = ready_workflow(&app, &token).await;
    let (status, receipt) = send(
        &app,
        "POST",
        &format!("/api/plantings/{}/commit", id),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["created"], true);
    assert_eq!(receipt["credit"]["applied"], true);
    assert_eq!(receipt["credit"]["trees"], 1);
    assert_eq!(receipt["credit"]["coins"], 100);

    // Committed workflows leave the registry
    assert!(state.workflows.is_empty());
    let (status, _) = send(&app, "GET", &format!("/api/plantings/{}", id), &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, trees) = send(&app, "GET", "/api/trees", &token, None).await;
    assert_eq!(trees["total"], 1);
    assert_eq!(trees["trees"][0]["species"], "oak");
    assert_eq!(trees["trees"][0]["status"], "pending");
    // One blob per field even though both photos have the same bytes
    assert_eq!(backend.blob_count().await, 2);

    let (_, achievements) = send(&app, "GET", "/api/achievements", &token, None).await;
    assert_eq!(achievements["achievements"][0]["id"], "first-tree");
}

#[tokio::test]
async fn test_camera_capture_over_http() {
    let (app, _, _) = create_test_app();
    let token = create_test_jwt("snapper", None);

    let (_, wf) = send(&app, "POST", "/api/plantings", &token, None).await;
    let base = format!("/api/plantings/{}", wf["id"].as_str().unwrap());
    send(
        &app,
        "PUT",
        &format!("{}/details", base),
        &token,
        Some(json!({ "species": "birch", "location": "Park" })),
    )
    .await;
    send(&app, "POST", &format!("{}/advance", base), &token, None).await;

    let (status, wf) = send(&app, "POST", &format!("{}/camera", base), &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wf["camera"], "rear");

    let (status, _) = send(&app, "POST", &format!("{}/camera", base), &token, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, wf) = send(
        &app,
        "POST",
        &format!("{}/camera/capture", base),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wf["has_tree_photo"], true);
    assert!(wf["camera"].is_null());
}

#[tokio::test]
async fn test_advance_without_details_is_rejected() {
    let (app, _, _) = create_test_app();
    let token = create_test_jwt("hasty", None);

    let (_, wf) = send(&app, "POST", "/api/plantings", &token, None).await;
    let id = wf["id"].as_str().unwrap();

    let (status, err) = send(
        &app,
        "POST",
        &format!("/api/plantings/{}/advance", id),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "validation_error");
    assert_eq!(err["retryable"], false);
}

#[tokio::test]
async fn test_non_image_upload_rejected() {
    let (app, _, _) = create_test_app();
    let token = create_test_jwt("uploader", None);

    let (_, wf) = send(&app, "POST", "/api/plantings", &token, None).await;
    let base = format!("/api/plantings/{}", wf["id"].as_str().unwrap());
    send(
        &app,
        "PUT",
        &format!("{}/details", base),
        &token,
        Some(json!({ "species": "oak", "location": "Park" })),
    )
    .await;
    send(&app, "POST", &format!("{}/advance", base), &token, None).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("{}/photo", base),
        &token,
        Some(json!({ "data_url": data_url("image/png", b"not really a png") })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A JPEG labelled as PNG is accepted by its content
    let (status, _) = send(
        &app,
        "PUT",
        &format!("{}/photo", base),
        &token,
        Some(json!({ "data_url": data_url("image/png", JPEG_BYTES) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_other_users_workflow_not_visible() {
    let (app, _, _) = create_test_app();
    let owner = create_test_jwt("owner", None);
    let intruder = create_test_jwt("intruder", None);

    let (_, wf) = send(&app, "POST", "/api/plantings", &owner, None).await;
    let uri = format!("/api/plantings/{}", wf["id"].as_str().unwrap());

    let (status, _) = send(&app, "GET", &uri, &intruder, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", &uri, &intruder, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &uri, &owner, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_removes_workflow() {
    let (app, state, backend) = create_test_app();
    let token = create_test_jwt("quitter", None);

    let (_, wf) = send(&app, "POST", "/api/plantings", &token, None).await;
    let uri = format!("/api/plantings/{}", wf["id"].as_str().unwrap());

    let (status, wf) = send(&app, "DELETE", &uri, &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wf["step"], "cancelled");
    assert!(state.workflows.is_empty());
    assert_eq!(backend.planting_count().await, 0);
}

#[tokio::test]
async fn test_failed_liveness_returns_to_selfie() {
    let (app, _, _) = create_test_app_with(
        Config::default(),
        std::sync::Arc::new(RejectingLiveness),
    );
    let token = create_test_jwt("blurry", None);

    let (_, wf) = send(&app, "POST", "/api/plantings", &token, None).await;
    let base = format!("/api/plantings/{}", wf["id"].as_str().unwrap());
    let photo = json!({ "data_url": data_url("image/png", PNG_BYTES) });
    send(
        &app,
        "PUT",
        &format!("{}/details", base),
        &token,
        Some(json!({ "species": "oak", "location": "Park" })),
    )
    .await;
    send(&app, "POST", &format!("{}/advance", base), &token, None).await;
    send(&app, "PUT", &format!("{}/photo", base), &token, Some(photo.clone())).await;
    send(&app, "POST", &format!("{}/advance", base), &token, None).await;
    send(&app, "PUT", &format!("{}/photo", base), &token, Some(photo)).await;
    send(&app, "POST", &format!("{}/advance", base), &token, None).await;

    let (status, err) = send(&app, "POST", &format!("{}/liveness", base), &token, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "verification_failed");
    assert_eq!(err["retryable"], true);

    let (_, wf) = send(&app, "GET", &base, &token, None).await;
    assert_eq!(wf["step"], "selfie_verification");
}

#[tokio::test]
async fn test_redeem_over_budget() {
    let (app, _, backend) = create_test_app();
    backend.put_profile(profile_with_coins("saver", 200)).await;
    let token = create_test_jwt("saver", None);

    let (status, err) = send(
        &app,
        "POST",
        "/api/rewards/redeem",
        &token,
        Some(json!({ "reward_id": "seed-pack" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "insufficient_balance");

    let profile = backend.get_profile("saver").await.unwrap().unwrap();
    assert_eq!(profile.coins, 200);
    assert!(backend.redemptions_for("saver").await.is_empty());
}

#[tokio::test]
async fn test_redeem_debits_balance() {
    let (app, _, backend) = create_test_app();
    backend.put_profile(profile_with_coins("shopper", 600)).await;
    let token = create_test_jwt("shopper", None);

    let (status, receipt) = send(
        &app,
        "POST",
        "/api/rewards/redeem",
        &token,
        Some(json!({ "reward_id": "seed-pack", "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["reward_name"], "Native Seed Pack");
    assert_eq!(receipt["redemption"]["total_cost"], 500);
    assert_eq!(receipt["balance"], 100);
}

#[tokio::test]
async fn test_redeem_validation() {
    let (app, _, backend) = create_test_app();
    backend.put_profile(profile_with_coins("picky", 5000)).await;
    let token = create_test_jwt("picky", None);

    let (status, _) = send(
        &app,
        "POST",
        "/api/rewards/redeem",
        &token,
        Some(json!({ "reward_id": "seed-pack", "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/rewards/redeem",
        &token,
        Some(json!({ "reward_id": "golden-acorn" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // No profile yet
    let stranger = create_test_jwt("stranger", None);
    let (status, _) = send(
        &app,
        "POST",
        "/api/rewards/redeem",
        &stranger,
        Some(json!({ "reward_id": "seed-pack" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rewards_catalog() {
    let (app, _, _) = create_test_app();
    let token = create_test_jwt("browser", None);

    let (status, catalog) = send(&app, "GET", "/api/rewards", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    let rewards = catalog["rewards"].as_array().unwrap();
    assert_eq!(rewards.len(), 4);
    assert!(rewards.iter().any(|r| r["id"] == "seed-pack" && r["cost"] == 250));
}

#[tokio::test]
async fn test_verify_requires_service_role() {
    let (app, _, _) = create_test_app();
    let planter = create_test_jwt("verified-planter", None);
    let reviewer = create_test_jwt("reviewer", Some(SERVICE_ROLE));
    send(&app, "GET", "/api/me", &planter, None).await;

    let id = ready_workflow(&app, &planter).await;
    let (_, receipt) = send(
        &app,
        "POST",
        &format!("/api/plantings/{}/commit", id),
        &planter,
        None,
    )
    .await;
    let planting_id = receipt["planting_id"].as_str().unwrap();
    let uri = format!("/api/trees/{}/verify", planting_id);

    let (status, _) = send(&app, "POST", &uri, &planter, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, outcome) = send(&app, "POST", &uri, &reviewer, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["planting"]["status"], "verified");
    // Credit was already granted on submit
    assert!(outcome.get("credit").is_none());

    let (status, _) = send(&app, "POST", &uri, &reviewer, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_leaderboard_sorting() {
    let (app, _, backend) = create_test_app();
    let mut alice = profile_with_coins("alice", 50);
    alice.name = "Alice".to_string();
    alice.trees = 3;
    let mut bob = profile_with_coins("bob", 900);
    bob.name = "Bob".to_string();
    bob.trees = 1;
    backend.put_profile(alice).await;
    backend.put_profile(bob).await;
    let token = create_test_jwt("alice", None);

    let (status, board) = send(&app, "GET", "/api/leaderboard", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["entries"][0]["user_id"], "alice");
    assert_eq!(board["entries"][0]["rank"], 1);

    let (_, board) = send(&app, "GET", "/api/leaderboard?sort=coins&period=week", &token, None).await;
    assert_eq!(board["entries"][0]["user_id"], "bob");
    assert_eq!(board["entries"][1]["user_id"], "alice");
}
