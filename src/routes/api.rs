// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{PlantingRecord, RewardCatalogItem};
use crate::services::{
    ensure_profile, leaderboard, verify_planting, LeaderboardEntry, LeaderboardPeriod,
    LeaderboardSort, RedemptionReceipt, VerificationOutcome,
};
use crate::session::SessionContext;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/trees", get(get_trees))
        .route("/api/trees/{id}/verify", post(verify_tree))
        .route("/api/rewards", get(get_rewards))
        .route("/api/rewards/redeem", post(redeem_reward))
        .route("/api/achievements", get(get_achievements))
        .route("/api/leaderboard", get(get_leaderboard))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub trees: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub coins: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub streak: i64,
    pub created_at: String,
    pub last_active: String,
}

/// Get current user profile, creating it on first sign-in.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let mut session = SessionContext::from_auth(&user);
    let profile = ensure_profile(state.backend.as_ref(), &mut session).await?;

    Ok(Json(UserResponse {
        id: profile.id,
        name: profile.name,
        email: profile.email,
        trees: profile.trees,
        coins: profile.coins,
        streak: profile.streak,
        created_at: format_utc_rfc3339(profile.created_at),
        last_active: format_utc_rfc3339(profile.last_active),
    }))
}

// ─── Plantings ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct TreesResponse {
    pub trees: Vec<PlantingRecord>,
    pub total: usize,
}

/// List the user's plantings, newest first.
async fn get_trees(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TreesResponse>> {
    let trees = state.backend.list_plantings(&user.user_id).await?;
    tracing::debug!(user_id = %user.user_id, count = trees.len(), "Fetched plantings");

    Ok(Json(TreesResponse {
        total: trees.len(),
        trees,
    }))
}

/// Mark a planting verified (reviewers only).
async fn verify_tree(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<VerificationOutcome>> {
    let session = SessionContext::from_auth(&user);
    let outcome = verify_planting(state.backend.as_ref(), &state.accrual, &session, &id).await?;
    Ok(Json(outcome))
}

// ─── Rewards ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RewardsResponse {
    pub rewards: Vec<RewardCatalogItem>,
}

async fn get_rewards(State(state): State<Arc<AppState>>) -> Result<Json<RewardsResponse>> {
    let rewards = state.redemption.catalog().await?;
    Ok(Json(RewardsResponse { rewards }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemRequest {
    #[validate(length(min = 1, max = 128))]
    pub reward_id: String,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Redeem a catalog item with Green Coins.
async fn redeem_reward(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<RedemptionReceipt>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut session = SessionContext::from_auth(&user);
    session.profile = state.backend.get_profile(&user.user_id).await?;
    if session.profile.is_none() {
        return Err(AppError::NotFound(format!("User {}", user.user_id)));
    }

    let receipt = state
        .redemption
        .redeem(&mut session, &body.reward_id, body.quantity)
        .await?;
    Ok(Json(receipt))
}

// ─── Achievements ────────────────────────────────────────────

#[derive(Serialize)]
pub struct EarnedAchievement {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub earned_at: String,
}

#[derive(Serialize)]
pub struct AchievementsResponse {
    pub achievements: Vec<EarnedAchievement>,
}

async fn get_achievements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AchievementsResponse>> {
    let achievements = state
        .backend
        .list_user_achievements(&user.user_id)
        .await?
        .into_iter()
        .map(|(earned, a)| EarnedAchievement {
            id: a.id,
            name: a.name,
            description: a.description,
            icon: a.icon,
            earned_at: format_utc_rfc3339(earned.earned_at),
        })
        .collect();

    Ok(Json(AchievementsResponse { achievements }))
}

// ─── Leaderboard ─────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct LeaderboardQuery {
    #[serde(default)]
    period: LeaderboardPeriod,
    #[serde(default)]
    sort: LeaderboardSort,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>> {
    let entries = leaderboard(
        state.backend.as_ref(),
        params.period,
        params.sort,
        chrono::Utc::now(),
    )
    .await?;
    Ok(Json(LeaderboardResponse { entries }))
}
