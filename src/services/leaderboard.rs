// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Leaderboard ranking over user profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::backend::BackendClient;
use crate::error::AppError;
use crate::models::UserProfile;
use crate::time_utils::window_start;

/// Number of entries returned.
pub const LEADERBOARD_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardPeriod {
    #[default]
    All,
    Week,
    Month,
}

impl LeaderboardPeriod {
    /// Earliest `last_active` counted for this period.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            LeaderboardPeriod::All => None,
            LeaderboardPeriod::Week => Some(window_start(now, 7)),
            LeaderboardPeriod::Month => Some(window_start(now, 30)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardSort {
    #[default]
    Trees,
    Coins,
    Streak,
}

impl LeaderboardSort {
    fn key(&self, profile: &UserProfile) -> i64 {
        match self {
            LeaderboardSort::Trees => profile.trees,
            LeaderboardSort::Coins => profile.coins,
            LeaderboardSort::Streak => profile.streak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub name: String,
    pub trees: i64,
    pub coins: i64,
    pub streak: i64,
}

/// Sort descending by `sort` (ties by name), keep the top `limit`, rank from 1.
pub fn rank(mut profiles: Vec<UserProfile>, sort: LeaderboardSort, limit: usize) -> Vec<LeaderboardEntry> {
    profiles.sort_by(|a, b| match sort.key(b).cmp(&sort.key(a)) {
        Ordering::Equal => a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)),
        other => other,
    });

    profiles
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: i + 1,
            user_id: p.id,
            name: p.name,
            trees: p.trees,
            coins: p.coins,
            streak: p.streak,
        })
        .collect()
}

/// Top users for `period`, ordered by `sort`.
pub async fn leaderboard(
    backend: &dyn BackendClient,
    period: LeaderboardPeriod,
    sort: LeaderboardSort,
    now: DateTime<Utc>,
) -> Result<Vec<LeaderboardEntry>, AppError> {
    let profiles = backend.list_profiles(period.since(now)).await?;
    Ok(rank(profiles, sort, LEADERBOARD_SIZE))
}
