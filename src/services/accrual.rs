// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward accrual for committed plantings.
//!
//! One keyed atomic increment per planting, followed by best-effort
//! achievement evaluation. The two are not transactional: a failed
//! achievement check leaves the credit in place.

use serde::Serialize;
use std::sync::Arc;

use crate::backend::{BackendClient, Rule};
use crate::config::RewardPolicy;
use crate::error::AppError;
use crate::models::{Achievement, StatsDelta, UserProfile};

/// Result of crediting one planting.
#[derive(Debug, Clone, Serialize)]
pub struct AccrualOutcome {
    /// `false` when this planting had already been credited
    pub applied: bool,
    pub trees: Option<i64>,
    pub coins: Option<i64>,
    /// Achievements earned as a consequence of this credit
    pub new_achievements: Vec<Achievement>,
    #[serde(skip)]
    pub profile: Option<UserProfile>,
}

/// Credits plantings to their owner's counters.
#[derive(Clone)]
pub struct RewardAccrual {
    backend: Arc<dyn BackendClient>,
    reward: i64,
    policy: RewardPolicy,
}

impl RewardAccrual {
    pub fn new(backend: Arc<dyn BackendClient>, reward: i64, policy: RewardPolicy) -> Self {
        Self {
            backend,
            reward,
            policy,
        }
    }

    pub fn policy(&self) -> RewardPolicy {
        self.policy
    }

    pub fn reward(&self) -> i64 {
        self.reward
    }

    /// Credit `trees += 1, coins += reward` for `planting_id`, at most once.
    ///
    /// Every failure except a malformed request is reported as the counter
    /// increment stage, so the caller can retry the commit. That includes a
    /// missing profile, which a concurrent sign-in may still be creating.
    pub async fn credit_planting(
        &self,
        user_id: &str,
        planting_id: &str,
    ) -> Result<AccrualOutcome, AppError> {
        let outcome = self
            .backend
            .atomic_increment(user_id, StatsDelta::planting(self.reward), planting_id)
            .await
            .map_err(|e| match e {
                AppError::Validation(_) => e,
                other => AppError::counter_increment(other.to_string()),
            })?;

        if !outcome.applied {
            tracing::info!(user_id, planting_id, "Planting already credited, skipping");
            return Ok(AccrualOutcome {
                applied: false,
                trees: outcome.profile.as_ref().map(|p| p.trees),
                coins: outcome.profile.as_ref().map(|p| p.coins),
                new_achievements: Vec::new(),
                profile: outcome.profile,
            });
        }

        tracing::info!(
            user_id,
            planting_id,
            reward = self.reward,
            "Planting credited"
        );

        let new_achievements = self.check_achievements(user_id).await;

        // Achievement bonuses change the balance; re-read when any were earned
        let profile = if new_achievements.iter().any(|a| a.bonus_coins > 0) {
            match self.backend.get_profile(user_id).await {
                Ok(Some(p)) => Some(p),
                _ => outcome.profile,
            }
        } else {
            outcome.profile
        };

        Ok(AccrualOutcome {
            applied: true,
            trees: profile.as_ref().map(|p| p.trees),
            coins: profile.as_ref().map(|p| p.coins),
            new_achievements,
            profile,
        })
    }

    /// Best-effort achievement evaluation; failures are logged and swallowed.
    async fn check_achievements(&self, user_id: &str) -> Vec<Achievement> {
        match self.backend.run_rule(Rule::CheckAchievements, user_id).await {
            Ok(earned) => {
                for achievement in &earned {
                    tracing::info!(
                        user_id,
                        achievement = %achievement.id,
                        bonus = achievement.bonus_coins,
                        "Achievement earned"
                    );
                }
                earned
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    rule = Rule::CheckAchievements.name(),
                    error = %e,
                    "Achievement check failed"
                );
                Vec::new()
            }
        }
    }
}
