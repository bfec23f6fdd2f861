// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward catalog and redemption.

use serde::Serialize;
use std::sync::Arc;

use crate::backend::BackendClient;
use crate::error::AppError;
use crate::models::{RedemptionRecord, RewardCatalogItem};
use crate::services::RetryPolicy;
use crate::session::SessionContext;

/// Confirmation returned to the caller after a redemption.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReceipt {
    pub redemption: RedemptionRecord,
    pub reward_name: String,
    /// Balance after the refresh, if the profile could be re-read
    pub balance: Option<i64>,
}

/// Spends Green Coins on catalog items.
#[derive(Clone)]
pub struct RedemptionService {
    backend: Arc<dyn BackendClient>,
    retry: RetryPolicy,
}

impl RedemptionService {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reward catalog ordered by cost.
    pub async fn catalog(&self) -> Result<Vec<RewardCatalogItem>, AppError> {
        self.retry
            .run("get_catalog", || self.backend.get_catalog())
            .await
    }

    /// Redeem `quantity` units of `reward_id` for the session user.
    ///
    /// The cached balance is only a pre-check; the store re-checks and
    /// debits atomically. The session profile is refreshed afterwards.
    pub async fn redeem(
        &self,
        session: &mut SessionContext,
        reward_id: &str,
        quantity: u32,
    ) -> Result<RedemptionReceipt, AppError> {
        if quantity == 0 {
            return Err(AppError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let reward = self
            .retry
            .run("get_reward", || self.backend.get_reward(reward_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reward {}", reward_id)))?;

        let total_cost = reward
            .total_cost(quantity)
            .ok_or_else(|| AppError::Validation("Quantity too large".to_string()))?;

        if let Some(available) = session.cached_coins() {
            if available < total_cost {
                return Err(AppError::InsufficientBalance {
                    required: total_cost,
                    available,
                });
            }
        }

        let redemption = self
            .backend
            .redeem(&session.user_id, reward_id, quantity)
            .await?;

        tracing::info!(
            user_id = %session.user_id,
            reward_id,
            quantity,
            total_cost = redemption.total_cost,
            "Reward redeemed"
        );

        match self.backend.get_profile(&session.user_id).await {
            Ok(Some(profile)) => session.profile = Some(profile),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "Profile refresh after redemption failed");
            }
        }

        Ok(RedemptionReceipt {
            redemption,
            reward_name: reward.name,
            balance: session.cached_coins(),
        })
    }
}
