// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Reward catalog and redemption models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Kind of redeemable good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum RewardCategory {
    Cash,
    Product,
    ForestUpgrade,
}

/// A redeemable good. Read-only from the application's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RewardCatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price in coins
    pub cost: i64,
    pub category: RewardCategory,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl RewardCatalogItem {
    /// Total price for `quantity` items, `None` on overflow.
    pub fn total_cost(&self, quantity: u32) -> Option<i64> {
        self.cost.checked_mul(i64::from(quantity))
    }
}

/// Append-only audit record of one redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RedemptionRecord {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub quantity: u32,
    pub total_cost: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_names() {
        let json = serde_json::to_string(&RewardCategory::ForestUpgrade).unwrap();
        assert_eq!(json, "\"forest-upgrade\"");
    }

    #[test]
    fn test_total_cost_overflow() {
        let item = RewardCatalogItem {
            id: "r1".to_string(),
            name: "Seed pack".to_string(),
            description: None,
            cost: i64::MAX / 2,
            category: RewardCategory::Product,
            image_url: None,
        };
        assert_eq!(item.total_cost(1), Some(i64::MAX / 2));
        assert_eq!(item.total_cost(3), None);
    }
}
