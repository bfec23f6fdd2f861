//! User profile model and its counter arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Aggregate per-user state stored alongside the auth identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Auth identity (also used as document ID)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Number of credited plantings
    #[serde(default)]
    pub trees: i64,
    /// Green Coins balance
    #[serde(default)]
    pub coins: i64,
    /// Consecutive-activity counter (maintained outside the workflow)
    #[serde(default)]
    pub streak: i64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Proof that one award key was credited to one user.
///
/// Markers live in their own collection, one document per (user, key), so
/// the profile stays a fixed size however many plantings a user submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardMarker {
    pub user_id: String,
    /// Planting id or `achievement:{id}`
    pub award_key: String,
    pub trees: i64,
    pub coins: i64,
    pub awarded_at: DateTime<Utc>,
}

impl AwardMarker {
    pub fn new(user_id: &str, award_key: &str, delta: StatsDelta, at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            award_key: award_key.to_string(),
            trees: delta.trees,
            coins: delta.coins,
            awarded_at: at,
        }
    }

    /// Document ID for the marker of `award_key` credited to `user_id`.
    ///
    /// Both parts are percent-encoded, so the `:` separator never appears
    /// inside either and distinct pairs never share an ID.
    pub fn doc_id(user_id: &str, award_key: &str) -> String {
        format!(
            "{}:{}",
            urlencoding::encode(user_id),
            urlencoding::encode(award_key)
        )
    }
}

/// Relative adjustment applied server-side to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsDelta {
    pub trees: i64,
    pub coins: i64,
}

impl StatsDelta {
    /// Credit for one planting.
    pub fn planting(reward: i64) -> Self {
        Self {
            trees: 1,
            coins: reward,
        }
    }

    /// Coin-only bonus (achievements).
    pub fn bonus(coins: i64) -> Self {
        Self { trees: 0, coins }
    }
}

impl UserProfile {
    /// Fresh profile created on first authentication.
    pub fn new(id: impl Into<String>, name: Option<String>, email: Option<String>) -> Self {
        let now = Utc::now();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "User".to_string());
        Self {
            id: id.into(),
            name,
            email,
            trees: 0,
            coins: 0,
            streak: 0,
            created_at: now,
            last_active: now,
        }
    }

    /// Add `delta` to the counters. Callers check the award marker first.
    pub fn credit(&mut self, delta: StatsDelta) {
        self.trees += delta.trees;
        self.coins += delta.coins;
    }

    /// Debit coins for a redemption, refusing to go negative.
    pub fn debit(&mut self, total_cost: i64) -> Result<(), AppError> {
        if total_cost < 0 {
            return Err(AppError::Validation("Cost must not be negative".to_string()));
        }
        if self.coins < total_cost {
            return Err(AppError::InsufficientBalance {
                required: total_cost,
                available: self.coins,
            });
        }
        self.coins -= total_cost;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let profile = UserProfile::new("u1", Some("  ".to_string()), None);
        assert_eq!(profile.name, "User");
        assert_eq!(profile.trees, 0);
        assert_eq!(profile.coins, 0);
        assert_eq!(profile.streak, 0);
    }

    #[test]
    fn test_credit_adds_delta() {
        let mut profile = UserProfile::new("u1", Some("Ada".to_string()), None);
        profile.credit(StatsDelta::planting(100));
        profile.credit(StatsDelta::planting(100));
        assert_eq!(profile.trees, 2);
        assert_eq!(profile.coins, 200);
    }

    #[test]
    fn test_bonus_does_not_touch_tree_count() {
        let mut profile = UserProfile::new("u1", None, None);
        profile.credit(StatsDelta::bonus(50));
        assert_eq!(profile.trees, 0);
        assert_eq!(profile.coins, 50);
    }

    #[test]
    fn test_marker_ids_do_not_collide() {
        assert_ne!(
            AwardMarker::doc_id("a:b", "c"),
            AwardMarker::doc_id("a", "b:c")
        );
        assert_eq!(
            AwardMarker::doc_id("u1", "achievement:grove"),
            "u1:achievement%3Agrove"
        );
    }

    #[test]
    fn test_profile_document_has_no_award_history() {
        let profile = UserProfile::new("u1", None, None);
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("awarded_keys").is_none());
    }

    #[test]
    fn test_debit_rejects_overdraw() {
        let mut profile = UserProfile::new("u1", None, None);
        profile.coins = 50;

        let err = profile.debit(100).unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientBalance {
                required: 100,
                available: 50
            }
        ));
        assert_eq!(profile.coins, 50);

        profile.debit(50).unwrap();
        assert_eq!(profile.coins, 0);
    }
}
