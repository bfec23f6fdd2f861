//! Achievements and the threshold rule evaluator.
//!
//! Backends without a server-side rule engine evaluate achievements with
//! [`AchievementRules`] after each credit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::UserProfile;

/// Which aggregate an achievement threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementKind {
    Trees,
    Coins,
    Streak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Threshold on the aggregate named by `kind`
    pub requirement: i64,
    #[serde(rename = "type")]
    pub kind: AchievementKind,
    /// Coins credited once when earned
    #[serde(default)]
    pub bonus_coins: i64,
}

impl Achievement {
    /// Award key used to credit the bonus exactly once.
    pub fn award_key(&self) -> String {
        format!("achievement:{}", self.id)
    }
}

/// An achievement earned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: String,
    pub achievement_id: String,
    pub earned_at: DateTime<Utc>,
}

/// Threshold evaluator over a user's aggregate stats.
pub struct AchievementRules;

impl AchievementRules {
    /// Achievements whose threshold `profile` meets and that are not in `earned`.
    ///
    /// Result is ordered by requirement so bonuses are credited lowest first.
    pub fn evaluate<'a>(
        profile: &UserProfile,
        catalog: &'a [Achievement],
        earned: &HashSet<String>,
    ) -> Vec<&'a Achievement> {
        let mut newly: Vec<&Achievement> = catalog
            .iter()
            .filter(|a| !earned.contains(&a.id))
            .filter(|a| {
                let value = match a.kind {
                    AchievementKind::Trees => profile.trees,
                    AchievementKind::Coins => profile.coins,
                    AchievementKind::Streak => profile.streak,
                };
                value >= a.requirement
            })
            .collect();
        newly.sort_by_key(|a| a.requirement);
        newly
    }
}
