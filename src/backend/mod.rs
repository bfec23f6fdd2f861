// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend Client contract and its adapters.
//!
//! The workflow, accrual and redemption services only talk to
//! [`BackendClient`]; which managed store sits behind it is a startup choice.

pub mod firestore;
pub mod memory;
pub mod supabase;

pub use self::firestore::FirestoreBackend;
pub use memory::MemoryBackend;
pub use supabase::SupabaseBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    Achievement, PlantingRecord, Record, RedemptionRecord, RewardCatalogItem, StatsDelta,
    UserAchievement, UserProfile,
};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TREES: &str = "trees";
    pub const REWARDS: &str = "rewards";
    pub const REDEMPTIONS: &str = "redemptions";
    pub const ACHIEVEMENTS: &str = "achievements";
    pub const USER_ACHIEVEMENTS: &str = "user_achievements";
    /// One marker per credited award key
    pub const AWARDS: &str = "awards";
}

/// Server-side rules the core can trigger by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    CheckAchievements,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::CheckAchievements => "check_achievements",
        }
    }
}

/// Result of a record-creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub id: String,
    /// `false` when the idempotency key matched an existing record.
    pub created: bool,
}

/// Result of a keyed atomic increment.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementOutcome {
    /// `false` when the award key had already been credited.
    pub applied: bool,
    /// Profile after the increment, when the backend returns it.
    pub profile: Option<UserProfile>,
}

/// Abstract managed backend: document/row store, blob storage and rules.
///
/// Every call is a single request/response. Operations documented as atomic
/// must be evaluated by the store itself, never as a client-side
/// read-modify-write.
#[async_trait]
pub trait BackendClient: Send + Sync {
    // ─── Records ─────────────────────────────────────────────────

    /// Create one record. With an idempotency key, a second call with the
    /// same key returns the existing record's id and `created = false`.
    async fn create_record(
        &self,
        record: Record,
        idempotency_key: Option<&str>,
    ) -> Result<CreatedRecord, AppError>;

    // ─── Profiles ────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError>;

    /// Stamp `last_active` (login events).
    async fn touch_profile(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Atomically add `delta` to the profile counters, at most once per `award_key`.
    async fn atomic_increment(
        &self,
        user_id: &str,
        delta: StatsDelta,
        award_key: &str,
    ) -> Result<IncrementOutcome, AppError>;

    /// Profiles for the leaderboard, optionally only those active since `active_since`.
    async fn list_profiles(
        &self,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UserProfile>, AppError>;

    // ─── Plantings ───────────────────────────────────────────────

    async fn get_planting(&self, planting_id: &str) -> Result<Option<PlantingRecord>, AppError>;

    /// A user's plantings, newest first.
    async fn list_plantings(&self, user_id: &str) -> Result<Vec<PlantingRecord>, AppError>;

    /// Flip a planting to verified. Returns the updated record, or `None` if
    /// it was already verified.
    async fn mark_planting_verified(
        &self,
        planting_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PlantingRecord>, AppError>;

    // ─── Storage ─────────────────────────────────────────────────

    /// Store bytes at `path` and return a stable reference (URL).
    async fn upload_blob(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, AppError>;

    // ─── Rewards ─────────────────────────────────────────────────

    /// Reward catalog ordered by cost ascending.
    async fn get_catalog(&self) -> Result<Vec<RewardCatalogItem>, AppError>;

    async fn get_reward(&self, reward_id: &str) -> Result<Option<RewardCatalogItem>, AppError>;

    /// Atomically check the balance, debit `cost * quantity` and append a
    /// redemption record. The store's own catalog price is authoritative.
    async fn redeem(
        &self,
        user_id: &str,
        reward_id: &str,
        quantity: u32,
    ) -> Result<RedemptionRecord, AppError>;

    // ─── Achievements ────────────────────────────────────────────

    /// Run a named rule for a user; returns newly earned achievements.
    async fn run_rule(&self, rule: Rule, user_id: &str) -> Result<Vec<Achievement>, AppError>;

    async fn list_user_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<(UserAchievement, Achievement)>, AppError>;
}

/// Newest-first order shared by the adapters' planting listings.
pub(crate) fn sort_newest_first(plantings: &mut [PlantingRecord]) {
    plantings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
