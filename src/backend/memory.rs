// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process backend used for local development and tests.
//!
//! Every operation runs under one async mutex, which gives the same
//! guarantees the hosted stores provide through transactions and stored
//! procedures: increments and redemptions are evaluated against the current
//! state, never against a caller's stale copy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::backend::{sort_newest_first, BackendClient, CreatedRecord, IncrementOutcome, Rule};
use crate::error::AppError;
use crate::models::{
    Achievement, AchievementKind, AchievementRules, AwardMarker, PlantingRecord, Record,
    RedemptionRecord, RewardCatalogItem, RewardCategory, StatsDelta, UserAchievement, UserProfile,
};

/// Operations whose next call can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateRecord,
    Increment,
    Upload,
    RunRule,
    Redeem,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Store {
    profiles: HashMap<String, UserProfile>,
    plantings: HashMap<String, PlantingRecord>,
    /// Idempotency key -> planting id
    planting_keys: HashMap<String, String>,
    redemptions: Vec<RedemptionRecord>,
    rewards: Vec<RewardCatalogItem>,
    achievements: Vec<Achievement>,
    user_achievements: Vec<UserAchievement>,
    /// Marker document id -> marker
    awards: HashMap<String, AwardMarker>,
    blobs: HashMap<String, StoredBlob>,
    /// Remaining injected failures per operation
    faults: HashMap<Fault, u32>,
}

impl Store {
    fn take_fault(&mut self, op: Fault) -> bool {
        match self.faults.get_mut(&op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    /// Keyed credit: applies `delta` unless `award_key` already has a marker.
    fn credit(
        &mut self,
        user_id: &str,
        delta: StatsDelta,
        award_key: &str,
    ) -> Result<(bool, UserProfile), AppError> {
        let profile = self
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        let marker_id = AwardMarker::doc_id(user_id, award_key);
        if self.awards.contains_key(&marker_id) {
            return Ok((false, profile.clone()));
        }

        let now = Utc::now();
        profile.credit(delta);
        profile.last_active = now;
        let profile = profile.clone();
        self.awards
            .insert(marker_id, AwardMarker::new(user_id, award_key, delta, now));
        Ok((true, profile))
    }
}

/// In-memory implementation of the Backend Client contract.
#[derive(Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-loaded with a reward catalog and achievement rules.
    pub fn with_catalog(rewards: Vec<RewardCatalogItem>, achievements: Vec<Achievement>) -> Self {
        let mut rewards = rewards;
        rewards.sort_by_key(|r| r.cost);
        Self {
            store: Mutex::new(Store {
                rewards,
                achievements,
                ..Store::default()
            }),
        }
    }

    /// Backend seeded with the starter catalog served in development mode.
    pub fn seeded() -> Self {
        Self::with_catalog(default_rewards(), default_achievements())
    }

    /// Make the next `times` calls of `op` fail with a transient error.
    pub async fn fail_next(&self, op: Fault, times: u32) {
        self.store.lock().await.faults.insert(op, times);
    }

    /// Insert or replace a profile directly (seeding).
    pub async fn put_profile(&self, profile: UserProfile) {
        self.store
            .lock()
            .await
            .profiles
            .insert(profile.id.clone(), profile);
    }

    pub async fn planting_count(&self) -> usize {
        self.store.lock().await.plantings.len()
    }

    /// Number of award markers held for `user_id`.
    pub async fn award_count(&self, user_id: &str) -> usize {
        self.store
            .lock()
            .await
            .awards
            .values()
            .filter(|m| m.user_id == user_id)
            .count()
    }

    pub async fn blob_count(&self) -> usize {
        self.store.lock().await.blobs.len()
    }

    pub async fn redemptions_for(&self, user_id: &str) -> Vec<RedemptionRecord> {
        self.store
            .lock()
            .await
            .redemptions
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Content type and bytes stored at `path`.
    pub async fn blob(&self, path: &str) -> Option<(String, Vec<u8>)> {
        self.store
            .lock()
            .await
            .blobs
            .get(path)
            .map(|b| (b.content_type.clone(), b.bytes.clone()))
    }
}

fn transient(op: &str) -> AppError {
    AppError::Database(format!("{} temporarily unavailable", op))
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn create_record(
        &self,
        record: Record,
        idempotency_key: Option<&str>,
    ) -> Result<CreatedRecord, AppError> {
        record.validate()?;
        let mut store = self.store.lock().await;
        if store.take_fault(Fault::CreateRecord) {
            return Err(transient("record creation"));
        }

        match record {
            Record::Planting(planting) => {
                let key = idempotency_key
                    .unwrap_or(&planting.idempotency_key)
                    .to_string();
                if let Some(existing) = store.planting_keys.get(&key) {
                    return Ok(CreatedRecord {
                        id: existing.clone(),
                        created: false,
                    });
                }
                let id = uuid::Uuid::new_v4().to_string();
                let stored = planting.into_record(id.clone());
                store.planting_keys.insert(key, id.clone());
                store.plantings.insert(id.clone(), stored);
                Ok(CreatedRecord { id, created: true })
            }
            Record::Profile(profile) => {
                if store.profiles.contains_key(&profile.id) {
                    return Ok(CreatedRecord {
                        id: profile.id,
                        created: false,
                    });
                }
                let id = profile.id.clone();
                store.profiles.insert(id.clone(), profile);
                Ok(CreatedRecord { id, created: true })
            }
            Record::Redemption(_) => Err(AppError::Validation(
                "Redemption records are only written by redeem".to_string(),
            )),
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        Ok(self.store.lock().await.profiles.get(user_id).cloned())
    }

    async fn touch_profile(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut store = self.store.lock().await;
        let profile = store
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        profile.last_active = at;
        Ok(())
    }

    async fn atomic_increment(
        &self,
        user_id: &str,
        delta: StatsDelta,
        award_key: &str,
    ) -> Result<IncrementOutcome, AppError> {
        let mut store = self.store.lock().await;
        if store.take_fault(Fault::Increment) {
            return Err(transient("counter increment"));
        }
        let (applied, profile) = store.credit(user_id, delta, award_key)?;
        Ok(IncrementOutcome {
            applied,
            profile: Some(profile),
        })
    }

    async fn list_profiles(
        &self,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UserProfile>, AppError> {
        let store = self.store.lock().await;
        Ok(store
            .profiles
            .values()
            .filter(|p| active_since.is_none_or(|since| p.last_active >= since))
            .cloned()
            .collect())
    }

    async fn get_planting(&self, planting_id: &str) -> Result<Option<PlantingRecord>, AppError> {
        Ok(self.store.lock().await.plantings.get(planting_id).cloned())
    }

    async fn list_plantings(&self, user_id: &str) -> Result<Vec<PlantingRecord>, AppError> {
        let store = self.store.lock().await;
        let mut plantings: Vec<PlantingRecord> = store
            .plantings
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        sort_newest_first(&mut plantings);
        Ok(plantings)
    }

    async fn mark_planting_verified(
        &self,
        planting_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PlantingRecord>, AppError> {
        let mut store = self.store.lock().await;
        let planting = store
            .plantings
            .get_mut(planting_id)
            .ok_or_else(|| AppError::NotFound(format!("Planting {}", planting_id)))?;
        if planting.mark_verified(at) {
            Ok(Some(planting.clone()))
        } else {
            Ok(None)
        }
    }

    async fn upload_blob(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        let mut store = self.store.lock().await;
        if store.take_fault(Fault::Upload) {
            return Err(AppError::Upload(format!("storage rejected {}", path)));
        }
        store.blobs.insert(
            path.to_string(),
            StoredBlob {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(format!("memory://{}", path))
    }

    async fn get_catalog(&self) -> Result<Vec<RewardCatalogItem>, AppError> {
        Ok(self.store.lock().await.rewards.clone())
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<RewardCatalogItem>, AppError> {
        Ok(self
            .store
            .lock()
            .await
            .rewards
            .iter()
            .find(|r| r.id == reward_id)
            .cloned())
    }

    async fn redeem(
        &self,
        user_id: &str,
        reward_id: &str,
        quantity: u32,
    ) -> Result<RedemptionRecord, AppError> {
        let mut store = self.store.lock().await;
        if store.take_fault(Fault::Redeem) {
            return Err(transient("redemption"));
        }
        let reward = store
            .rewards
            .iter()
            .find(|r| r.id == reward_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Reward {}", reward_id)))?;
        let total_cost = reward
            .total_cost(quantity)
            .ok_or_else(|| AppError::Validation("Quantity too large".to_string()))?;

        let profile = store
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        profile.debit(total_cost)?;

        let record = RedemptionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            reward_id: reward_id.to_string(),
            quantity,
            total_cost,
            created_at: Utc::now(),
        };
        Record::Redemption(record.clone()).validate()?;
        store.redemptions.push(record.clone());
        Ok(record)
    }

    async fn run_rule(&self, rule: Rule, user_id: &str) -> Result<Vec<Achievement>, AppError> {
        let mut store = self.store.lock().await;
        if store.take_fault(Fault::RunRule) {
            return Err(transient(rule.name()));
        }
        match rule {
            Rule::CheckAchievements => {
                let profile = store
                    .profiles
                    .get(user_id)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
                let earned: HashSet<String> = store
                    .user_achievements
                    .iter()
                    .filter(|ua| ua.user_id == user_id)
                    .map(|ua| ua.achievement_id.clone())
                    .collect();
                let newly: Vec<Achievement> =
                    AchievementRules::evaluate(&profile, &store.achievements, &earned)
                        .into_iter()
                        .cloned()
                        .collect();

                let now = Utc::now();
                for achievement in &newly {
                    store.user_achievements.push(UserAchievement {
                        user_id: user_id.to_string(),
                        achievement_id: achievement.id.clone(),
                        earned_at: now,
                    });
                    if achievement.bonus_coins > 0 {
                        store.credit(
                            user_id,
                            StatsDelta::bonus(achievement.bonus_coins),
                            &achievement.award_key(),
                        )?;
                    }
                }
                Ok(newly)
            }
        }
    }

    async fn list_user_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<(UserAchievement, Achievement)>, AppError> {
        let store = self.store.lock().await;
        let mut earned: Vec<(UserAchievement, Achievement)> = store
            .user_achievements
            .iter()
            .filter(|ua| ua.user_id == user_id)
            .filter_map(|ua| {
                store
                    .achievements
                    .iter()
                    .find(|a| a.id == ua.achievement_id)
                    .map(|a| (ua.clone(), a.clone()))
            })
            .collect();
        earned.sort_by(|a, b| b.0.earned_at.cmp(&a.0.earned_at));
        Ok(earned)
    }
}

/// Starter reward catalog.
pub fn default_rewards() -> Vec<RewardCatalogItem> {
    let item = |id: &str, name: &str, cost: i64, category| RewardCatalogItem {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        cost,
        category,
        image_url: None,
    };
    vec![
        item("seed-pack", "Native Seed Pack", 250, RewardCategory::Product),
        item("forest-lantern", "Forest Lantern", 500, RewardCategory::ForestUpgrade),
        item("eco-bottle", "Reusable Water Bottle", 800, RewardCategory::Product),
        item("cash-5", "$5 Donation Voucher", 1000, RewardCategory::Cash),
    ]
}

/// Starter achievement rules.
pub fn default_achievements() -> Vec<Achievement> {
    let rule = |id: &str, name: &str, kind, requirement, bonus_coins| Achievement {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        icon: None,
        requirement,
        kind,
        bonus_coins,
    };
    vec![
        rule("first-tree", "First Sprout", AchievementKind::Trees, 1, 0),
        rule("grove", "Grove Keeper", AchievementKind::Trees, 10, 100),
        rule("forest", "Forest Maker", AchievementKind::Trees, 50, 500),
        rule("saver", "Coin Saver", AchievementKind::Coins, 1000, 0),
        rule("week-streak", "Seven Day Streak", AchievementKind::Streak, 7, 50),
    ]
}
