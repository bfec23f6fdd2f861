// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore adapter with typed operations.
//!
//! Provides the Backend Client contract over:
//! - `users` (profiles with counters and credited award keys)
//! - `trees` (planting records, document ID = submission idempotency key)
//! - `rewards` / `redemptions`
//! - `achievements` / `user_achievements`
//!
//! Photos go to Firebase Storage through its REST upload endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreDb, FirestoreTransaction};
use std::collections::HashSet;

use crate::backend::{
    collections, sort_newest_first, BackendClient, CreatedRecord, IncrementOutcome, Rule,
};
use crate::error::AppError;
use crate::models::{
    Achievement, AchievementRules, AwardMarker, PlantingRecord, Record, RedemptionRecord, RewardCatalogItem,
    StatsDelta, UserAchievement, UserProfile,
};

const STORAGE_BASE_URL: &str = "https://firebasestorage.googleapis.com/v0/b";

/// Attempts for a read-write transaction that Firestore keeps aborting.
const TRANSACTION_ATTEMPTS: u32 = 5;

/// Delay before the second attempt; doubles after each abort.
const ABORT_BACKOFF: std::time::Duration = std::time::Duration::from_millis(25);

/// Writes decided by one transaction attempt.
enum Staged<T> {
    /// Commit the staged writes and return the value.
    Write(T),
    /// Nothing to write; roll back and return the value.
    Skip(T),
}

/// Failure of one transaction attempt.
enum TxError {
    /// Firestore aborted the transaction on contention; nothing was written.
    Aborted,
    Failed(AppError),
}

impl From<AppError> for TxError {
    fn from(e: AppError) -> Self {
        TxError::Failed(e)
    }
}

impl From<FirestoreError> for TxError {
    fn from(e: FirestoreError) -> Self {
        if is_aborted(&e) {
            TxError::Aborted
        } else {
            TxError::Failed(AppError::Database(e.to_string()))
        }
    }
}

impl TxError {
    fn into_app(self, what: &str) -> AppError {
        match self {
            TxError::Aborted => contended(what),
            TxError::Failed(e) => e,
        }
    }
}

fn is_aborted(err: &FirestoreError) -> bool {
    matches!(err, FirestoreError::DatabaseError(e) if e.public.code == "Aborted")
}

async fn back_off(attempt: u32) {
    if attempt < TRANSACTION_ATTEMPTS {
        tokio::time::sleep(ABORT_BACKOFF * 2u32.pow(attempt - 1)).await;
    }
}

fn contended(what: &str) -> AppError {
    AppError::Database(format!(
        "{} transaction aborted {} times on contention",
        what, TRANSACTION_ATTEMPTS
    ))
}

/// Read one document through `db`; inside a transaction when `db` is bound to one.
async fn read_in<T>(db: &FirestoreDb, collection: &str, doc_id: &str) -> Result<Option<T>, TxError>
where
    T: serde::de::DeserializeOwned + Send,
{
    Ok(db
        .fluent()
        .select()
        .by_id_in(collection)
        .obj()
        .one(doc_id)
        .await?)
}

/// Queue a full-document write in `transaction`.
fn stage_write<T>(
    db: &FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    collection: &str,
    doc_id: &str,
    object: &T,
) -> Result<(), TxError>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Sync + Send,
{
    db.fluent()
        .update()
        .in_col(collection)
        .document_id(doc_id)
        .object(object)
        .add_to_transaction(transaction)
        .map_err(|e| {
            AppError::Database(format!("Failed to add {} to transaction: {}", collection, e))
        })?;
    Ok(())
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreBackend {
    client: Option<FirestoreDb>,
    http: reqwest::Client,
    storage_bucket: String,
    storage_token: Option<String>,
}

impl FirestoreBackend {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, storage_bucket: &str) -> Result<Self, AppError> {
        let storage_token = std::env::var("FIREBASE_STORAGE_TOKEN").ok();

        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            let client = Self::create_emulator_client(project_id).await?;
            return Ok(Self::from_client(client, storage_bucket, storage_token));
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::from_client(client, storage_bucket, storage_token))
    }

    fn from_client(
        client: firestore::FirestoreDb,
        storage_bucket: &str,
        storage_token: Option<String>,
    ) -> Self {
        Self {
            client: Some(client),
            http: reqwest::Client::new(),
            storage_bucket: storage_bucket.to_string(),
            storage_token,
        }
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<firestore::FirestoreDb, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(client)
    }

    /// Create an offline Firestore backend for testing.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            http: reqwest::Client::new(),
            storage_bucket: "test-bucket".to_string(),
            storage_token: None,
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Create or replace catalog entries and achievement rules.
    pub async fn seed_catalog(
        &self,
        rewards: &[RewardCatalogItem],
        achievements: &[Achievement],
    ) -> Result<(), AppError> {
        let client = self.get_client()?;
        for reward in rewards {
            let _: () = client
                .fluent()
                .update()
                .in_col(collections::REWARDS)
                .document_id(&reward.id)
                .object(reward)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        for achievement in achievements {
            let _: () = client
                .fluent()
                .update()
                .in_col(collections::ACHIEVEMENTS)
                .document_id(&achievement.id)
                .object(achievement)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        tracing::info!(
            rewards = rewards.len(),
            achievements = achievements.len(),
            "Catalog seeded"
        );
        Ok(())
    }

    /// Public download URL of an object in the storage bucket.
    fn download_url(&self, path: &str) -> String {
        format!(
            "{}/{}/o/{}?alt=media",
            STORAGE_BASE_URL,
            self.storage_bucket,
            urlencoding::encode(path)
        )
    }

    async fn read_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Handle whose reads run inside `transaction`. Firestore locks what it
    /// reads and aborts the commit of any conflicting writer.
    fn transactional(
        client: &FirestoreDb,
        transaction: &FirestoreTransaction<'_>,
    ) -> FirestoreDb {
        client.clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
            transaction.transaction_id().clone(),
        ))
    }

    /// Commit staged writes, or roll back when nothing needs writing.
    async fn finish<T>(
        transaction: FirestoreTransaction<'_>,
        staged: Result<Staged<T>, TxError>,
    ) -> Result<T, TxError> {
        match staged {
            Ok(Staged::Write(value)) => match transaction.commit().await {
                Ok(_) => Ok(value),
                Err(e) if is_aborted(&e) => Err(TxError::Aborted),
                Err(e) => Err(TxError::Failed(AppError::Database(format!(
                    "Transaction commit failed: {}",
                    e
                )))),
            },
            Ok(Staged::Skip(value)) => {
                let _ = transaction.rollback().await;
                Ok(value)
            }
            Err(e) => {
                let _ = transaction.rollback().await;
                Err(e)
            }
        }
    }

    async fn begin(client: &FirestoreDb) -> Result<FirestoreTransaction<'_>, TxError> {
        client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)).into())
    }

    /// One attempt at a keyed counter increment.
    ///
    /// The profile and the award marker are both read in the transaction,
    /// so two concurrent credits can never both see the same counters.
    async fn try_increment(
        &self,
        user_id: &str,
        delta: StatsDelta,
        award_key: &str,
    ) -> Result<(bool, UserProfile), TxError> {
        let client = self.get_client()?;
        let mut transaction = Self::begin(client).await?;
        let db = Self::transactional(client, &transaction);

        let staged = async {
            let mut profile: UserProfile = read_in(&db, collections::USERS, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

            let marker_id = AwardMarker::doc_id(user_id, award_key);
            let marker: Option<AwardMarker> =
                read_in(&db, collections::AWARDS, &marker_id).await?;
            if marker.is_some() {
                return Ok(Staged::Skip((false, profile)));
            }

            let now = Utc::now();
            profile.credit(delta);
            profile.last_active = now;

            stage_write(&db, &mut transaction, collections::USERS, user_id, &profile)?;
            stage_write(
                &db,
                &mut transaction,
                collections::AWARDS,
                &marker_id,
                &AwardMarker::new(user_id, award_key, delta, now),
            )?;
            Ok::<_, TxError>(Staged::Write((true, profile)))
        }
        .await;

        Self::finish(transaction, staged).await
    }

    async fn try_touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), TxError> {
        let client = self.get_client()?;
        let mut transaction = Self::begin(client).await?;
        let db = Self::transactional(client, &transaction);

        let staged = async {
            let mut profile: UserProfile = read_in(&db, collections::USERS, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
            profile.last_active = at;
            stage_write(&db, &mut transaction, collections::USERS, user_id, &profile)?;
            Ok::<_, TxError>(Staged::Write(()))
        }
        .await;

        Self::finish(transaction, staged).await
    }

    /// One attempt at writing a document only if `doc_id` does not exist yet.
    async fn try_create_if_absent<T>(
        &self,
        collection: &str,
        doc_id: &str,
        object: &T,
    ) -> Result<bool, TxError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync,
    {
        let client = self.get_client()?;
        let mut transaction = Self::begin(client).await?;
        let db = Self::transactional(client, &transaction);

        let staged = async {
            let existing: Option<T> = read_in(&db, collection, doc_id).await?;
            if existing.is_some() {
                return Ok(Staged::Skip(false));
            }
            stage_write(&db, &mut transaction, collection, doc_id, object)?;
            Ok::<_, TxError>(Staged::Write(true))
        }
        .await;

        Self::finish(transaction, staged).await
    }

    async fn try_mark_verified(
        &self,
        planting_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PlantingRecord>, TxError> {
        let client = self.get_client()?;
        let mut transaction = Self::begin(client).await?;
        let db = Self::transactional(client, &transaction);

        let staged = async {
            let mut planting: PlantingRecord = read_in(&db, collections::TREES, planting_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Planting {}", planting_id)))?;
            if !planting.mark_verified(at) {
                return Ok(Staged::Skip(None));
            }
            stage_write(&db, &mut transaction, collections::TREES, planting_id, &planting)?;
            Ok::<_, TxError>(Staged::Write(Some(planting)))
        }
        .await;

        Self::finish(transaction, staged).await
    }

    /// One attempt at debiting the balance and writing the audit record.
    async fn try_redeem(&self, record: &RedemptionRecord) -> Result<(), TxError> {
        let client = self.get_client()?;
        let mut transaction = Self::begin(client).await?;
        let db = Self::transactional(client, &transaction);

        let staged = async {
            let mut profile: UserProfile = read_in(&db, collections::USERS, &record.user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {}", record.user_id)))?;

            // Authoritative balance check against the locked profile
            profile.debit(record.total_cost)?;

            stage_write(
                &db,
                &mut transaction,
                collections::USERS,
                &record.user_id,
                &profile,
            )?;
            stage_write(
                &db,
                &mut transaction,
                collections::REDEMPTIONS,
                &record.id,
                record,
            )?;
            Ok::<_, TxError>(Staged::Write(()))
        }
        .await;

        Self::finish(transaction, staged).await
    }

    /// Write a document only if no document with `doc_id` exists yet.
    async fn create_if_absent<T>(
        &self,
        collection: &str,
        doc_id: &str,
        object: &T,
    ) -> Result<bool, AppError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync,
    {
        for attempt in 1..=TRANSACTION_ATTEMPTS {
            match self.try_create_if_absent(collection, doc_id, object).await {
                Err(TxError::Aborted) => {
                    tracing::debug!(collection, doc_id, attempt, "Create aborted on contention");
                    back_off(attempt).await;
                }
                other => return other.map_err(|e| e.into_app(collection)),
            }
        }
        Err(contended(collection))
    }

    async fn load_achievements(&self) -> Result<Vec<Achievement>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACHIEVEMENTS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn load_user_achievements(&self, user_id: &str) -> Result<Vec<UserAchievement>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USER_ACHIEVEMENTS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl BackendClient for FirestoreBackend {
    // ─── Records ─────────────────────────────────────────────────

    async fn create_record(
        &self,
        record: Record,
        idempotency_key: Option<&str>,
    ) -> Result<CreatedRecord, AppError> {
        record.validate()?;

        match record {
            Record::Planting(planting) => {
                let doc_id = idempotency_key
                    .unwrap_or(&planting.idempotency_key)
                    .to_string();
                let stored = planting.into_record(doc_id.clone());
                let created = self
                    .create_if_absent(collections::TREES, &doc_id, &stored)
                    .await?;
                if created {
                    tracing::info!(planting_id = %doc_id, user_id = %stored.user_id, "Planting created");
                } else {
                    tracing::debug!(planting_id = %doc_id, "Planting already exists (idempotent skip)");
                }
                Ok(CreatedRecord {
                    id: doc_id,
                    created,
                })
            }
            Record::Profile(profile) => {
                let created = self
                    .create_if_absent(collections::USERS, &profile.id, &profile)
                    .await?;
                Ok(CreatedRecord {
                    id: profile.id,
                    created,
                })
            }
            Record::Redemption(_) => Err(AppError::Validation(
                "Redemption records are only written by redeem".to_string(),
            )),
        }
    }

    // ─── Profiles ────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        self.read_profile(user_id).await
    }

    async fn touch_profile(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        for attempt in 1..=TRANSACTION_ATTEMPTS {
            match self.try_touch(user_id, at).await {
                Err(TxError::Aborted) => {
                    tracing::debug!(user_id, attempt, "Profile touch aborted on contention");
                    back_off(attempt).await;
                }
                other => return other.map_err(|e| e.into_app(collections::USERS)),
            }
        }
        Err(contended(collections::USERS))
    }

    async fn atomic_increment(
        &self,
        user_id: &str,
        delta: StatsDelta,
        award_key: &str,
    ) -> Result<IncrementOutcome, AppError> {
        for attempt in 1..=TRANSACTION_ATTEMPTS {
            let (applied, profile) = match self.try_increment(user_id, delta, award_key).await {
                Ok(outcome) => outcome,
                Err(TxError::Aborted) => {
                    tracing::debug!(user_id, award_key, attempt, "Increment aborted on contention");
                    back_off(attempt).await;
                    continue;
                }
                Err(TxError::Failed(e)) => return Err(e),
            };

            tracing::info!(
                user_id,
                award_key,
                applied,
                trees = profile.trees,
                coins = profile.coins,
                "Profile counters incremented"
            );

            return Ok(IncrementOutcome {
                applied,
                profile: Some(profile),
            });
        }
        Err(contended(collections::USERS))
    }

    async fn list_profiles(
        &self,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UserProfile>, AppError> {
        let profiles: Vec<UserProfile> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(profiles
            .into_iter()
            .filter(|p| active_since.is_none_or(|since| p.last_active >= since))
            .collect())
    }

    // ─── Plantings ───────────────────────────────────────────────

    async fn get_planting(&self, planting_id: &str) -> Result<Option<PlantingRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TREES)
            .obj()
            .one(planting_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_plantings(&self, user_id: &str) -> Result<Vec<PlantingRecord>, AppError> {
        let user_id = user_id.to_string();
        let mut plantings: Vec<PlantingRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TREES)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sort_newest_first(&mut plantings);
        Ok(plantings)
    }

    async fn mark_planting_verified(
        &self,
        planting_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PlantingRecord>, AppError> {
        for attempt in 1..=TRANSACTION_ATTEMPTS {
            match self.try_mark_verified(planting_id, at).await {
                Ok(Some(planting)) => {
                    tracing::info!(planting_id, "Planting verified");
                    return Ok(Some(planting));
                }
                Ok(None) => return Ok(None),
                Err(TxError::Aborted) => {
                    tracing::debug!(planting_id, attempt, "Verification aborted on contention");
                    back_off(attempt).await;
                }
                Err(TxError::Failed(e)) => return Err(e),
            }
        }
        Err(contended(collections::TREES))
    }

    // ─── Storage ─────────────────────────────────────────────────

    async fn upload_blob(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = format!("{}/{}/o", STORAGE_BASE_URL, self.storage_bucket);

        let mut request = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", path)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.storage_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upload(format!("HTTP {}: {}", status, body)));
        }

        Ok(self.download_url(path))
    }

    // ─── Rewards ─────────────────────────────────────────────────

    async fn get_catalog(&self) -> Result<Vec<RewardCatalogItem>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::REWARDS)
            .order_by([("cost", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<RewardCatalogItem>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::REWARDS)
            .obj()
            .one(reward_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Debit and audit record commit in one transaction.
    async fn redeem(
        &self,
        user_id: &str,
        reward_id: &str,
        quantity: u32,
    ) -> Result<RedemptionRecord, AppError> {
        let reward = self
            .get_reward(reward_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reward {}", reward_id)))?;
        let total_cost = reward
            .total_cost(quantity)
            .ok_or_else(|| AppError::Validation("Quantity too large".to_string()))?;

        let record = RedemptionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            reward_id: reward_id.to_string(),
            quantity,
            total_cost,
            created_at: Utc::now(),
        };
        Record::Redemption(record.clone()).validate()?;

        for attempt in 1..=TRANSACTION_ATTEMPTS {
            match self.try_redeem(&record).await {
                Ok(()) => {
                    tracing::info!(
                        user_id,
                        reward_id,
                        quantity,
                        total_cost,
                        "Reward redeemed atomically"
                    );
                    return Ok(record);
                }
                Err(TxError::Aborted) => {
                    tracing::debug!(user_id, reward_id, attempt, "Redemption aborted on contention");
                    back_off(attempt).await;
                }
                Err(TxError::Failed(e)) => return Err(e),
            }
        }
        Err(contended(collections::REDEMPTIONS))
    }

    // ─── Achievements ────────────────────────────────────────────

    async fn run_rule(&self, rule: Rule, user_id: &str) -> Result<Vec<Achievement>, AppError> {
        match rule {
            Rule::CheckAchievements => {
                let profile = self
                    .read_profile(user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
                let catalog = self.load_achievements().await?;
                let earned: HashSet<String> = self
                    .load_user_achievements(user_id)
                    .await?
                    .into_iter()
                    .map(|ua| ua.achievement_id)
                    .collect();

                let candidates: Vec<Achievement> = AchievementRules::evaluate(&profile, &catalog, &earned)
                    .into_iter()
                    .cloned()
                    .collect();

                let now = Utc::now();
                let mut newly = Vec::with_capacity(candidates.len());
                for achievement in candidates {
                    // Keyed bonus before the marker: a failed bonus is retried
                    // by the next evaluation
                    if achievement.bonus_coins > 0 {
                        self.atomic_increment(
                            user_id,
                            StatsDelta::bonus(achievement.bonus_coins),
                            &achievement.award_key(),
                        )
                        .await?;
                    }

                    let earned = UserAchievement {
                        user_id: user_id.to_string(),
                        achievement_id: achievement.id.clone(),
                        earned_at: now,
                    };
                    let doc_id = format!("{}_{}", user_id, urlencoding::encode(&achievement.id));
                    if self
                        .create_if_absent(collections::USER_ACHIEVEMENTS, &doc_id, &earned)
                        .await?
                    {
                        newly.push(achievement);
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
        let catalog = self.load_achievements().await?;
        let mut earned: Vec<(UserAchievement, Achievement)> = self
            .load_user_achievements(user_id)
            .await?
            .into_iter()
            .filter_map(|ua| {
                catalog
                    .iter()
                    .find(|a| a.id == ua.achievement_id)
                    .map(|a| (ua.clone(), a.clone()))
            })
            .collect();
        earned.sort_by(|a, b| b.0.earned_at.cmp(&a.0.earned_at));
        Ok(earned)
    }
}
