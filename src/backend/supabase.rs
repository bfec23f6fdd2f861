// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase adapter: PostgREST tables, SQL functions and Storage.
//!
//! Counter increments, redemption and achievement checks run as Postgres
//! functions so the store evaluates them atomically. The schema and the
//! functions live in `supabase/migrations/` and must be applied before the
//! server starts:
//!
//! - `increment_user_stats(p_user_id, p_trees, p_coins, p_award_key)` adds the
//!   delta at most once per award key (tracked in `user_awards`) and returns
//!   the profile row plus `applied`.
//! - `redeem_reward(p_user_id, p_reward_id, p_quantity)` prices the order from
//!   `rewards`, debits under a row lock and returns the `redemptions` row. A
//!   low balance raises `insufficient_balance` with `{required, available}`
//!   as detail.
//! - `check_achievements(p_user_id)` returns only the achievements recorded
//!   by this call and credits each bonus under `achievement:{id}`.
//!
//! Missing rows raise `P0002`; bad arguments raise `22023`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::backend::{
    collections, BackendClient, CreatedRecord, IncrementOutcome, Rule,
};
use crate::error::AppError;
use crate::models::{
    Achievement, PlantingRecord, Record, RedemptionRecord, RewardCatalogItem, StatsDelta,
    UserAchievement, UserProfile,
};
use crate::time_utils::format_utc_rfc3339;

/// Error message raised by `redeem_reward` when the balance is too low.
const INSUFFICIENT_BALANCE: &str = "insufficient_balance";

/// Supabase REST client using the service-role key.
#[derive(Clone)]
pub struct SupabaseBackend {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    storage_bucket: String,
}

/// Row returned by `increment_user_stats`.
#[derive(Debug, Deserialize)]
struct IncrementRow {
    applied: bool,
    #[serde(flatten)]
    profile: UserProfile,
}

/// Joined row from `user_achievements` with its catalog entry.
#[derive(Debug, Deserialize)]
struct EarnedRow {
    #[serde(flatten)]
    earned: UserAchievement,
    achievement: Achievement,
}

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceDetails {
    required: i64,
    available: i64,
}

impl SupabaseBackend {
    pub fn new(base_url: &str, service_key: &str, storage_bucket: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            storage_bucket: storage_bucket.to_string(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.storage_bucket, path
        )
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.storage_bucket, path
        )
    }

    /// Attach the service-role credentials.
    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// GET rows from a table with PostgREST query parameters.
    async fn select_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, AppError> {
        let response = self
            .authed(self.http.get(self.rest_url(table)))
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.check_response_json(response).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, AppError> {
        let mut rows: Vec<T> = self.select_rows(table, params).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Insert one row; duplicates on `on_conflict` are ignored.
    ///
    /// Returns `true` when the row was written.
    async fn insert_ignoring_duplicates<T: Serialize + DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
        on_conflict: &str,
    ) -> Result<bool, AppError> {
        let response = self
            .authed(self.http.post(self.rest_url(table)))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&[row])
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let inserted: Vec<T> = self.check_response_json(response).await?;
        Ok(!inserted.is_empty())
    }

    /// Call a SQL function and parse its JSON result.
    async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        args: serde_json::Value,
    ) -> Result<T, AppError> {
        let response = self
            .authed(self.http.post(self.rpc_url(function)))
            .json(&args)
            .send()
            .await
            .map_err(|e| AppError::Database(format!("RPC {} failed: {}", function, e)))?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_postgrest_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Database(format!("JSON parse error: {}", e)))
    }
}

/// Translate a PostgREST error response into the error taxonomy.
fn map_postgrest_error(status: reqwest::StatusCode, body: &str) -> AppError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();

    if parsed.message == INSUFFICIENT_BALANCE {
        let details = parsed
            .details
            .as_deref()
            .and_then(|d| serde_json::from_str::<BalanceDetails>(d).ok());
        return match details {
            Some(d) => AppError::InsufficientBalance {
                required: d.required,
                available: d.available,
            },
            None => AppError::InsufficientBalance {
                required: 0,
                available: 0,
            },
        };
    }

    // no_data_found raised by the SQL functions
    if parsed.code.as_deref() == Some("P0002") {
        return AppError::NotFound(parsed.message);
    }

    // check_violation / invalid_parameter_value
    if matches!(parsed.code.as_deref(), Some("23514") | Some("22023")) {
        return AppError::Validation(parsed.message);
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        tracing::error!(status = %status, "Supabase rejected service credentials");
    }

    AppError::Database(format!("HTTP {}: {}", status, body))
}

#[async_trait]
impl BackendClient for SupabaseBackend {
    async fn create_record(
        &self,
        record: Record,
        idempotency_key: Option<&str>,
    ) -> Result<CreatedRecord, AppError> {
        record.validate()?;

        match record {
            Record::Planting(planting) => {
                let key = idempotency_key
                    .unwrap_or(&planting.idempotency_key)
                    .to_string();
                let mut planting = planting;
                planting.idempotency_key = key.clone();
                let stored = planting.into_record(uuid::Uuid::new_v4().to_string());

                let created = self
                    .insert_ignoring_duplicates(collections::TREES, &stored, "idempotency_key")
                    .await?;
                if created {
                    tracing::info!(planting_id = %stored.id, user_id = %stored.user_id, "Planting created");
                    return Ok(CreatedRecord {
                        id: stored.id,
                        created,
                    });
                }

                let existing: PlantingRecord = self
                    .select_one(
                        collections::TREES,
                        &[("idempotency_key", format!("eq.{}", key))],
                    )
                    .await?
                    .ok_or_else(|| {
                        AppError::Database(format!("Duplicate planting {} not readable", key))
                    })?;
                tracing::debug!(planting_id = %existing.id, "Planting already exists (idempotent skip)");
                Ok(CreatedRecord {
                    id: existing.id,
                    created: false,
                })
            }
            Record::Profile(profile) => {
                let created = self
                    .insert_ignoring_duplicates(collections::USERS, &profile, "id")
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

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        self.select_one(collections::USERS, &[("id", format!("eq.{}", user_id))])
            .await
    }

    async fn touch_profile(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let response = self
            .authed(self.http.patch(self.rest_url(collections::USERS)))
            .query(&[("id", format!("eq.{}", user_id))])
            .json(&json!({ "last_active": at }))
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_postgrest_error(status, &body));
        }
        Ok(())
    }

    async fn atomic_increment(
        &self,
        user_id: &str,
        delta: StatsDelta,
        award_key: &str,
    ) -> Result<IncrementOutcome, AppError> {
        let row: IncrementRow = self
            .rpc(
                "increment_user_stats",
                json!({
                    "p_user_id": user_id,
                    "p_trees": delta.trees,
                    "p_coins": delta.coins,
                    "p_award_key": award_key,
                }),
            )
            .await?;

        tracing::info!(
            user_id,
            award_key,
            applied = row.applied,
            coins = row.profile.coins,
            "Profile counters incremented"
        );

        Ok(IncrementOutcome {
            applied: row.applied,
            profile: Some(row.profile),
        })
    }

    async fn list_profiles(
        &self,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UserProfile>, AppError> {
        let mut params = vec![("select", "*".to_string())];
        if let Some(since) = active_since {
            params.push(("last_active", format!("gte.{}", format_utc_rfc3339(since))));
        }
        self.select_rows(collections::USERS, &params).await
    }

    async fn get_planting(&self, planting_id: &str) -> Result<Option<PlantingRecord>, AppError> {
        self.select_one(collections::TREES, &[("id", format!("eq.{}", planting_id))])
            .await
    }

    async fn list_plantings(&self, user_id: &str) -> Result<Vec<PlantingRecord>, AppError> {
        self.select_rows(
            collections::TREES,
            &[
                ("user_id", format!("eq.{}", user_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn mark_planting_verified(
        &self,
        planting_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PlantingRecord>, AppError> {
        // Conditional update: only pending rows flip
        let response = self
            .authed(self.http.patch(self.rest_url(collections::TREES)))
            .query(&[
                ("id", format!("eq.{}", planting_id)),
                ("status", "eq.pending".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({ "status": "verified", "verified_at": at }))
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut updated: Vec<PlantingRecord> = self.check_response_json(response).await?;
        if !updated.is_empty() {
            tracing::info!(planting_id, "Planting verified");
            return Ok(Some(updated.swap_remove(0)));
        }

        match self.get_planting(planting_id).await? {
            Some(_) => Ok(None),
            None => Err(AppError::NotFound(format!("Planting {}", planting_id))),
        }
    }

    async fn upload_blob(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        let response = self
            .authed(self.http.post(self.object_url(path)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upload(format!("HTTP {}: {}", status, body)));
        }

        Ok(self.public_url(path))
    }

    async fn get_catalog(&self) -> Result<Vec<RewardCatalogItem>, AppError> {
        self.select_rows(
            collections::REWARDS,
            &[("order", "cost.asc".to_string())],
        )
        .await
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<RewardCatalogItem>, AppError> {
        self.select_one(collections::REWARDS, &[("id", format!("eq.{}", reward_id))])
            .await
    }

    async fn redeem(
        &self,
        user_id: &str,
        reward_id: &str,
        quantity: u32,
    ) -> Result<RedemptionRecord, AppError> {
        if quantity == 0 {
            return Err(AppError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let record: RedemptionRecord = self
            .rpc(
                "redeem_reward",
                json!({
                    "p_user_id": user_id,
                    "p_reward_id": reward_id,
                    "p_quantity": quantity,
                }),
            )
            .await?;

        tracing::info!(
            user_id,
            reward_id,
            quantity,
            total_cost = record.total_cost,
            "Reward redeemed atomically"
        );
        Ok(record)
    }

    async fn run_rule(&self, rule: Rule, user_id: &str) -> Result<Vec<Achievement>, AppError> {
        self.rpc(rule.name(), json!({ "p_user_id": user_id })).await
    }

    async fn list_user_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<(UserAchievement, Achievement)>, AppError> {
        let rows: Vec<EarnedRow> = self
            .select_rows(
                collections::USER_ACHIEVEMENTS,
                &[
                    ("select", "*,achievement:achievements(*)".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                    ("order", "earned_at.desc".to_string()),
                ],
            )
            .await?;

        Ok(rows.into_iter().map(|r| (r.earned, r.achievement)).collect())
    }
}
