// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Planting verification by a trusted reviewer.

use chrono::Utc;
use serde::Serialize;

use crate::backend::BackendClient;
use crate::config::RewardPolicy;
use crate::error::AppError;
use crate::models::PlantingRecord;
use crate::services::{AccrualOutcome, RewardAccrual};
use crate::session::SessionContext;

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub planting: PlantingRecord,
    /// Present when credit is deferred to verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit: Option<AccrualOutcome>,
}

/// Flip a pending planting to verified, exactly once.
pub async fn verify_planting(
    backend: &dyn BackendClient,
    accrual: &RewardAccrual,
    verifier: &SessionContext,
    planting_id: &str,
) -> Result<VerificationOutcome, AppError> {
    if !verifier.is_service_role() {
        return Err(AppError::Forbidden(
            "Only reviewers can verify plantings".to_string(),
        ));
    }

    let planting = match backend.mark_planting_verified(planting_id, Utc::now()).await? {
        Some(planting) => planting,
        None => return retry_deferred_credit(backend, accrual, planting_id).await,
    };

    tracing::info!(
        planting_id,
        owner = %planting.user_id,
        verifier = %verifier.user_id,
        "Planting verified"
    );

    let credit = match accrual.policy() {
        RewardPolicy::OnVerify => Some(
            accrual
                .credit_planting(&planting.user_id, &planting.id)
                .await?,
        ),
        RewardPolicy::OnSubmit => None,
    };

    Ok(VerificationOutcome { planting, credit })
}

/// A repeated verify of an already verified planting.
///
/// Under `OnVerify` the first call may have flipped the status and then
/// failed to credit; the keyed credit is applied now. Anything else is a
/// conflict.
async fn retry_deferred_credit(
    backend: &dyn BackendClient,
    accrual: &RewardAccrual,
    planting_id: &str,
) -> Result<VerificationOutcome, AppError> {
    let already_verified =
        || AppError::Conflict(format!("Planting {} is already verified", planting_id));

    if accrual.policy() != RewardPolicy::OnVerify {
        return Err(already_verified());
    }

    let planting = backend
        .get_planting(planting_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Planting {}", planting_id)))?;
    let credit = accrual
        .credit_planting(&planting.user_id, &planting.id)
        .await?;
    if !credit.applied {
        return Err(already_verified());
    }

    tracing::info!(
        planting_id,
        owner = %planting.user_id,
        "Deferred credit applied on repeated verification"
    );
    Ok(VerificationOutcome {
        planting,
        credit: Some(credit),
    })
}
