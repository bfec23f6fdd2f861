// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Typed payloads handed to the backend's record-creation call.

use serde::Serialize;

use crate::backend::collections;
use crate::error::AppError;
use crate::models::{NewPlanting, RedemptionRecord, UserProfile};

const MAX_LOCATION_LEN: usize = 500;
const MAX_DESCRIPTION_LEN: usize = 2000;

/// One entity to be written, tagged by kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Planting(NewPlanting),
    Redemption(RedemptionRecord),
    Profile(UserProfile),
}

impl Record {
    /// Collection/table the record belongs to.
    pub fn collection(&self) -> &'static str {
        match self {
            Record::Planting(_) => collections::TREES,
            Record::Redemption(_) => collections::REDEMPTIONS,
            Record::Profile(_) => collections::USERS,
        }
    }

    /// Field-level checks run before anything is sent to a backend.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Record::Planting(p) => {
                require_non_empty("user_id", &p.user_id)?;
                require_non_empty("species", p.species.as_str())?;
                require_non_empty("location", &p.location)?;
                require_non_empty("idempotency_key", &p.idempotency_key)?;
                if p.location.chars().count() > MAX_LOCATION_LEN {
                    return Err(AppError::Validation("Location is too long".to_string()));
                }
                if p
                    .description
                    .as_ref()
                    .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
                {
                    return Err(AppError::Validation("Description is too long".to_string()));
                }
                Ok(())
            }
            Record::Redemption(r) => {
                require_non_empty("user_id", &r.user_id)?;
                require_non_empty("reward_id", &r.reward_id)?;
                if r.quantity == 0 {
                    return Err(AppError::Validation(
                        "Quantity must be at least 1".to_string(),
                    ));
                }
                if r.total_cost < 0 {
                    return Err(AppError::Validation(
                        "Total cost must not be negative".to_string(),
                    ));
                }
                Ok(())
            }
            Record::Profile(u) => {
                require_non_empty("id", &u.id)?;
                require_non_empty("name", &u.name)?;
                if u.coins < 0 || u.trees < 0 || u.streak < 0 {
                    return Err(AppError::Validation(
                        "Profile counters must not be negative".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
