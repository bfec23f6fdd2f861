// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile bootstrap on sign-in.

use chrono::Utc;

use crate::backend::BackendClient;
use crate::error::AppError;
use crate::models::{Record, UserProfile};
use crate::session::SessionContext;

/// Load the session user's profile, creating it on first sign-in.
///
/// Existing profiles get `last_active` stamped. The result is cached in
/// the session.
pub async fn ensure_profile(
    backend: &dyn BackendClient,
    session: &mut SessionContext,
) -> Result<UserProfile, AppError> {
    let now = Utc::now();

    let profile = match backend.get_profile(&session.user_id).await? {
        Some(mut existing) => {
            backend.touch_profile(&session.user_id, now).await?;
            existing.last_active = now;
            existing
        }
        None => {
            let fresh = UserProfile::new(
                session.user_id.clone(),
                session.name.clone(),
                session.email.clone(),
            );
            let created = backend
                .create_record(Record::Profile(fresh.clone()), Some(&session.user_id))
                .await?;

            if created.created {
                tracing::info!(user_id = %session.user_id, "Created user profile");
                fresh
            } else {
                // Lost a race with another device; use the stored one
                backend
                    .get_profile(&session.user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User {}", session.user_id)))?
            }
        }
    };

    session.profile = Some(profile.clone());
    Ok(profile)
}
