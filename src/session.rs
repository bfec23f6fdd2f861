// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-request session context passed explicitly to the services.

use crate::middleware::auth::AuthUser;
use crate::models::UserProfile;

/// Identity of the signed-in user plus their cached profile.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Last profile read from the store; refreshed after writes.
    pub profile: Option<UserProfile>,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            email: None,
            role: None,
            profile: None,
        }
    }

    pub fn from_auth(user: &AuthUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn is_service_role(&self) -> bool {
        self.role.as_deref() == Some(crate::middleware::auth::SERVICE_ROLE)
    }

    /// Balance as last seen by this session, if the profile is loaded.
    pub fn cached_coins(&self) -> Option<i64> {
        self.profile.as_ref().map(|p| p.coins)
    }
}
