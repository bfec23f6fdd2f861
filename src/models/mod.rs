// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod achievement;
pub mod planting;
pub mod record;
pub mod reward;
pub mod user;

pub use achievement::{Achievement, AchievementKind, AchievementRules, UserAchievement};
pub use planting::{Coordinates, NewPlanting, PlantingRecord, PlantingStatus, Species};
pub use record::Record;
pub use reward::{RedemptionRecord, RewardCatalogItem, RewardCategory};
pub use user::{AwardMarker, StatsDelta, UserProfile};
