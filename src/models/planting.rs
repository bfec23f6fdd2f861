// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Tree planting record model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::AppError;

/// Longest free-text species name accepted for "other".
const MAX_SPECIES_LEN: usize = 64;

/// Tree species offered by the wizard, or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Species {
    Oak,
    Pine,
    Maple,
    Other(String),
}

impl Species {
    /// Parse user input into a species. Empty input is rejected.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("Species is required".to_string()));
        }
        if trimmed.chars().count() > MAX_SPECIES_LEN {
            return Err(AppError::Validation(format!(
                "Species must be at most {} characters",
                MAX_SPECIES_LEN
            )));
        }
        Ok(Species::from(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Species::Oak => "oak",
            Species::Pine => "pine",
            Species::Maple => "maple",
            Species::Other(name) => name,
        }
    }
}

impl From<String> for Species {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "oak" => Species::Oak,
            "pine" => Species::Pine,
            "maple" => Species::Maple,
            _ => Species::Other(value),
        }
    }
}

impl From<Species> for String {
    fn from(value: Species) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device coordinates (WGS84 degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(format!("Invalid latitude: {}", lat)));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::Validation(format!("Invalid longitude: {}", lng)));
        }
        Ok(Self { lat, lng })
    }
}

/// Verification status of a planting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlantingStatus {
    Pending,
    Verified,
}

impl PlantingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlantingStatus::Pending => "pending",
            PlantingStatus::Verified => "verified",
        }
    }
}

/// A planting about to be created. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPlanting {
    pub user_id: String,
    pub species: Species,
    pub location: String,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub tree_photo: Option<String>,
    pub selfie: Option<String>,
    /// Identity of the logical submission; at most one record per key.
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl NewPlanting {
    /// Materialize the stored record under a store-assigned id.
    pub fn into_record(self, id: String) -> PlantingRecord {
        PlantingRecord {
            id,
            user_id: self.user_id,
            species: self.species,
            location: self.location,
            description: self.description,
            coordinates: self.coordinates,
            tree_photo: self.tree_photo,
            selfie: self.selfie,
            status: PlantingStatus::Pending,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            verified_at: None,
        }
    }
}

/// Stored planting record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantingRecord {
    /// Store-assigned id (also used as document ID)
    pub id: String,
    /// Owner (foreign key to the user profile)
    pub user_id: String,
    pub species: Species,
    /// Human-readable location
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Stored tree photo reference
    #[serde(default)]
    pub tree_photo: Option<String>,
    /// Stored selfie-with-tree reference
    #[serde(default)]
    pub selfie: Option<String>,
    pub status: PlantingStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

impl PlantingRecord {
    /// Flip the record to verified. Returns `false` if it already was.
    pub fn mark_verified(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == PlantingStatus::Verified {
            return false;
        }
        self.status = PlantingStatus::Verified;
        self.verified_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_species_parse_known_and_other() {
        assert_eq!(Species::parse("oak").unwrap(), Species::Oak);
        assert_eq!(Species::parse(" Maple ").unwrap(), Species::Maple);
        assert_eq!(
            Species::parse("Baobab").unwrap(),
            Species::Other("Baobab".to_string())
        );
    }

    #[test]
    fn test_species_parse_rejects_empty() {
        let err = Species::parse("   ").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_species_serializes_as_plain_string() {
        let json = serde_json::to_string(&Species::Pine).unwrap();
        assert_eq!(json, "\"pine\"");
        let other: Species = serde_json::from_str("\"Ginkgo\"").unwrap();
        assert_eq!(other, Species::Other("Ginkgo".to_string()));
    }

    #[test]
    fn test_coordinates_range_checked() {
        assert!(Coordinates::new(40.78, -73.96).is_ok());
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_mark_verified_only_once() {
        let mut record = NewPlanting {
            user_id: "u1".to_string(),
            species: Species::Oak,
            location: "Central Park".to_string(),
            description: None,
            coordinates: None,
            tree_photo: None,
            selfie: None,
            idempotency_key: "k1".to_string(),
            created_at: Utc::now(),
        }
        .into_record("t1".to_string());

        assert_eq!(record.status, PlantingStatus::Pending);
        assert!(record.mark_verified(Utc::now()));
        let first = record.verified_at;
        assert!(!record.mark_verified(Utc::now()));
        assert_eq!(record.verified_at, first);
    }
}
