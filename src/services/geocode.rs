// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reverse geocoding of device coordinates into a display location.
//!
//! Best-effort: every failure becomes a retryable [`AppError::Device`] so the
//! caller can fall back to manual entry.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::Coordinates;
use crate::services::RetryPolicy;

/// Turns coordinates into a human-readable place name.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, coordinates: Coordinates) -> Result<String, AppError>;
}

/// Nominatim-compatible `/reverse` client.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("treequest/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn reverse_url(&self) -> String {
        format!("{}/reverse", self.base_url)
    }

    async fn lookup_once(&self, coordinates: Coordinates) -> Result<String, AppError> {
        let response = self
            .http
            .get(self.reverse_url())
            .query(&[
                ("format", "json".to_string()),
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lng.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Device(format!("Geocoder unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Device(format!(
                "Geocoder returned HTTP {}",
                response.status()
            )));
        }

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| AppError::Device(format!("Geocoder JSON parse error: {}", e)))?;

        display_name(body)
    }
}

fn display_name(body: ReverseResponse) -> Result<String, AppError> {
    if let Some(error) = body.error {
        return Err(AppError::Device(format!("Geocoder: {}", error)));
    }
    body.display_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::Device("No place found for coordinates".to_string()))
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, coordinates: Coordinates) -> Result<String, AppError> {
        let name = self
            .retry
            .run("reverse_geocode", || self.lookup_once(coordinates))
            .await?;
        tracing::debug!(lat = coordinates.lat, lng = coordinates.lng, "Reverse geocoded location");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_url() {
        let geocoder = NominatimGeocoder::new("https://nominatim.openstreetmap.org/");
        assert_eq!(
            geocoder.reverse_url(),
            "https://nominatim.openstreetmap.org/reverse"
        );
    }

    #[test]
    fn test_display_name_extraction() {
        let body: ReverseResponse = serde_json::from_str(
            r#"{"place_id":1,"display_name":"Central Park, Manhattan, New York"}"#,
        )
        .unwrap();
        assert_eq!(
            display_name(body).unwrap(),
            "Central Park, Manhattan, New York"
        );
    }

    #[test]
    fn test_unable_to_geocode_is_device_error() {
        let body: ReverseResponse =
            serde_json::from_str(r#"{"error":"Unable to geocode"}"#).unwrap();
        let err = display_name(body).unwrap_err();
        assert!(matches!(err, AppError::Device(_)));
        assert!(err.is_retryable());
    }
}
