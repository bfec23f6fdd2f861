// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Coins credited for one planting in the observed configuration.
pub const DEFAULT_PLANTING_REWARD: i64 = 100;

/// Which backend adapter serves the Backend Client contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Process-local store (development and tests).
    Memory,
    Firestore,
    Supabase,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Firestore => "firestore",
            BackendKind::Supabase => "supabase",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "firestore" => Ok(BackendKind::Firestore),
            "supabase" => Ok(BackendKind::Supabase),
            _ => Err(ConfigError::Invalid("BACKEND", s.to_string())),
        }
    }
}

/// When a planting is credited to the user's tree count and coin balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewardPolicy {
    /// Credit when the planting record is committed (status = pending).
    #[default]
    OnSubmit,
    /// Credit only when a verifier marks the planting as verified.
    OnVerify,
}

impl FromStr for RewardPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_submit" | "submit" => Ok(RewardPolicy::OnSubmit),
            "on_verify" | "verify" => Ok(RewardPolicy::OnVerify),
            _ => Err(ConfigError::Invalid("REWARD_POLICY", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Server ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// HS256 key used by the auth backend to sign session tokens
    pub jwt_signing_key: Vec<u8>,

    // --- Backend ---
    pub backend: BackendKind,
    /// GCP project ID (Firestore adapter)
    pub gcp_project_id: String,
    /// Supabase project URL, e.g. https://xyz.supabase.co
    pub supabase_url: String,
    /// Supabase service-role key (Supabase adapter)
    pub supabase_service_key: String,
    /// Storage bucket for planting photos
    pub storage_bucket: String,

    // --- Collaborators ---
    /// Nominatim-compatible reverse geocoding base URL
    pub geocoder_url: String,
    /// Fixed delay of the stub liveness verifier
    pub liveness_delay: Duration,
    /// Unfinished workflows idle this long are dropped
    pub workflow_idle_ttl: Duration,

    // --- Economy ---
    /// Coins credited per planting
    pub planting_reward: i64,
    pub reward_policy: RewardPolicy,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            backend: BackendKind::Memory,
            gcp_project_id: "test-project".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test_service_key".to_string(),
            storage_bucket: "trees".to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            liveness_delay: Duration::ZERO,
            workflow_idle_ttl: Duration::from_secs(30 * 60),
            planting_reward: DEFAULT_PLANTING_REWARD,
            reward_policy: RewardPolicy::OnSubmit,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let backend: BackendKind = env::var("BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()?;

        let (supabase_url, supabase_service_key) = if backend == BackendKind::Supabase {
            (
                env::var("SUPABASE_URL").map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
                env::var("SUPABASE_SERVICE_KEY")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("SUPABASE_SERVICE_KEY"))?,
            )
        } else {
            (
                env::var("SUPABASE_URL").unwrap_or_default(),
                env::var("SUPABASE_SERVICE_KEY").unwrap_or_default(),
            )
        };

        let planting_reward = parse_or("PLANTING_REWARD", DEFAULT_PLANTING_REWARD)?;
        if planting_reward <= 0 {
            return Err(ConfigError::Invalid(
                "PLANTING_REWARD",
                planting_reward.to_string(),
            ));
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            backend,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_service_key,
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "trees".to_string()),
            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            liveness_delay: Duration::from_millis(parse_or("LIVENESS_DELAY_MS", 2000u64)?),
            workflow_idle_ttl: Duration::from_secs(parse_or("WORKFLOW_IDLE_TTL_SECS", 1800u64)?),
            planting_reward,
            reward_policy: env::var("REWARD_POLICY")
                .map(|v| v.parse())
                .unwrap_or(Ok(RewardPolicy::OnSubmit))?,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("REWARD_POLICY", "on_verify");
        env::remove_var("BACKEND");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.reward_policy, RewardPolicy::OnVerify);
        assert_eq!(config.planting_reward, DEFAULT_PLANTING_REWARD);
        assert_eq!(config.port, 8080);
        assert_eq!(config.workflow_idle_ttl, Duration::from_secs(1800));

        env::remove_var("REWARD_POLICY");
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("Firestore".parse::<BackendKind>().unwrap(), BackendKind::Firestore);
        assert_eq!(" supabase ".parse::<BackendKind>().unwrap(), BackendKind::Supabase);
        assert!("mongo".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_reward_policy_parsing() {
        assert_eq!("verify".parse::<RewardPolicy>().unwrap(), RewardPolicy::OnVerify);
        assert_eq!(RewardPolicy::default(), RewardPolicy::OnSubmit);
        assert!("never".parse::<RewardPolicy>().is_err());
    }
}
