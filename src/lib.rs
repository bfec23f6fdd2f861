// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! TreeQuest: gamified tree planting.
//!
//! This crate provides the backend API for submitting tree plantings through
//! a guided workflow, crediting Green Coins, and redeeming rewards against a
//! swappable managed backend.

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod time_utils;

use backend::BackendClient;
use config::Config;
use services::{
    CameraDevice, DelayLivenessVerifier, LivenessVerifier, NominatimGeocoder, RedemptionService,
    ReverseGeocoder, RewardAccrual, WorkflowRegistry,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn BackendClient>,
    pub accrual: RewardAccrual,
    pub redemption: RedemptionService,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub liveness: Arc<dyn LivenessVerifier>,
    /// Server-attached camera, if any. Clients normally upload photos.
    pub camera: Option<Arc<dyn CameraDevice>>,
    pub workflows: WorkflowRegistry,
}

impl AppState {
    /// State with the default collaborators for `config`.
    pub fn new(config: Config, backend: Arc<dyn BackendClient>) -> Self {
        let geocoder = Arc::new(NominatimGeocoder::new(&config.geocoder_url));
        let liveness = Arc::new(DelayLivenessVerifier::new(config.liveness_delay));
        Self::with_collaborators(config, backend, geocoder, liveness)
    }

    pub fn with_collaborators(
        config: Config,
        backend: Arc<dyn BackendClient>,
        geocoder: Arc<dyn ReverseGeocoder>,
        liveness: Arc<dyn LivenessVerifier>,
    ) -> Self {
        let accrual = RewardAccrual::new(
            backend.clone(),
            config.planting_reward,
            config.reward_policy,
        );
        let redemption = RedemptionService::new(backend.clone());
        let workflows = WorkflowRegistry::with_idle_ttl(config.workflow_idle_ttl);
        Self {
            config,
            backend,
            accrual,
            redemption,
            geocoder,
            liveness,
            camera: None,
            workflows,
        }
    }
}
