// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! TreeQuest API Server
//!
//! Guides users through submitting tree plantings, credits Green Coins and
//! serves the reward catalog, backed by Firestore, Supabase or memory.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treequest::{
    backend::{BackendClient, FirestoreBackend, MemoryBackend, SupabaseBackend},
    config::{BackendKind, Config},
    AppState,
};

/// How often idle workflows are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = config.backend.as_str(),
        reward = config.planting_reward,
        policy = ?config.reward_policy,
        "Starting TreeQuest API"
    );

    let backend: Arc<dyn BackendClient> = match config.backend {
        BackendKind::Memory => {
            tracing::warn!("Using in-memory backend; data is lost on restart");
            Arc::new(MemoryBackend::seeded())
        }
        BackendKind::Firestore => Arc::new(
            FirestoreBackend::new(&config.gcp_project_id, &config.storage_bucket).await?,
        ),
        BackendKind::Supabase => {
            tracing::info!(url = %config.supabase_url, "Using Supabase backend");
            Arc::new(SupabaseBackend::new(
                &config.supabase_url,
                &config.supabase_service_key,
                &config.storage_bucket,
            ))
        }
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), backend));

    // Expire abandoned workflows even when nobody starts a new one
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let expired = sweeper.workflows.sweep_expired();
            if expired > 0 {
                tracing::info!(expired, remaining = sweeper.workflows.len(), "Workflow sweep");
            }
        }
    });

    // Build router
    let app = treequest::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("treequest=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
