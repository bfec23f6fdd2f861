// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP surface: a public health check plus the authenticated API and
//! planting workflow routes.

pub mod api;
pub mod plantings;

use crate::middleware::auth::require_auth;
use crate::middleware::security::add_security_headers;
use crate::AppState;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, request::Parts, HeaderValue, Method};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Request body limit; photo data URLs are base64 (4/3 of the image size).
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
    /// Which managed backend this instance talks to
    pub backend: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id: option_env!("BUILD_ID").unwrap_or("unknown").to_string(),
        backend: state.config.backend.as_str().to_string(),
    })
}

/// The configured frontend, plus any local dev server.
fn is_allowed_origin(origin: &str, frontend_url: &str) -> bool {
    origin == frontend_url
        || origin.starts_with("http://localhost")
        || origin.starts_with("http://127.0.0.1")
}

fn cors_layer(frontend_url: String) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .is_ok_and(|o| is_allowed_origin(o, &frontend_url))
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let authenticated = api::routes()
        .merge(plantings::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(add_security_headers))
        .layer(cors_layer(state.config.frontend_url.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
