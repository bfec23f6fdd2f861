// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use base64::Engine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use treequest::backend::{FirestoreBackend, MemoryBackend};
use treequest::config::Config;
use treequest::error::AppError;
use treequest::middleware::auth::create_jwt;
use treequest::models::{Coordinates, UserProfile};
use treequest::routes::create_router;
use treequest::services::{
    CameraDevice, CameraStream, DelayLivenessVerifier, Facing, LivenessVerifier, ReverseGeocoder,
};
use treequest::AppState;

/// Smallest byte strings that sniff as each format.
#[allow(dead_code)]
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
#[allow(dead_code)]
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test Firestore backend (emulator).
#[allow(dead_code)]
pub async fn test_firestore() -> FirestoreBackend {
    FirestoreBackend::new("test-project", "test-bucket")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Generate a unique user ID for test isolation.
#[allow(dead_code)]
pub fn unique_user_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// Profile with a starting balance.
#[allow(dead_code)]
pub fn profile_with_coins(user_id: &str, coins: i64) -> UserProfile {
    let mut profile = UserProfile::new(user_id, Some("Test User".to_string()), None);
    profile.coins = coins;
    profile
}

#[allow(dead_code)]
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

// ─── Fakes ───────────────────────────────────────────────────

/// Geocoder returning a fixed place name.
#[allow(dead_code)]
pub struct FixedGeocoder(pub &'static str);

#[async_trait]
impl ReverseGeocoder for FixedGeocoder {
    async fn reverse(&self, _coordinates: Coordinates) -> Result<String, AppError> {
        Ok(self.0.to_string())
    }
}

/// Geocoder that is always unreachable.
#[allow(dead_code)]
pub struct OfflineGeocoder;

#[async_trait]
impl ReverseGeocoder for OfflineGeocoder {
    async fn reverse(&self, _coordinates: Coordinates) -> Result<String, AppError> {
        Err(AppError::Device("Geocoder unreachable".to_string()))
    }
}

/// Liveness verifier that rejects every selfie.
#[allow(dead_code)]
pub struct RejectingLiveness;

#[async_trait]
impl LivenessVerifier for RejectingLiveness {
    async fn verify(&self, _user_id: &str, _selfie: &[u8]) -> Result<bool, AppError> {
        Ok(false)
    }
}

/// Camera that counts opened and released streams.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeCamera {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FakeCamera {
    /// Streams currently open.
    pub fn active(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

#[allow(dead_code)]
struct FakeStream {
    released: Arc<AtomicUsize>,
    stopped: bool,
}

#[async_trait]
impl CameraStream for FakeStream {
    async fn capture_jpeg(&mut self) -> Result<Vec<u8>, AppError> {
        Ok(JPEG_BYTES.to_vec())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self, _facing: Facing) -> Result<Box<dyn CameraStream>, AppError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            released: self.released.clone(),
            stopped: false,
        }))
    }
}

// ─── App ─────────────────────────────────────────────────────

/// Test app over the seeded in-memory backend.
/// Returns the router, the shared state and the backend.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryBackend>) {
    create_test_app_with(Config::default(), Arc::new(DelayLivenessVerifier::new(
        std::time::Duration::ZERO,
    )))
}

#[allow(dead_code)]
pub fn create_test_app_with(
    config: Config,
    liveness: Arc<dyn LivenessVerifier>,
) -> (axum::Router, Arc<AppState>, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::seeded());
    let mut state = AppState::with_collaborators(
        config,
        backend.clone(),
        Arc::new(FixedGeocoder("Central Park, New York")),
        liveness,
    );
    state.camera = Some(Arc::new(FakeCamera::default()));
    let state = Arc::new(state);

    (create_router(state.clone()), state, backend)
}

/// Create a test JWT token signed with the test config key.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, role: Option<&str>) -> String {
    create_jwt(user_id, role, &Config::default().jwt_signing_key).unwrap()
}
