// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accrual;
pub mod capture;
pub mod geocode;
pub mod leaderboard;
pub mod liveness;
pub mod profile;
pub mod redemption;
pub mod registry;
pub mod retry;
pub mod verification;
pub mod workflow;

pub use accrual::{AccrualOutcome, RewardAccrual};
pub use capture::{CameraDevice, CameraStream, CaptureSession, Facing, ImageFormat, Photo};
pub use geocode::{NominatimGeocoder, ReverseGeocoder};
pub use leaderboard::{leaderboard, LeaderboardEntry, LeaderboardPeriod, LeaderboardSort};
pub use liveness::{DelayLivenessVerifier, LivenessVerifier};
pub use profile::ensure_profile;
pub use redemption::{RedemptionReceipt, RedemptionService};
pub use registry::{WorkflowHandle, WorkflowRegistry};
pub use retry::RetryPolicy;
pub use verification::{verify_planting, VerificationOutcome};
pub use workflow::{CommitReceipt, PlantingWorkflow, WorkflowStep, WorkflowView};
