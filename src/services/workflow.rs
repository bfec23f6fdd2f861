// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tree planting workflow.
//!
//! Steps run strictly forward:
//!
//! ```text
//! Details -> TreePhoto -> SelfieVerification -> LivenessCheck -> ReadyToCommit -> Committed
//! ```
//!
//! The only backward moves are discarding a captured photo (which stays on
//! the same step) and a failed liveness check (back to SelfieVerification).
//! Any non-terminal step may be cancelled.
//!
//! Commit is retryable: photos already uploaded keep their stored reference,
//! a planting already created is not created again, and the counter
//! increment is keyed by the planting id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::config::RewardPolicy;
use crate::error::AppError;
use crate::models::{Coordinates, NewPlanting, Record, Species};
use crate::services::capture::{CameraDevice, CaptureSession, Facing, Photo};
use crate::services::{AccrualOutcome, LivenessVerifier, ReverseGeocoder, RewardAccrual};

/// Blob field names used in storage paths.
const TREE_PHOTO_FIELD: &str = "treePhoto";
const SELFIE_FIELD: &str = "selfie";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Details,
    TreePhoto,
    SelfieVerification,
    LivenessCheck,
    ReadyToCommit,
    Committed,
    Cancelled,
}

impl WorkflowStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStep::Committed | WorkflowStep::Cancelled)
    }

    /// 1-based position shown in the wizard's progress indicator.
    pub fn position(&self) -> u8 {
        match self {
            WorkflowStep::Details => 1,
            WorkflowStep::TreePhoto => 2,
            WorkflowStep::SelfieVerification => 3,
            WorkflowStep::LivenessCheck => 4,
            WorkflowStep::ReadyToCommit | WorkflowStep::Committed => 5,
            WorkflowStep::Cancelled => 0,
        }
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReceipt {
    pub planting_id: String,
    /// `false` when a previous attempt had already created the record
    pub created: bool,
    /// Present when credit is granted on submit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit: Option<AccrualOutcome>,
}

/// Serializable snapshot of a workflow for clients.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowView {
    pub id: Uuid,
    pub step: WorkflowStep,
    pub position: u8,
    pub species: Option<String>,
    pub location: String,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub has_tree_photo: bool,
    pub has_selfie: bool,
    pub camera: Option<Facing>,
    pub planting_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One in-progress planting submission.
pub struct PlantingWorkflow {
    id: Uuid,
    user_id: String,
    step: WorkflowStep,

    species: Option<Species>,
    location: String,
    description: Option<String>,
    coordinates: Option<Coordinates>,

    tree_photo: Option<Photo>,
    selfie: Option<Photo>,
    capture: Option<CaptureSession>,

    /// Identity of this logical submission, stable across commit retries
    idempotency_key: String,
    planting_id: Option<String>,
    credited: bool,
    created_at: DateTime<Utc>,
}

impl PlantingWorkflow {
    pub fn new(user_id: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            user_id: user_id.into(),
            step: WorkflowStep::Details,
            species: None,
            location: String::new(),
            description: None,
            coordinates: None,
            tree_photo: None,
            selfie: None,
            capture: None,
            idempotency_key: id.to_string(),
            planting_id: None,
            credited: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn tree_photo(&self) -> Option<&Photo> {
        self.tree_photo.as_ref()
    }

    pub fn selfie(&self) -> Option<&Photo> {
        self.selfie.as_ref()
    }

    pub fn camera_active(&self) -> bool {
        self.capture.is_some()
    }

    pub fn view(&self) -> WorkflowView {
        WorkflowView {
            id: self.id,
            step: self.step,
            position: self.step.position(),
            species: self.species.as_ref().map(|s| s.to_string()),
            location: self.location.clone(),
            description: self.description.clone(),
            coordinates: self.coordinates,
            has_tree_photo: self.tree_photo.is_some(),
            has_selfie: self.selfie.is_some(),
            camera: self.capture.as_ref().map(|c| c.facing()),
            planting_id: self.planting_id.clone(),
            created_at: self.created_at,
        }
    }

    fn require_step(&self, expected: WorkflowStep, action: &str) -> Result<(), AppError> {
        if self.step != expected {
            return Err(AppError::Conflict(format!(
                "Cannot {} while at step {:?}",
                action, self.step
            )));
        }
        Ok(())
    }

    fn photo_step_facing(&self, action: &str) -> Result<Facing, AppError> {
        match self.step {
            WorkflowStep::TreePhoto => Ok(Facing::Rear),
            WorkflowStep::SelfieVerification => Ok(Facing::Front),
            step => Err(AppError::Conflict(format!(
                "Cannot {} while at step {:?}",
                action, step
            ))),
        }
    }

    fn current_slot(&mut self) -> &mut Option<Photo> {
        match self.step {
            WorkflowStep::SelfieVerification => &mut self.selfie,
            _ => &mut self.tree_photo,
        }
    }

    // ─── Step 1: details ─────────────────────────────────────────

    /// Set species, location and optional description.
    ///
    /// Empty values are stored as-is; they only block [`advance`](Self::advance).
    pub fn set_details(
        &mut self,
        species: &str,
        location: &str,
        description: Option<&str>,
    ) -> Result<(), AppError> {
        self.require_step(WorkflowStep::Details, "edit details")?;

        self.species = if species.trim().is_empty() {
            None
        } else {
            Some(Species::parse(species)?)
        };
        self.location = location.trim().to_string();
        self.description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        Ok(())
    }

    /// Fill the location from device coordinates via reverse geocoding.
    ///
    /// On failure the details are unchanged and manual entry still works.
    pub async fn locate(
        &mut self,
        geocoder: &dyn ReverseGeocoder,
        coordinates: Coordinates,
    ) -> Result<String, AppError> {
        self.require_step(WorkflowStep::Details, "locate")?;

        let name = geocoder.reverse(coordinates).await.map_err(|e| match e {
            AppError::Device(_) => e,
            other => AppError::Device(other.to_string()),
        })?;

        self.location = name.clone();
        self.coordinates = Some(coordinates);
        Ok(name)
    }

    // ─── Navigation ──────────────────────────────────────────────

    /// Move to the next step if the current step is complete.
    pub fn advance(&mut self) -> Result<WorkflowStep, AppError> {
        let next = match self.step {
            WorkflowStep::Details => {
                if self.species.is_none() {
                    return Err(AppError::Validation("Species is required".to_string()));
                }
                if self.location.is_empty() {
                    return Err(AppError::Validation("Location is required".to_string()));
                }
                WorkflowStep::TreePhoto
            }
            WorkflowStep::TreePhoto => {
                if self.tree_photo.is_none() {
                    return Err(AppError::Validation("A tree photo is required".to_string()));
                }
                WorkflowStep::SelfieVerification
            }
            WorkflowStep::SelfieVerification => {
                if self.selfie.is_none() {
                    return Err(AppError::Validation("A selfie is required".to_string()));
                }
                WorkflowStep::LivenessCheck
            }
            WorkflowStep::LivenessCheck => {
                return Err(AppError::Conflict(
                    "Liveness check must pass before continuing".to_string(),
                ));
            }
            step => {
                return Err(AppError::Conflict(format!(
                    "Cannot advance from step {:?}",
                    step
                )));
            }
        };

        // Leaving a photo step releases the camera
        self.capture = None;
        self.step = next;
        tracing::debug!(workflow_id = %self.id, step = ?next, "Workflow advanced");
        Ok(next)
    }

    // ─── Steps 2-3: photos ───────────────────────────────────────

    /// Open the camera for the current photo step.
    pub async fn start_capture(&mut self, camera: &dyn CameraDevice) -> Result<Facing, AppError> {
        let facing = self.photo_step_facing("start the camera")?;
        if self.capture.is_some() {
            return Err(AppError::Device("Camera is already in use".to_string()));
        }
        self.capture = Some(CaptureSession::open(camera, facing).await?);
        Ok(facing)
    }

    /// Take one frame from the open camera into the current slot.
    ///
    /// The stream is released whether or not the capture succeeds.
    pub async fn capture_frame(&mut self) -> Result<(), AppError> {
        self.photo_step_facing("capture")?;
        let session = self
            .capture
            .take()
            .ok_or_else(|| AppError::Conflict("Camera is not open".to_string()))?;

        let photo = session.capture().await?;
        *self.current_slot() = Some(photo);
        Ok(())
    }

    /// Close the camera without capturing.
    pub fn stop_capture(&mut self) {
        self.capture = None;
    }

    /// Use an uploaded image for the current photo step.
    pub fn attach_upload(&mut self, declared_mime: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        self.photo_step_facing("attach a photo")?;
        let photo = Photo::from_upload(declared_mime, bytes)?;
        self.capture = None;
        *self.current_slot() = Some(photo);
        Ok(())
    }

    /// Use a `data:image/...;base64,...` URL for the current photo step.
    pub fn attach_data_url(&mut self, data_url: &str) -> Result<(), AppError> {
        self.photo_step_facing("attach a photo")?;
        let photo = Photo::from_data_url(data_url)?;
        self.capture = None;
        *self.current_slot() = Some(photo);
        Ok(())
    }

    /// Drop the current step's photo so it can be retaken.
    pub fn discard_photo(&mut self) -> Result<(), AppError> {
        self.photo_step_facing("discard a photo")?;
        *self.current_slot() = None;
        Ok(())
    }

    // ─── Step 4: liveness ────────────────────────────────────────

    /// Run the liveness check on the selfie.
    ///
    /// A rejection sends the workflow back to the selfie step with both
    /// photos kept.
    pub async fn verify_liveness(&mut self, verifier: &dyn LivenessVerifier) -> Result<(), AppError> {
        self.require_step(WorkflowStep::LivenessCheck, "verify liveness")?;

        let selfie_bytes: &[u8] = match &self.selfie {
            Some(Photo::InMemory { bytes, .. }) => bytes,
            Some(Photo::Stored(_)) => &[],
            None => {
                return Err(AppError::Validation("A selfie is required".to_string()));
            }
        };

        let passed = match verifier.verify(&self.user_id, selfie_bytes).await {
            Ok(passed) => passed,
            Err(e) => {
                tracing::warn!(workflow_id = %self.id, error = %e, "Liveness check errored");
                false
            }
        };

        if !passed {
            self.step = WorkflowStep::SelfieVerification;
            return Err(AppError::Verification(
                "Liveness check failed, please retake your selfie".to_string(),
            ));
        }

        self.step = WorkflowStep::ReadyToCommit;
        tracing::debug!(workflow_id = %self.id, "Liveness check passed");
        Ok(())
    }

    // ─── Step 5: commit ──────────────────────────────────────────

    /// Upload photos, create the planting and credit the reward.
    ///
    /// On failure the workflow stays ready to commit and can be retried.
    pub async fn commit(
        &mut self,
        backend: &dyn BackendClient,
        accrual: &RewardAccrual,
    ) -> Result<CommitReceipt, AppError> {
        if self.step == WorkflowStep::Committed {
            return Err(AppError::Conflict("Planting already submitted".to_string()));
        }
        self.require_step(WorkflowStep::ReadyToCommit, "commit")?;

        let tree_photo = self.store_photo(backend, TREE_PHOTO_FIELD).await?;
        let selfie = self.store_photo(backend, SELFIE_FIELD).await?;

        let mut created = false;
        let planting_id = match self.planting_id.clone() {
            Some(id) => id,
            None => {
                let species = self
                    .species
                    .clone()
                    .ok_or_else(|| AppError::Validation("Species is required".to_string()))?;
                let record = Record::Planting(NewPlanting {
                    user_id: self.user_id.clone(),
                    species,
                    location: self.location.clone(),
                    description: self.description.clone(),
                    coordinates: self.coordinates,
                    tree_photo,
                    selfie,
                    idempotency_key: self.idempotency_key.clone(),
                    created_at: Utc::now(),
                });

                let result = backend
                    .create_record(record, Some(&self.idempotency_key))
                    .await
                    .map_err(|e| match e {
                        AppError::Validation(_) => e,
                        other => AppError::record_creation(other.to_string()),
                    })?;

                created = result.created;
                self.planting_id = Some(result.id.clone());
                tracing::info!(
                    workflow_id = %self.id,
                    planting_id = %result.id,
                    created,
                    "Planting record stored"
                );
                result.id
            }
        };

        let credit = match accrual.policy() {
            RewardPolicy::OnSubmit if !self.credited => {
                let outcome = accrual
                    .credit_planting(&self.user_id, &planting_id)
                    .await?;
                self.credited = true;
                Some(outcome)
            }
            _ => None,
        };

        self.capture = None;
        self.step = WorkflowStep::Committed;

        Ok(CommitReceipt {
            planting_id,
            created,
            credit,
        })
    }

    /// Upload an in-memory photo and replace it by its stored reference.
    async fn store_photo(
        &mut self,
        backend: &dyn BackendClient,
        field: &str,
    ) -> Result<Option<String>, AppError> {
        let slot = if field == SELFIE_FIELD {
            &mut self.selfie
        } else {
            &mut self.tree_photo
        };

        let (bytes, format) = match slot {
            None => return Ok(None),
            Some(Photo::Stored(url)) => return Ok(Some(url.clone())),
            Some(Photo::InMemory { bytes, format }) => (bytes.clone(), *format),
        };

        let path = Photo::blob_path(&self.user_id, field, &bytes, format);
        let url = backend
            .upload_blob(bytes, &path, format.mime())
            .await
            .map_err(|e| match e {
                AppError::Upload(_) => e,
                other => AppError::Upload(other.to_string()),
            })?;

        tracing::debug!(workflow_id = %self.id, field, path = %path, "Photo uploaded");
        *slot = Some(Photo::Stored(url.clone()));
        Ok(Some(url))
    }

    // ─── Cancel ──────────────────────────────────────────────────

    /// Abandon the workflow: release the camera and discard all form state.
    pub fn cancel(&mut self) -> Result<(), AppError> {
        if self.step.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Cannot cancel a workflow at step {:?}",
                self.step
            )));
        }

        self.capture = None;
        self.species = None;
        self.location.clear();
        self.description = None;
        self.coordinates = None;
        self.tree_photo = None;
        self.selfie = None;
        self.step = WorkflowStep::Cancelled;

        tracing::info!(workflow_id = %self.id, user_id = %self.user_id, "Workflow cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::services::DelayLivenessVerifier;
    use std::time::Duration;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";

    #[test]
    fn test_details_required_to_advance() {
        let mut wf = PlantingWorkflow::new("u1");
        assert!(wf.advance().unwrap_err().is_validation());

        wf.set_details("oak", "   ", None).unwrap();
        assert!(wf.advance().unwrap_err().is_validation());
        assert_eq!(wf.step(), WorkflowStep::Details);

        wf.set_details("oak", "Central Park", Some("  ")).unwrap();
        assert_eq!(wf.advance().unwrap(), WorkflowStep::TreePhoto);
        assert!(wf.view().description.is_none());
    }

    #[test]
    fn test_details_locked_after_step_one() {
        let mut wf = PlantingWorkflow::new("u1");
        wf.set_details("oak", "Central Park", None).unwrap();
        wf.advance().unwrap();
        assert!(matches!(
            wf.set_details("pine", "Elsewhere", None).unwrap_err(),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn test_photo_steps_and_discard() {
        let mut wf = PlantingWorkflow::new("u1");
        wf.set_details("maple", "Riverside", None).unwrap();
        wf.advance().unwrap();

        assert!(wf.advance().unwrap_err().is_validation());
        assert!(wf.attach_upload("text/plain", PNG.to_vec()).is_err());
        wf.attach_upload("image/png", PNG.to_vec()).unwrap();
        wf.discard_photo().unwrap();
        assert!(wf.tree_photo().is_none());
        wf.attach_upload("image/png", PNG.to_vec()).unwrap();
        assert_eq!(wf.advance().unwrap(), WorkflowStep::SelfieVerification);

        wf.attach_upload("image/png", PNG.to_vec()).unwrap();
        assert!(wf.selfie().is_some());
        assert_eq!(wf.advance().unwrap(), WorkflowStep::LivenessCheck);
        assert!(matches!(wf.advance().unwrap_err(), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_commit_before_liveness_rejected() {
        let backend = std::sync::Arc::new(MemoryBackend::new());
        let accrual = RewardAccrual::new(backend.clone(), 100, RewardPolicy::OnSubmit);
        let mut wf = PlantingWorkflow::new("u1");
        let err = wf.commit(backend.as_ref(), &accrual).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(backend.planting_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let mut wf = PlantingWorkflow::new("u1");
        wf.set_details("oak", "Central Park", None).unwrap();
        wf.cancel().unwrap();
        assert_eq!(wf.step(), WorkflowStep::Cancelled);
        assert!(wf.view().species.is_none());
        assert!(matches!(wf.cancel().unwrap_err(), AppError::Conflict(_)));
        let verifier = DelayLivenessVerifier::new(Duration::ZERO);
        assert!(wf.verify_liveness(&verifier).await.is_err());
    }
}
