// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-flight workflows, keyed by id and owned by the user who started them.
//!
//! A workflow leaves the registry when it is committed, cancelled, or left
//! idle for longer than the idle TTL.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::PlantingWorkflow;

/// Idle time after which an abandoned workflow is dropped.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Shared handle to one workflow. The mutex serializes steps per workflow.
pub type WorkflowHandle = Arc<Mutex<PlantingWorkflow>>;

struct Entry {
    owner: String,
    handle: WorkflowHandle,
    last_used: Instant,
}

pub struct WorkflowRegistry {
    workflows: DashMap<Uuid, Entry>,
    idle_ttl: Duration,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            workflows: DashMap::new(),
            idle_ttl,
        }
    }

    /// Register a workflow and return its id. Expired workflows are swept first.
    pub fn insert(&self, workflow: PlantingWorkflow) -> Uuid {
        self.sweep_expired();

        let id = workflow.id();
        let owner = workflow.user_id().to_string();
        self.workflows.insert(
            id,
            Entry {
                owner,
                handle: Arc::new(Mutex::new(workflow)),
                last_used: Instant::now(),
            },
        );
        id
    }

    /// Look up a workflow owned by `user_id` and mark it as used. Other
    /// users' workflows are reported as missing.
    pub fn get(&self, id: Uuid, user_id: &str) -> Result<WorkflowHandle, AppError> {
        match self.workflows.get_mut(&id) {
            Some(mut entry) if entry.owner == user_id => {
                entry.last_used = Instant::now();
                Ok(entry.handle.clone())
            }
            _ => Err(AppError::NotFound(format!("Workflow {}", id))),
        }
    }

    /// Drop a finished workflow. Releases its camera if it still holds one.
    pub fn remove(&self, id: Uuid) {
        self.workflows.remove(&id);
    }

    /// Drop workflows idle for longer than the TTL and return how many went.
    ///
    /// A request still holding a handle keeps that workflow alive until it
    /// finishes; its camera is released when the last handle is dropped.
    pub fn sweep_expired(&self) -> usize {
        let mut expired = 0;
        self.workflows.retain(|id, entry| {
            if entry.last_used.elapsed() < self.idle_ttl {
                return true;
            }
            tracing::info!(
                workflow_id = %id,
                user_id = %entry.owner,
                idle_secs = entry.last_used.elapsed().as_secs(),
                "Abandoned workflow expired"
            );
            expired += 1;
            false
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
