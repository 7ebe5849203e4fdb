//! JournalStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{AwakeableOutcome, JournalEvent, StepKey, StepOutcome};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Run not registered with the store
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// Awakeable id was never allocated
    #[error("awakeable not found: {0}")]
    AwakeableNotFound(String),

    /// Awakeable was already resolved or rejected
    #[error("awakeable already completed: {0}")]
    AwakeableAlreadyCompleted(String),

    /// Step was recorded twice
    #[error("step {step} already recorded for run {run_id}")]
    StepAlreadyRecorded { run_id: String, step: String },

    /// Backend error
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Summary of a run known to the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub journal_length: usize,
}

/// Storage for run journals, awakeables and per-run state
///
/// Implementations must be safe to share between concurrently executing
/// runs. A run never sees another run's steps or state; awakeable ids are
/// global because external actors complete them without knowing the run.
#[async_trait]
pub trait JournalStore: Send + Sync + 'static {
    // =========================================================================
    // Runs
    // =========================================================================

    /// Register a run; succeeds if the run already exists
    async fn ensure_run(&self, run_id: &str) -> Result<(), StoreError>;

    /// Get run summary
    async fn get_run(&self, run_id: &str) -> Result<Option<RunInfo>, StoreError>;

    /// Load the full journal for a run, ordered by sequence number
    async fn load_journal(&self, run_id: &str) -> Result<Vec<(i32, JournalEvent)>, StoreError>;

    // =========================================================================
    // Steps
    // =========================================================================

    /// Load the recorded outcome of a step, if any
    async fn load_step(
        &self,
        run_id: &str,
        step: &StepKey,
    ) -> Result<Option<StepOutcome>, StoreError>;

    /// Record the outcome of a step
    ///
    /// Fails with [`StoreError::StepAlreadyRecorded`] if the step has an
    /// outcome already.
    async fn record_step(
        &self,
        run_id: &str,
        step: &StepKey,
        outcome: StepOutcome,
    ) -> Result<(), StoreError>;

    // =========================================================================
    // Awakeables
    // =========================================================================

    /// Register an awakeable for a run; succeeds if it already exists
    async fn create_awakeable(&self, run_id: &str, awakeable_id: &str) -> Result<(), StoreError>;

    /// Resolve or reject an awakeable
    ///
    /// An awakeable completes exactly once; a second completion fails with
    /// [`StoreError::AwakeableAlreadyCompleted`].
    async fn complete_awakeable(
        &self,
        awakeable_id: &str,
        outcome: AwakeableOutcome,
    ) -> Result<(), StoreError>;

    /// Wait until an awakeable is completed and return its outcome
    async fn await_awakeable(&self, awakeable_id: &str) -> Result<AwakeableOutcome, StoreError>;

    // =========================================================================
    // State
    // =========================================================================

    /// Write a state slot
    async fn set_state(
        &self,
        run_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Read a state slot
    async fn get_state(
        &self,
        run_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Remove a state slot
    async fn clear_state(&self, run_id: &str, key: &str) -> Result<(), StoreError>;
}
