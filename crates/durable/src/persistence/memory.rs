//! In-memory implementation of JournalStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use super::event::{AwakeableOutcome, JournalEvent, StepKey, StepOutcome};
use super::store::*;

/// Internal run state
struct RunState {
    created_at: DateTime<Utc>,
    journal: Vec<JournalEvent>,
    steps: HashMap<StepKey, StepOutcome>,
    state: HashMap<String, serde_json::Value>,
}

impl RunState {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            journal: Vec::new(),
            steps: HashMap::new(),
            state: HashMap::new(),
        }
    }
}

/// Internal awakeable slot
struct AwakeableSlot {
    run_id: String,
    outcome: watch::Sender<Option<AwakeableOutcome>>,
}

/// In-memory implementation of JournalStore
///
/// This is primarily for testing and local development. Runs survive for
/// the lifetime of the store, so dropping a [`DurableRun`](crate::DurableRun)
/// and building a new one over the same store replays the run.
///
/// # Example
///
/// ```
/// use soma_durable::InMemoryJournalStore;
///
/// let store = InMemoryJournalStore::new();
/// assert_eq!(store.run_count(), 0);
/// ```
pub struct InMemoryJournalStore {
    runs: RwLock<HashMap<String, RunState>>,
    awakeables: RwLock<HashMap<String, AwakeableSlot>>,
}

impl InMemoryJournalStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            awakeables: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of runs
    pub fn run_count(&self) -> usize {
        self.runs.read().len()
    }

    /// Get the number of awakeables that have not been completed
    pub fn pending_awakeable_count(&self) -> usize {
        self.awakeables
            .read()
            .values()
            .filter(|slot| slot.outcome.borrow().is_none())
            .count()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.runs.write().clear();
        self.awakeables.write().clear();
    }

    fn append(&self, run_id: &str, event: JournalEvent) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.journal.push(event);
        Ok(())
    }
}

impl Default for InMemoryJournalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JournalStore for InMemoryJournalStore {
    async fn ensure_run(&self, run_id: &str) -> Result<(), StoreError> {
        self.runs
            .write()
            .entry(run_id.to_string())
            .or_insert_with(RunState::new);
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunInfo>, StoreError> {
        Ok(self.runs.read().get(run_id).map(|run| RunInfo {
            run_id: run_id.to_string(),
            created_at: run.created_at,
            journal_length: run.journal.len(),
        }))
    }

    async fn load_journal(&self, run_id: &str) -> Result<Vec<(i32, JournalEvent)>, StoreError> {
        let runs = self.runs.read();
        let run = runs
            .get(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;

        Ok(run
            .journal
            .iter()
            .enumerate()
            .map(|(i, e)| (i as i32, e.clone()))
            .collect())
    }

    async fn load_step(
        &self,
        run_id: &str,
        step: &StepKey,
    ) -> Result<Option<StepOutcome>, StoreError> {
        let runs = self.runs.read();
        let run = runs
            .get(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        Ok(run.steps.get(step).cloned())
    }

    async fn record_step(
        &self,
        run_id: &str,
        step: &StepKey,
        outcome: StepOutcome,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;

        if run.steps.contains_key(step) {
            return Err(StoreError::StepAlreadyRecorded {
                run_id: run_id.to_string(),
                step: step.to_string(),
            });
        }

        run.journal.push(JournalEvent::for_step(step.clone(), &outcome));
        run.steps.insert(step.clone(), outcome);
        Ok(())
    }

    async fn create_awakeable(&self, run_id: &str, awakeable_id: &str) -> Result<(), StoreError> {
        {
            let mut awakeables = self.awakeables.write();
            if awakeables.contains_key(awakeable_id) {
                return Ok(());
            }
            let (tx, _rx) = watch::channel(None);
            awakeables.insert(
                awakeable_id.to_string(),
                AwakeableSlot {
                    run_id: run_id.to_string(),
                    outcome: tx,
                },
            );
        }

        self.append(
            run_id,
            JournalEvent::AwakeableCreated {
                awakeable_id: awakeable_id.to_string(),
            },
        )
    }

    async fn complete_awakeable(
        &self,
        awakeable_id: &str,
        outcome: AwakeableOutcome,
    ) -> Result<(), StoreError> {
        let run_id = {
            let awakeables = self.awakeables.read();
            let slot = awakeables
                .get(awakeable_id)
                .ok_or_else(|| StoreError::AwakeableNotFound(awakeable_id.to_string()))?;

            let completed = slot.outcome.send_if_modified(|current| {
                if current.is_some() {
                    return false;
                }
                *current = Some(outcome.clone());
                true
            });
            if !completed {
                return Err(StoreError::AwakeableAlreadyCompleted(
                    awakeable_id.to_string(),
                ));
            }
            slot.run_id.clone()
        };

        debug!(run_id = %run_id, awakeable_id = %awakeable_id, "Awakeable completed");
        self.append(&run_id, JournalEvent::for_awakeable(awakeable_id, &outcome))
    }

    async fn await_awakeable(&self, awakeable_id: &str) -> Result<AwakeableOutcome, StoreError> {
        let mut rx = {
            let awakeables = self.awakeables.read();
            awakeables
                .get(awakeable_id)
                .ok_or_else(|| StoreError::AwakeableNotFound(awakeable_id.to_string()))?
                .outcome
                .subscribe()
        };

        let outcome = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map_err(|_| StoreError::AwakeableNotFound(awakeable_id.to_string()))?;

        outcome
            .clone()
            .ok_or_else(|| StoreError::Backend("awakeable outcome vanished".to_string()))
    }

    async fn set_state(
        &self,
        run_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;

        run.journal.push(JournalEvent::StateSet {
            key: key.to_string(),
            value: value.clone(),
        });
        run.state.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_state(
        &self,
        run_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let runs = self.runs.read();
        let run = runs
            .get(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        Ok(run.state.get(key).cloned())
    }

    async fn clear_state(&self, run_id: &str, key: &str) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;

        if run.state.remove(key).is_some() {
            run.journal.push(JournalEvent::StateCleared {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}
