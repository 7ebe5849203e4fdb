//! Journal-backed durable context with replay support
//!
//! A `DurableRun` is responsible for:
//! - Assigning step keys from call order
//! - Replaying recorded step outcomes instead of re-executing them
//! - Allocating awakeables with deterministic ids
//! - Opening named scopes for blocks of work that replay may skip
//! - Reading and writing run state

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::{Awakeable, DurableContext, StepAction, StepError};
use crate::persistence::{AwakeableOutcome, JournalStore, StepKey, StepOutcome};

/// Durable context over a [`JournalStore`]
///
/// Building a new `DurableRun` for a run id that already has a journal is a
/// replay: steps that were recorded return their recorded outcome, and
/// execution continues live from the first unrecorded step.
///
/// # Example
///
/// ```ignore
/// use soma_durable::prelude::*;
///
/// let store = Arc::new(InMemoryJournalStore::new());
/// let ctx = DurableRun::start("task-42", store.clone()).await?;
///
/// let greeting: String = ctx.run("greet", || async { Ok("hi".to_string()) }).await?;
/// ```
pub struct DurableRun {
    run_id: String,
    /// `None` at the root; otherwise the `/`-joined path of scope labels
    scope: Option<String>,
    store: Arc<dyn JournalStore>,
    occurrences: Mutex<HashMap<String, u32>>,
    next_awakeable: AtomicU32,
}

impl DurableRun {
    /// Register the run with the store and create a context for it
    pub async fn start(
        run_id: impl Into<String>,
        store: Arc<dyn JournalStore>,
    ) -> Result<Self, StepError> {
        let run_id = run_id.into();
        store.ensure_run(&run_id).await?;
        debug!(run_id = %run_id, "Durable run attached");

        Ok(Self::with_scope(run_id, None, store))
    }

    fn with_scope(run_id: String, scope: Option<String>, store: Arc<dyn JournalStore>) -> Self {
        Self {
            run_id,
            scope,
            store,
            occurrences: Mutex::new(HashMap::new()),
            next_awakeable: AtomicU32::new(0),
        }
    }

    /// The store backing this run
    pub fn store(&self) -> &Arc<dyn JournalStore> {
        &self.store
    }

    fn qualified(&self, name: &str) -> String {
        match &self.scope {
            Some(scope) => format!("{scope}/{name}"),
            None => name.to_string(),
        }
    }

    fn next_step_key(&self, name: &str) -> StepKey {
        let mut occurrences = self.occurrences.lock();
        let counter = occurrences.entry(name.to_string()).or_insert(0);
        let key = StepKey::new(self.qualified(name), *counter);
        *counter += 1;
        key
    }

    fn peek_step_key(&self, name: &str) -> StepKey {
        let occurrence = self.occurrences.lock().get(name).copied().unwrap_or(0);
        StepKey::new(self.qualified(name), occurrence)
    }

    fn next_awakeable_id(&self) -> String {
        let n = self.next_awakeable.fetch_add(1, Ordering::SeqCst);
        match &self.scope {
            Some(scope) => format!("{}:{}:awakeable:{}", self.run_id, scope, n),
            None => format!("{}:awakeable:{}", self.run_id, n),
        }
    }
}

impl fmt::Debug for DurableRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableRun")
            .field("run_id", &self.run_id)
            .field("scope", &self.scope)
            .finish()
    }
}

#[async_trait]
impl DurableContext for DurableRun {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn run_raw(
        &self,
        name: &str,
        action: StepAction,
    ) -> Result<serde_json::Value, StepError> {
        let key = self.next_step_key(name);

        if let Some(outcome) = self.store.load_step(&self.run_id, &key).await? {
            debug!(run_id = %self.run_id, step = %key, "Replaying recorded step");
            return match outcome {
                StepOutcome::Completed { result } => Ok(result),
                StepOutcome::Failed { message } => Err(StepError::failed(key.to_string(), message)),
            };
        }

        debug!(run_id = %self.run_id, step = %key, "Executing step");
        match action().await {
            Ok(result) => {
                self.store
                    .record_step(
                        &self.run_id,
                        &key,
                        StepOutcome::Completed {
                            result: result.clone(),
                        },
                    )
                    .await?;
                Ok(result)
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(run_id = %self.run_id, step = %key, error = %message, "Step failed");
                self.store
                    .record_step(
                        &self.run_id,
                        &key,
                        StepOutcome::Failed {
                            message: message.clone(),
                        },
                    )
                    .await?;
                Err(StepError::failed(key.to_string(), message))
            }
        }
    }

    async fn recorded_step(&self, name: &str) -> Result<Option<serde_json::Value>, StepError> {
        let key = self.peek_step_key(name);
        match self.store.load_step(&self.run_id, &key).await? {
            Some(StepOutcome::Completed { result }) => Ok(Some(result)),
            Some(StepOutcome::Failed { message }) => {
                Err(StepError::failed(key.to_string(), message))
            }
            None => Ok(None),
        }
    }

    fn scope(&self, name: &str) -> Arc<dyn DurableContext> {
        let label = self.next_step_key(name).to_string();
        debug!(run_id = %self.run_id, scope = %label, "Scope opened");
        Arc::new(Self::with_scope(
            self.run_id.clone(),
            Some(label),
            self.store.clone(),
        ))
    }

    async fn awakeable(&self) -> Result<Awakeable, StepError> {
        let id = self.next_awakeable_id();
        self.store.create_awakeable(&self.run_id, &id).await?;
        debug!(run_id = %self.run_id, awakeable_id = %id, "Awakeable allocated");

        let store = self.store.clone();
        let awakeable_id = id.clone();
        let promise = Box::pin(async move {
            match store.await_awakeable(&awakeable_id).await? {
                AwakeableOutcome::Resolved { payload } => Ok(payload),
                AwakeableOutcome::Rejected { reason } => Err(StepError::AwakeableRejected {
                    awakeable_id,
                    reason,
                }),
            }
        });

        Ok(Awakeable::new(id, promise))
    }

    async fn set_state(&self, key: &str, value: serde_json::Value) -> Result<(), StepError> {
        Ok(self.store.set_state(&self.run_id, key, value).await?)
    }

    async fn get_state(&self, key: &str) -> Result<Option<serde_json::Value>, StepError> {
        Ok(self.store.get_state(&self.run_id, key).await?)
    }

    async fn clear_state(&self, key: &str) -> Result<(), StepError> {
        Ok(self.store.clear_state(&self.run_id, key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DurableContextExt;
    use crate::persistence::{InMemoryJournalStore, JournalEvent};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    async fn new_run(store: &Arc<InMemoryJournalStore>, run_id: &str) -> DurableRun {
        DurableRun::start(run_id, store.clone() as Arc<dyn JournalStore>)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_records_result() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;

        let value: u32 = ctx.run("compute", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let journal = store.load_journal("run-1").await.unwrap();
        assert_eq!(
            journal[0].1,
            JournalEvent::StepCompleted {
                step: StepKey::new("compute", 0),
                result: json!(7),
            }
        );
    }

    #[tokio::test]
    async fn test_repeated_name_gets_new_occurrence() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;

        let first: u32 = ctx.run("tick", || async { Ok(1) }).await.unwrap();
        let second: u32 = ctx.run("tick", || async { Ok(2) }).await.unwrap();

        assert_eq!((first, second), (1, 2));
        let steps: Vec<_> = store
            .load_journal("run-1")
            .await
            .unwrap()
            .into_iter()
            .filter_map(|(_, e)| e.step().cloned())
            .collect();
        assert_eq!(steps, vec![StepKey::new("tick", 0), StepKey::new("tick", 1)]);
    }

    #[tokio::test]
    async fn test_replay_skips_recorded_steps() {
        let store = Arc::new(InMemoryJournalStore::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in [1usize, 1] {
            let ctx = new_run(&store, "run-1").await;
            let counter = calls.clone();
            let value: String = ctx
                .run("side_effect", move || async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(format!("call-{n}"))
                })
                .await
                .unwrap();

            assert_eq!(value, "call-0");
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_replayed() {
        let store = Arc::new(InMemoryJournalStore::new());

        let ctx = new_run(&store, "run-1").await;
        let first = ctx
            .run::<u32, _, _>("flaky", || async { anyhow::bail!("upstream unavailable") })
            .await
            .unwrap_err();
        assert!(first.is_step_failure());

        let ctx = new_run(&store, "run-1").await;
        let replayed = ctx
            .run::<u32, _, _>("flaky", || async { Ok(1) })
            .await
            .unwrap_err();

        assert_eq!(first.to_string(), replayed.to_string());
        assert!(replayed.to_string().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_serialization_error() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;
        let _: String = ctx
            .run("name", || async { Ok("soma".to_string()) })
            .await
            .unwrap();

        let ctx = new_run(&store, "run-1").await;
        let result = ctx.run::<u64, _, _>("name", || async { Ok(1) }).await;
        assert!(matches!(result, Err(StepError::Serialization { .. })));
    }

    #[tokio::test]
    async fn test_awakeable_ids_are_deterministic() {
        let store = Arc::new(InMemoryJournalStore::new());

        let ctx = new_run(&store, "run-1").await;
        let a = ctx.awakeable().await.unwrap();
        let b = ctx.awakeable().await.unwrap();
        assert_eq!(a.id, "run-1:awakeable:0");
        assert_eq!(b.id, "run-1:awakeable:1");

        let replay = new_run(&store, "run-1").await;
        assert_eq!(replay.awakeable().await.unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_awakeable_resolved_externally() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;

        let awakeable = ctx.awakeable().await.unwrap();
        store
            .complete_awakeable(
                &awakeable.id,
                AwakeableOutcome::Resolved {
                    payload: json!({"text": "hello"}),
                },
            )
            .await
            .unwrap();

        let payload: serde_json::Value = awakeable.wait().await.unwrap();
        assert_eq!(payload["text"], "hello");
    }

    #[tokio::test]
    async fn test_awakeable_rejected_externally() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;

        let awakeable = ctx.awakeable().await.unwrap();
        store
            .complete_awakeable(
                &awakeable.id,
                AwakeableOutcome::Rejected {
                    reason: "task cancelled".into(),
                },
            )
            .await
            .unwrap();

        let result = awakeable.promise.await;
        assert!(matches!(result, Err(StepError::AwakeableRejected { .. })));
    }

    #[tokio::test]
    async fn test_recorded_step_does_not_consume() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;
        assert_eq!(ctx.recorded_step("decide").await.unwrap(), None);
        let _: bool = ctx.run("decide", || async { Ok(true) }).await.unwrap();

        let replay = new_run(&store, "run-1").await;
        let peeked: Option<bool> = replay.recorded_step_as("decide").await.unwrap();
        assert_eq!(peeked, Some(true));
        assert_eq!(replay.recorded_step("decide").await.unwrap(), Some(json!(true)));

        let value: bool = replay.run("decide", || async { Ok(false) }).await.unwrap();
        assert!(value);
        assert_eq!(replay.recorded_step("decide").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scopes_have_their_own_names() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;

        let first = ctx.scope("attempt");
        let second = ctx.scope("attempt");
        let _: u32 = second.run("work", || async { Ok(2) }).await.unwrap();
        let _: u32 = first.run("work", || async { Ok(1) }).await.unwrap();
        let _: u32 = ctx.run("work", || async { Ok(0) }).await.unwrap();
        let awakeable = second.awakeable().await.unwrap();
        assert_eq!(awakeable.id, "run-1:attempt#1:awakeable:0");

        let steps: Vec<_> = store
            .load_journal("run-1")
            .await
            .unwrap()
            .into_iter()
            .filter_map(|(_, e)| e.step().cloned())
            .collect();
        assert_eq!(
            steps,
            vec![
                StepKey::new("attempt#1/work", 0),
                StepKey::new("attempt#0/work", 0),
                StepKey::new("work", 0),
            ]
        );

        // Skipping the first scope on replay leaves the second one intact
        let replay = new_run(&store, "run-1").await;
        let _skipped = replay.scope("attempt");
        let second = replay.scope("attempt");
        let value: u32 = second.run("work", || async { Ok(99) }).await.unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let store = Arc::new(InMemoryJournalStore::new());
        let ctx = new_run(&store, "run-1").await;

        ctx.set_state("listen", json!("run-1:awakeable:3"))
            .await
            .unwrap();
        let id: Option<String> = ctx.get_state_as("listen").await.unwrap();
        assert_eq!(id.as_deref(), Some("run-1:awakeable:3"));

        ctx.clear_state("listen").await.unwrap();
        assert!(ctx.get_state("listen").await.unwrap().is_none());
    }
}
