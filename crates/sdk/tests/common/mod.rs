//! Shared fixtures for pattern tests
//!
//! A `Harness` owns an in-memory journal and an in-memory task API. Runs are
//! "restarted" by attaching a fresh `DurableRun` to the same run id.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use soma_sdk::prelude::*;
use soma_sdk::NEW_INPUT_PROMISE;
use uuid::Uuid;

pub struct Harness {
    pub journal: Arc<InMemoryJournalStore>,
    pub store: Arc<dyn JournalStore>,
    pub api: Arc<InMemorySomaApi>,
    pub soma: Arc<dyn SomaApi>,
    pub task_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Arc::new(InMemoryJournalStore::new());
        let api = Arc::new(InMemorySomaApi::new());
        Self {
            store: journal.clone(),
            journal,
            soma: api.clone(),
            api,
            task_id: Uuid::now_v7(),
        }
    }

    /// Attach a context to `run_id`; a second call for the same id replays
    pub async fn context(&self, run_id: &str) -> Arc<dyn DurableContext> {
        Arc::new(DurableRun::start(run_id, self.store.clone()).await.unwrap())
    }

    /// Wait until the run publishes its `index`-th awakeable as listen handle
    pub async fn wait_for_listener(&self, run_id: &str, index: u32) -> String {
        let expected = format!("{run_id}:awakeable:{index}");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let current = self.store.get_state(run_id, NEW_INPUT_PROMISE).await.unwrap();
                if current == Some(json!(expected)) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("run {run_id} never listened on {expected}"));
        expected
    }

    /// Post a user message and wake the run's `index`-th listener
    pub async fn send_user_input(&self, run_id: &str, index: u32, text: &str) {
        let expected = self.wait_for_listener(run_id, index).await;
        self.api.push_user_message(self.task_id, text);
        let honored = signal_new_input(self.store.as_ref(), run_id, json!({ "text": text }))
            .await
            .unwrap();
        assert_eq!(honored, Some(expected));
    }
}

/// Text of all user messages in a history snapshot
pub fn user_texts(history: &[TaskTimelineItem]) -> Vec<String> {
    soma_sdk::api::messages(history)
        .filter(|m| m.role == soma_sdk::api::MessageRole::User)
        .map(|m| m.text())
        .collect()
}

/// Poll `condition` until it holds or a few seconds have passed
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
