//! Durable wrapper for external clients
//!
//! [`DurableClient`] turns every call on an arbitrary client into a durable
//! step named `{prefix}-{operation}-index-{n}`, where `n` is a per-client
//! counter that increases on every call. Callers never pass explicit keys;
//! uniqueness follows from call order, which replay reproduces.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::context::{DurableContext, DurableContextExt, StepError};

/// Errors from durable client calls
#[derive(Debug, thiserror::Error)]
pub enum DurableClientError {
    /// The client was used after its owning scope ended
    #[error("client {0} is closed")]
    Closed(String),

    /// The underlying step failed
    #[error(transparent)]
    Step(#[from] StepError),
}

/// Wraps a client so every call is memoized by the durable context
///
/// Cloning shares the call counter and the open flag, so clones handed to
/// helper functions keep producing unique keys.
pub struct DurableClient<C: ?Sized> {
    ctx: Arc<dyn DurableContext>,
    client: Arc<C>,
    prefix: String,
    next_index: Arc<AtomicU64>,
    open: Arc<AtomicBool>,
}

impl<C: ?Sized> Clone for DurableClient<C> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            client: self.client.clone(),
            prefix: self.prefix.clone(),
            next_index: self.next_index.clone(),
            open: self.open.clone(),
        }
    }
}

impl<C: Send + Sync + ?Sized + 'static> DurableClient<C> {
    /// Wrap `client`, naming its steps with `prefix`
    pub fn new(ctx: Arc<dyn DurableContext>, client: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            ctx,
            client,
            prefix: prefix.into(),
            next_index: Arc::new(AtomicU64::new(0)),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The step name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The wrapped client
    pub fn inner(&self) -> &Arc<C> {
        &self.client
    }

    /// Number of calls issued so far
    pub fn calls_issued(&self) -> u64 {
        self.next_index.load(Ordering::SeqCst)
    }

    /// Check whether calls are still accepted
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Stop accepting calls; returns `true` if this call closed the client
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::SeqCst)
    }

    /// Build the step name for the next call and advance the counter
    pub fn next_step_name(&self, operation: &str) -> String {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-index-{}", self.prefix, operation, index)
    }

    /// Invoke `f` on the wrapped client as a durable step
    ///
    /// The counter advances even when the call fails, so a replay that
    /// reaches the same call gets the same key.
    pub async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, DurableClientError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if !self.is_open() {
            return Err(DurableClientError::Closed(self.prefix.clone()));
        }

        let step = self.next_step_name(operation);
        debug!(run_id = %self.ctx.run_id(), step = %step, "Durable client call");

        let client = self.client.clone();
        Ok(self.ctx.run(&step, move || f(client)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DurableRun;
    use crate::persistence::{InMemoryJournalStore, JournalStore};

    struct Echo;

    impl Echo {
        async fn echo(&self, value: &str) -> anyhow::Result<String> {
            Ok(value.to_uppercase())
        }
    }

    async fn wrap(store: Arc<InMemoryJournalStore>) -> DurableClient<Echo> {
        let ctx = DurableRun::start("run-1", store as Arc<dyn JournalStore>)
            .await
            .unwrap();
        DurableClient::new(Arc::new(ctx), Arc::new(Echo), "echo")
    }

    #[tokio::test]
    async fn test_step_names_increment_across_operations() {
        let client = wrap(Arc::new(InMemoryJournalStore::new())).await;

        assert_eq!(client.next_step_name("a"), "echo-a-index-0");
        assert_eq!(client.next_step_name("b"), "echo-b-index-1");
        assert_eq!(client.next_step_name("a"), "echo-a-index-2");
        assert_eq!(client.calls_issued(), 3);
    }

    #[tokio::test]
    async fn test_call_returns_client_result() {
        let client = wrap(Arc::new(InMemoryJournalStore::new())).await;

        let result: String = client
            .call("echo", |echo| async move { echo.echo("hi").await })
            .await
            .unwrap();
        assert_eq!(result, "HI");
    }

    #[tokio::test]
    async fn test_clones_share_counter() {
        let client = wrap(Arc::new(InMemoryJournalStore::new())).await;
        let clone = client.clone();

        client.next_step_name("x");
        assert_eq!(clone.next_step_name("x"), "echo-x-index-1");
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let client = wrap(Arc::new(InMemoryJournalStore::new())).await;

        assert!(client.close());
        assert!(!client.close());

        let result = client
            .call("echo", |echo| async move { echo.echo("hi").await })
            .await;
        assert!(matches!(result, Err(DurableClientError::Closed(_))));
        assert_eq!(client.calls_issued(), 0);
    }
}
