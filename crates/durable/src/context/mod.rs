//! Durable context: the interface handlers use to perform replay-safe work
//!
//! Everything a handler does that must survive a crash goes through a
//! [`DurableContext`]:
//! - [`DurableContext::run_raw`] / [`DurableContextExt::run`] execute a
//!   function at most once per step and replay the recorded result
//! - [`DurableContext::awakeable`] creates a future completed from outside
//! - state slots hold small values such as the current listen handle
//! - [`DurableContext::scope`] gives a block of work its own step names, so
//!   skipping that block on replay leaves the caller's steps untouched

mod awakeable;
mod error;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use awakeable::{Awakeable, AwakeablePromise};
pub use error::StepError;

/// Future produced by a step function
pub type StepFuture = BoxFuture<'static, anyhow::Result<serde_json::Value>>;

/// Type-erased step function, invoked at most once
pub type StepAction = Box<dyn FnOnce() -> StepFuture + Send>;

/// Handle bound to one logical run
///
/// Implementations record every step in call order. Replaying the same
/// handler code against the same run must produce the same sequence of
/// step names, because step identity is derived from that order.
#[async_trait]
pub trait DurableContext: Send + Sync {
    /// Identifier of the run this context is bound to
    fn run_id(&self) -> &str;

    /// Execute `action` under the step `name`, or replay its recorded result
    async fn run_raw(&self, name: &str, action: StepAction)
        -> Result<serde_json::Value, StepError>;

    /// Recorded result of the next `name` step, without consuming it
    ///
    /// `Ok(None)` means the next `name` step has not happened yet, i.e. the
    /// run is past the replayed part of its journal for that name.
    async fn recorded_step(&self, name: &str) -> Result<Option<serde_json::Value>, StepError>;

    /// Child context whose steps and awakeables are named under a new scope
    ///
    /// Each call opens a distinct scope (`name#occurrence`), allocated in call
    /// order like steps. The child has its own occurrence counters.
    fn scope(&self, name: &str) -> Arc<dyn DurableContext>;

    /// Allocate a new awakeable
    async fn awakeable(&self) -> Result<Awakeable, StepError>;

    /// Write a state slot
    async fn set_state(&self, key: &str, value: serde_json::Value) -> Result<(), StepError>;

    /// Read a state slot
    async fn get_state(&self, key: &str) -> Result<Option<serde_json::Value>, StepError>;

    /// Remove a state slot
    async fn clear_state(&self, key: &str) -> Result<(), StepError>;
}

/// Typed helpers on top of [`DurableContext`]
#[async_trait]
pub trait DurableContextExt: DurableContext {
    /// Run a typed step
    ///
    /// The result is stored as JSON and deserialized into `T` on replay.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: u32 = ctx.run("count_items", || async { Ok(42) }).await?;
    /// ```
    async fn run<T, F, Fut>(&self, name: &str, f: F) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let action: StepAction = Box::new(move || {
            Box::pin(async move {
                let value = f().await?;
                Ok(serde_json::to_value(value)?)
            })
        });

        let raw = self.run_raw(name, action).await?;
        serde_json::from_value(raw).map_err(|e| StepError::serialization(name, e))
    }

    /// Typed form of [`DurableContext::recorded_step`]
    async fn recorded_step_as<T>(&self, name: &str) -> Result<Option<T>, StepError>
    where
        T: DeserializeOwned + Send,
    {
        match self.recorded_step(name).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StepError::serialization(name, e)),
            None => Ok(None),
        }
    }

    /// Read a typed state slot
    async fn get_state_as<T>(&self, key: &str) -> Result<Option<T>, StepError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_state(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StepError::serialization(key, e)),
            None => Ok(None),
        }
    }
}

impl<C: DurableContext + ?Sized> DurableContextExt for C {}
