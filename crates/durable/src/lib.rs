//! # Durable Call Substrate
//!
//! Replay-safe primitives for long-running, resumable agent procedures.
//!
//! ## Features
//!
//! - **Memoized steps**: `run(name, f)` executes `f` at most once per step and replays the recorded result
//! - **Awakeables**: futures completed by external actors that reference them by id
//! - **Run state**: small key/value slots per run (e.g. the current listen handle)
//! - **Durable client wrapper**: every call on an external client becomes a uniquely keyed step
//! - **Retry policies**: linear and fixed backoff for callers that retry on their own
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Handler code (patterns, agents, tools)            │
//! │      uses DurableContext / DurableContextExt / DurableClient │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         DurableRun                           │
//! │  (assigns step keys from call order, replays the journal)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        JournalStore                          │
//! │   (step outcomes, awakeables, run state, ordered journal)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use soma_durable::prelude::*;
//!
//! let store: Arc<dyn JournalStore> = Arc::new(InMemoryJournalStore::new());
//! let ctx = DurableRun::start("task-42", store.clone()).await?;
//!
//! // Executed once; a replay of "task-42" returns the recorded value
//! let order_id: String = ctx.run("create_order", || async { Ok(create_order().await?) }).await?;
//!
//! // Suspend until someone completes the awakeable
//! let approval = ctx.awakeable().await?;
//! notify_approver(&approval.id).await?;
//! let approved: bool = approval.wait().await?;
//! ```

pub mod client;
pub mod context;
pub mod engine;
pub mod persistence;
pub mod reliability;

/// Prelude for common imports
pub mod prelude {
    pub use crate::client::{DurableClient, DurableClientError};
    pub use crate::context::{
        Awakeable, AwakeablePromise, DurableContext, DurableContextExt, StepAction, StepError,
    };
    pub use crate::engine::DurableRun;
    pub use crate::persistence::{
        AwakeableOutcome, InMemoryJournalStore, JournalEvent, JournalStore, StepKey,
        StepOutcome, StoreError,
    };
    pub use crate::reliability::{BackoffStrategy, RetryPolicy};
}

// Re-export key types at crate root
pub use client::{DurableClient, DurableClientError};
pub use context::{
    Awakeable, AwakeablePromise, DurableContext, DurableContextExt, StepAction, StepError,
    StepFuture,
};
pub use engine::DurableRun;
pub use persistence::{
    AwakeableOutcome, InMemoryJournalStore, JournalEvent, JournalStore, RunInfo, StepKey,
    StepOutcome, StoreError,
};
pub use reliability::{BackoffStrategy, RetryPolicy};
