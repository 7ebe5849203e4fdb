//! Persistence layer for durable runs
//!
//! This module provides:
//! - [`JournalStore`] trait for journals, awakeables and run state
//! - [`InMemoryJournalStore`] for testing
//! - [`JournalEvent`] the append-only journal entries

mod event;
mod memory;
mod store;

pub use event::{AwakeableOutcome, JournalEvent, StepKey, StepOutcome};
pub use memory::InMemoryJournalStore;
pub use store::{JournalStore, RunInfo, StoreError};
