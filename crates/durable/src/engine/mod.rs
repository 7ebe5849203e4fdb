//! Execution engine for durable runs
//!
//! This module provides:
//! - [`DurableRun`] the journal-backed [`DurableContext`](crate::DurableContext)

mod run;

pub use run::DurableRun;
