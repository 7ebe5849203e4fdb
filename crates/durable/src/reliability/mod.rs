//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Linear or fixed backoff for caller-driven retry loops

mod retry;

pub use retry::{BackoffStrategy, RetryPolicy};
