//! Journal events for persistence

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one durable step within a run
///
/// A step is identified by its name plus the number of times that name was
/// used earlier in the same execution. Handlers that call `fetch_history` on
/// every turn therefore get `fetch_history#0`, `fetch_history#1`, ... and a
/// replay that follows the same program order reproduces the same keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepKey {
    /// Name given by the caller (e.g. `fetch_history`)
    pub name: String,

    /// Zero-based occurrence of `name` within the run
    pub occurrence: u32,
}

impl StepKey {
    pub fn new(name: impl Into<String>, occurrence: u32) -> Self {
        Self {
            name: name.into(),
            occurrence,
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.occurrence)
    }
}

/// Recorded outcome of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step function returned a value
    Completed { result: serde_json::Value },

    /// The step function failed; replays surface the same message
    Failed { message: String },
}

/// Outcome delivered to an awakeable by an external actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AwakeableOutcome {
    Resolved { payload: serde_json::Value },
    Rejected { reason: String },
}

/// Events appended to a run's journal
///
/// The journal is append-only and ordered by call sequence. It is the audit
/// trail of a run: every step result, every awakeable allocation and
/// completion, and every state write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEvent {
    // =========================================================================
    // Step Events
    // =========================================================================
    /// A step ran to completion
    StepCompleted {
        step: StepKey,
        result: serde_json::Value,
    },

    /// A step failed
    StepFailed { step: StepKey, message: String },

    // =========================================================================
    // Awakeable Events
    // =========================================================================
    /// An awakeable was allocated
    AwakeableCreated { awakeable_id: String },

    /// An external actor resolved an awakeable
    AwakeableResolved {
        awakeable_id: String,
        payload: serde_json::Value,
    },

    /// An external actor rejected an awakeable
    AwakeableRejected {
        awakeable_id: String,
        reason: String,
    },

    // =========================================================================
    // State Events
    // =========================================================================
    /// A state slot was written
    StateSet {
        key: String,
        value: serde_json::Value,
    },

    /// A state slot was removed
    StateCleared { key: String },
}

impl JournalEvent {
    /// Build the event recording a step outcome
    pub fn for_step(step: StepKey, outcome: &StepOutcome) -> Self {
        match outcome {
            StepOutcome::Completed { result } => Self::StepCompleted {
                step,
                result: result.clone(),
            },
            StepOutcome::Failed { message } => Self::StepFailed {
                step,
                message: message.clone(),
            },
        }
    }

    /// Build the event recording an awakeable completion
    pub fn for_awakeable(awakeable_id: &str, outcome: &AwakeableOutcome) -> Self {
        match outcome {
            AwakeableOutcome::Resolved { payload } => Self::AwakeableResolved {
                awakeable_id: awakeable_id.to_string(),
                payload: payload.clone(),
            },
            AwakeableOutcome::Rejected { reason } => Self::AwakeableRejected {
                awakeable_id: awakeable_id.to_string(),
                reason: reason.clone(),
            },
        }
    }

    /// The step this event belongs to, if it is a step event
    pub fn step(&self) -> Option<&StepKey> {
        match self {
            Self::StepCompleted { step, .. } | Self::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Check whether this is a step event for the given step name
    pub fn is_step_named(&self, name: &str) -> bool {
        self.step().is_some_and(|step| step.name == name)
    }
}
