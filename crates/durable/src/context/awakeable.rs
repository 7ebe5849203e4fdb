//! Externally completed futures

use std::fmt;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use super::StepError;

/// Future side of an awakeable
pub type AwakeablePromise = BoxFuture<'static, Result<serde_json::Value, StepError>>;

/// A handle that an external actor completes by id
///
/// The `id` is handed to the outside world (usually stored in run state)
/// and `promise` resolves once something resolves or rejects that id.
pub struct Awakeable {
    /// Opaque id used by external actors to complete this awakeable
    pub id: String,

    /// Resolves with the payload supplied by the external actor
    pub promise: AwakeablePromise,
}

impl Awakeable {
    pub fn new(id: impl Into<String>, promise: AwakeablePromise) -> Self {
        Self {
            id: id.into(),
            promise,
        }
    }

    /// Wait for the payload and deserialize it
    pub async fn wait<T: DeserializeOwned>(self) -> Result<T, StepError> {
        let id = self.id;
        let payload = self.promise.await?;
        serde_json::from_value(payload).map_err(|e| StepError::serialization(id, e))
    }
}

impl fmt::Debug for Awakeable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Awakeable").field("id", &self.id).finish()
    }
}
