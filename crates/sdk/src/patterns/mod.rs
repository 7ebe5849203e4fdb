//! Interaction patterns
//!
//! Two durable control loops built on [`DurableContext`]:
//! - [`ChatPattern`] runs turns until the handler reports the goal achieved
//! - [`WorkflowPattern`] runs a handler once, optionally restarting it when
//!   new input arrives before it finishes
//!
//! Both patterns publish the id of the awakeable they are listening on under
//! the [`NEW_INPUT_PROMISE`] state key. Whoever delivers new input completes
//! exactly that awakeable (see [`signal_new_input`]); older ids are never
//! honored again.

mod chat;
mod workflow;

use std::fmt;
use std::sync::Arc;

use soma_durable::{
    Awakeable, AwakeableOutcome, DurableContext, DurableContextExt, JournalStore, StepError,
    StoreError,
};
use tracing::debug;
use uuid::Uuid;

use crate::api::{CreateMessageRequest, CreateMessageResponse, SomaApi, TaskTimelineItem};

pub use chat::{chat, ChatHandler, ChatParams, ChatPattern, ChatRunParams, FirstTurn, TurnOutcome};
pub use workflow::{workflow, WorkflowHandler, WorkflowParams, WorkflowPattern, WorkflowRunParams};

/// State key holding the id of the awakeable to resolve on new input
pub const NEW_INPUT_PROMISE: &str = "new_input_promise";

/// Page size used when fetching history for a turn
pub const HISTORY_PAGE_SIZE: u32 = 1000;

/// Durable capability to post messages to the task
#[derive(Clone)]
pub struct MessageSender {
    ctx: Arc<dyn DurableContext>,
    soma: Arc<dyn SomaApi>,
    task_id: Uuid,
}

impl MessageSender {
    pub fn new(ctx: Arc<dyn DurableContext>, soma: Arc<dyn SomaApi>, task_id: Uuid) -> Self {
        Self { ctx, soma, task_id }
    }

    /// Task messages are posted to
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Post a message as the durable step `send_message`
    pub async fn send(
        &self,
        request: CreateMessageRequest,
    ) -> Result<CreateMessageResponse, StepError> {
        let soma = self.soma.clone();
        let task_id = self.task_id;
        self.ctx
            .run("send_message", move || async move {
                Ok(soma.send_message(task_id, request).await?)
            })
            .await
    }

    /// Post a single text part authored by the agent
    pub async fn send_text(
        &self,
        text: impl Into<String>,
    ) -> Result<CreateMessageResponse, StepError> {
        self.send(CreateMessageRequest::agent_text(text)).await
    }
}

impl fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSender")
            .field("run_id", &self.ctx.run_id())
            .field("task_id", &self.task_id)
            .finish()
    }
}

/// Fetch the first history page as the durable step `fetch_history`
pub async fn fetch_history(
    ctx: &Arc<dyn DurableContext>,
    soma: &Arc<dyn SomaApi>,
    task_id: Uuid,
) -> Result<Vec<TaskTimelineItem>, StepError> {
    let soma = soma.clone();
    ctx.run("fetch_history", move || async move {
        let page = soma.task_history(task_id, HISTORY_PAGE_SIZE, None).await?;
        Ok(page.items)
    })
    .await
}

/// Allocate an awakeable and publish it as the current listen handle
///
/// Publishing is journaled as the step `listen_for_new_input`. A replay
/// skips the publish for handles it already published, so the stored handle
/// keeps pointing at the newest one while older turns are replayed.
pub async fn listen_for_new_input(ctx: &dyn DurableContext) -> Result<Awakeable, StepError> {
    const PUBLISH_STEP: &str = "listen_for_new_input";

    let awakeable = ctx.awakeable().await?;
    match ctx.recorded_step_as::<String>(PUBLISH_STEP).await? {
        Some(published) => {
            debug!(run_id = %ctx.run_id(), awakeable_id = %published, "Listen handle replayed");
        }
        None => {
            ctx.set_state(NEW_INPUT_PROMISE, serde_json::Value::String(awakeable.id.clone()))
                .await?;
            debug!(
                run_id = %ctx.run_id(),
                awakeable_id = %awakeable.id,
                "Listening for new input"
            );
        }
    }

    let id = awakeable.id.clone();
    let _: String = ctx
        .run(PUBLISH_STEP, move || async move { Ok(id) })
        .await?;
    Ok(awakeable)
}

/// Deliver new input to a run
///
/// Resolves the awakeable currently published under [`NEW_INPUT_PROMISE`]
/// and returns its id. Returns `None` when the run is not listening, either
/// because no handle was published yet or because the published handle was
/// already resolved and the run has not allocated a new one. The input
/// itself is expected to be in the task history already; the payload only
/// wakes the run.
pub async fn signal_new_input(
    store: &dyn JournalStore,
    run_id: &str,
    payload: serde_json::Value,
) -> Result<Option<String>, StepError> {
    let Some(value) = store.get_state(run_id, NEW_INPUT_PROMISE).await? else {
        debug!(run_id = %run_id, "No listener registered for new input");
        return Ok(None);
    };
    let awakeable_id: String =
        serde_json::from_value(value).map_err(|e| StepError::serialization(NEW_INPUT_PROMISE, e))?;

    match store
        .complete_awakeable(&awakeable_id, AwakeableOutcome::Resolved { payload })
        .await
    {
        Ok(()) => Ok(Some(awakeable_id)),
        Err(StoreError::AwakeableAlreadyCompleted(_)) => {
            debug!(run_id = %run_id, awakeable_id = %awakeable_id, "Listener already signalled");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
