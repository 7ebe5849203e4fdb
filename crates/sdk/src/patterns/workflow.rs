//! Workflow pattern: one handler run, optionally restarted by new input

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, Either};
use serde::{Deserialize, Serialize};
use soma_durable::{DurableContext, DurableContextExt, StepError};
use tracing::{debug, info};
use uuid::Uuid;

use super::{fetch_history, listen_for_new_input, MessageSender};
use crate::api::{SomaApi, TaskTimelineItem};
use crate::error::PatternError;

/// Everything a workflow handler receives for one attempt
pub struct WorkflowParams<B, I> {
    pub ctx: Arc<dyn DurableContext>,
    pub soma: Arc<dyn SomaApi>,
    pub bridge: B,
    pub input: I,
    /// History snapshot fetched at the start of this attempt
    pub history: Vec<TaskTimelineItem>,
    pub messages: MessageSender,
    pub interruptable: bool,
    /// 1-based attempt number; increases each time new input restarts the handler
    pub attempt: u32,
}

/// Handler invoked once per workflow attempt
#[async_trait]
pub trait WorkflowHandler<B, I, O>: Send + Sync {
    async fn execute(&self, params: WorkflowParams<B, I>) -> anyhow::Result<O>;
}

#[async_trait]
impl<B, I, O, F, Fut> WorkflowHandler<B, I, O> for F
where
    B: Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(WorkflowParams<B, I>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    async fn execute(&self, params: WorkflowParams<B, I>) -> anyhow::Result<O> {
        (self)(params).await
    }
}

/// Parameters for one workflow pattern invocation
pub struct WorkflowRunParams<B, I> {
    pub ctx: Arc<dyn DurableContext>,
    pub soma: Arc<dyn SomaApi>,
    pub task_id: Uuid,
    pub bridge: B,
    pub input: I,
    pub interruptable: bool,
}

impl<B, I> WorkflowRunParams<B, I> {
    pub fn new(
        ctx: Arc<dyn DurableContext>,
        soma: Arc<dyn SomaApi>,
        task_id: Uuid,
        bridge: B,
        input: I,
    ) -> Self {
        Self {
            ctx,
            soma,
            task_id,
            bridge,
            input,
            interruptable: false,
        }
    }

    /// Restart the handler when new input arrives before it finishes
    pub fn interruptable(mut self, interruptable: bool) -> Self {
        self.interruptable = interruptable;
        self
    }
}

/// Workflow pattern engine
///
/// Each attempt publishes a fresh listen handle, fetches history and runs
/// the handler in its own step scope (`workflow_attempt#n`):
/// - not interruptable: the handler's result is returned as is
/// - interruptable: the handler races the listen handle; if input wins, the
///   in-flight handler future is dropped and a new attempt starts with
///   re-fetched history. Steps the abandoned attempt already completed stay
///   recorded. When both are ready at the same time the handler wins.
///
/// The winner of each race is journaled as the step `workflow_attempt_outcome`.
/// A replay follows the recorded winner instead of racing again: an attempt
/// that was interrupted is skipped without polling its handler, and an
/// attempt that finished replays its handler to completion.
pub struct WorkflowPattern<H> {
    handler: H,
}

/// How one interruptable attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AttemptOutcome {
    Finished,
    Interrupted,
}

const ATTEMPT_SCOPE: &str = "workflow_attempt";
const ATTEMPT_OUTCOME: &str = "workflow_attempt_outcome";

async fn record_outcome(
    ctx: &Arc<dyn DurableContext>,
    outcome: AttemptOutcome,
) -> Result<AttemptOutcome, StepError> {
    ctx.run(ATTEMPT_OUTCOME, move || async move { Ok(outcome) })
        .await
}

/// Wrap a handler in the workflow pattern
///
/// # Example
///
/// ```ignore
/// let assess = workflow(|params: WorkflowParams<Bridge, Claim>| async move {
///     let verdict = assess_claim(&params.input).await?;
///     params.messages.send_text(format!("Assessment: {verdict}")).await?;
///     Ok::<_, anyhow::Error>(verdict)
/// });
///
/// let verdict = assess
///     .run(WorkflowRunParams::new(ctx, soma, task_id, bridge, claim).interruptable(true))
///     .await?;
/// ```
pub fn workflow<H>(handler: H) -> WorkflowPattern<H> {
    WorkflowPattern { handler }
}

impl<H> WorkflowPattern<H> {
    /// Run the workflow to completion
    pub async fn run<B, I, O>(&self, params: WorkflowRunParams<B, I>) -> Result<O, PatternError>
    where
        H: WorkflowHandler<B, I, O>,
        B: Clone + Send + Sync + 'static,
        I: Clone + Send + Sync + 'static,
        O: Send + 'static,
    {
        let WorkflowRunParams {
            ctx,
            soma,
            task_id,
            bridge,
            input,
            interruptable,
        } = params;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let new_input = listen_for_new_input(ctx.as_ref()).await?;
            let history = fetch_history(&ctx, &soma, task_id).await?;
            info!(
                run_id = %ctx.run_id(),
                task_id = %task_id,
                attempt,
                interruptable,
                "Workflow attempt starting"
            );

            let attempt_ctx = ctx.scope(ATTEMPT_SCOPE);
            let attempt_params = WorkflowParams {
                ctx: attempt_ctx.clone(),
                soma: soma.clone(),
                bridge: bridge.clone(),
                input: input.clone(),
                history,
                messages: MessageSender::new(attempt_ctx, soma.clone(), task_id),
                interruptable,
                attempt,
            };

            if !interruptable {
                return self
                    .handler
                    .execute(attempt_params)
                    .await
                    .map_err(PatternError::Handler);
            }

            match ctx.recorded_step_as::<AttemptOutcome>(ATTEMPT_OUTCOME).await? {
                Some(AttemptOutcome::Finished) => {
                    debug!(run_id = %ctx.run_id(), attempt, "Replaying finished attempt");
                    let result = self.handler.execute(attempt_params).await;
                    record_outcome(&ctx, AttemptOutcome::Finished).await?;
                    return result.map_err(PatternError::Handler);
                }
                Some(AttemptOutcome::Interrupted) => {
                    debug!(run_id = %ctx.run_id(), attempt, "Skipping interrupted attempt");
                    drop(attempt_params);
                    new_input.promise.await?;
                    record_outcome(&ctx, AttemptOutcome::Interrupted).await?;
                    continue;
                }
                None => {}
            }

            let handler = self.handler.execute(attempt_params);
            match future::select(handler, new_input.promise).await {
                Either::Left((result, _listener)) => {
                    debug!(run_id = %ctx.run_id(), attempt, "Workflow handler finished first");
                    record_outcome(&ctx, AttemptOutcome::Finished).await?;
                    return result.map_err(PatternError::Handler);
                }
                Either::Right((signal, abandoned)) => {
                    drop(abandoned);
                    signal?;
                    record_outcome(&ctx, AttemptOutcome::Interrupted).await?;
                    info!(
                        run_id = %ctx.run_id(),
                        attempt,
                        "New input arrived, restarting workflow handler"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemorySomaApi;
    use soma_durable::{DurableRun, InMemoryJournalStore, JournalStore};

    async fn params(interruptable: bool) -> WorkflowRunParams<(), u32> {
        let store: Arc<dyn JournalStore> = Arc::new(InMemoryJournalStore::new());
        let ctx = DurableRun::start("workflow-1", store).await.unwrap();
        WorkflowRunParams::new(
            Arc::new(ctx),
            Arc::new(InMemorySomaApi::new()),
            Uuid::now_v7(),
            (),
            20,
        )
        .interruptable(interruptable)
    }

    #[tokio::test]
    async fn test_returns_handler_result() {
        let pattern = workflow(|params: WorkflowParams<(), u32>| async move {
            Ok::<_, anyhow::Error>(params.input * 2 + params.attempt)
        });

        for interruptable in [false, true] {
            let result: u32 = pattern.run(params(interruptable).await).await.unwrap();
            assert_eq!(result, 41);
        }
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let pattern = workflow(|_params: WorkflowParams<(), u32>| async move {
            Err::<u32, _>(anyhow::anyhow!("assessment service down"))
        });

        let result = pattern.run(params(true).await).await;
        assert!(matches!(result, Err(PatternError::Handler(_))));
    }
}
