//! Chat pattern: repeated turns until the goal is achieved

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use soma_durable::{Awakeable, DurableContext};
use tracing::{debug, info};
use uuid::Uuid;

use super::{fetch_history, listen_for_new_input, MessageSender};
use crate::api::{SomaApi, TaskTimelineItem};
use crate::error::PatternError;

/// Who speaks first in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirstTurn {
    /// Wait for the user's first message before the first turn
    #[default]
    User,
    /// Run the first turn immediately
    Agent,
}

/// Result of one chat turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome<O> {
    /// Keep the conversation going; wait for the next input
    Continue,
    /// The goal was achieved with this output; the chat ends
    Achieved(O),
}

/// Everything a chat handler receives for one turn
pub struct ChatParams<B, I> {
    pub ctx: Arc<dyn DurableContext>,
    pub soma: Arc<dyn SomaApi>,
    pub bridge: B,
    pub input: I,
    /// History snapshot fetched at the start of this turn
    pub history: Vec<TaskTimelineItem>,
    pub messages: MessageSender,
    /// 1-based turn number
    pub turn: u32,
}

/// Handler invoked once per chat turn
///
/// Implemented for closures `Fn(ChatParams<B, I>) -> impl Future<Output =
/// anyhow::Result<TurnOutcome<O>>>`; implement it directly for handlers that
/// carry their own state.
#[async_trait]
pub trait ChatHandler<B, I, O>: Send + Sync {
    async fn on_turn(&self, params: ChatParams<B, I>) -> anyhow::Result<TurnOutcome<O>>;
}

#[async_trait]
impl<B, I, O, F, Fut> ChatHandler<B, I, O> for F
where
    B: Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(ChatParams<B, I>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TurnOutcome<O>>> + Send + 'static,
{
    async fn on_turn(&self, params: ChatParams<B, I>) -> anyhow::Result<TurnOutcome<O>> {
        (self)(params).await
    }
}

/// Parameters for one chat pattern invocation
pub struct ChatRunParams<B, I> {
    pub ctx: Arc<dyn DurableContext>,
    pub soma: Arc<dyn SomaApi>,
    pub task_id: Uuid,
    pub bridge: B,
    pub input: I,
    pub first_turn: FirstTurn,
}

impl<B, I> ChatRunParams<B, I> {
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
            first_turn: FirstTurn::default(),
        }
    }

    /// Set who speaks first
    pub fn with_first_turn(mut self, first_turn: FirstTurn) -> Self {
        self.first_turn = first_turn;
        self
    }
}

enum ChatState {
    WaitingForFirstTurn(Awakeable),
    RunningTurn,
    WaitingForNextTurn(Awakeable),
    Done,
}

/// Chat pattern engine
///
/// ```text
///            first_turn = user              first_turn = agent
///                  │                               │
///                  ▼                               │
///        WaitingForFirstTurn ──input──► RunningTurn ◄┘
///                                       │      ▲
///                              Continue │      │ input
///                                       ▼      │
///                                WaitingForNextTurn
///
///                      Achieved(o) ──► Done ──► o
/// ```
///
/// Every turn fetches history fresh. Inputs that arrive while a turn is
/// running are not queued as separate turns; the next turn sees all of them
/// in its history.
pub struct ChatPattern<H> {
    handler: H,
}

/// Wrap a handler in the chat pattern
///
/// # Example
///
/// ```ignore
/// let claim = chat(|params: ChatParams<Bridge, ()>| async move {
///     if let Some(claim) = extract_claim(&params.history) {
///         return Ok(TurnOutcome::Achieved(claim));
///     }
///     params.messages.send_text("Could you describe the damage?").await?;
///     Ok::<_, anyhow::Error>(TurnOutcome::Continue)
/// });
///
/// let claim: Claim = claim.run(ChatRunParams::new(ctx, soma, task_id, bridge, ())).await?;
/// ```
pub fn chat<H>(handler: H) -> ChatPattern<H> {
    ChatPattern { handler }
}

impl<H> ChatPattern<H> {
    /// Run the chat until the handler achieves its goal
    pub async fn run<B, I, O>(&self, params: ChatRunParams<B, I>) -> Result<O, PatternError>
    where
        H: ChatHandler<B, I, O>,
        B: Clone + Send + Sync + 'static,
        I: Clone + Send + Sync + 'static,
        O: Send + 'static,
    {
        let ChatRunParams {
            ctx,
            soma,
            task_id,
            bridge,
            input,
            first_turn,
        } = params;

        let mut state = match first_turn {
            FirstTurn::User => {
                ChatState::WaitingForFirstTurn(listen_for_new_input(ctx.as_ref()).await?)
            }
            FirstTurn::Agent => ChatState::RunningTurn,
        };
        let mut output = None;
        let mut turn = 0u32;

        info!(
            run_id = %ctx.run_id(),
            task_id = %task_id,
            first_turn = ?first_turn,
            "Chat started"
        );

        loop {
            state = match state {
                ChatState::WaitingForFirstTurn(awakeable)
                | ChatState::WaitingForNextTurn(awakeable) => {
                    debug!(
                        run_id = %ctx.run_id(),
                        awakeable_id = %awakeable.id,
                        "Waiting for input"
                    );
                    awakeable.promise.await?;
                    ChatState::RunningTurn
                }
                ChatState::RunningTurn => {
                    turn += 1;
                    let history = fetch_history(&ctx, &soma, task_id).await?;
                    debug!(
                        run_id = %ctx.run_id(),
                        turn,
                        history_len = history.len(),
                        "Running chat turn"
                    );

                    let turn_params = ChatParams {
                        ctx: ctx.clone(),
                        soma: soma.clone(),
                        bridge: bridge.clone(),
                        input: input.clone(),
                        history,
                        messages: MessageSender::new(ctx.clone(), soma.clone(), task_id),
                        turn,
                    };

                    match self
                        .handler
                        .on_turn(turn_params)
                        .await
                        .map_err(PatternError::Handler)?
                    {
                        TurnOutcome::Achieved(value) => {
                            output = Some(value);
                            ChatState::Done
                        }
                        TurnOutcome::Continue => {
                            ChatState::WaitingForNextTurn(listen_for_new_input(ctx.as_ref()).await?)
                        }
                    }
                }
                ChatState::Done => {
                    info!(run_id = %ctx.run_id(), turns = turn, "Chat goal achieved");
                    return output.ok_or(PatternError::GoalNotAchieved);
                }
            };
        }
    }
}
