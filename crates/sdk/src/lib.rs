//! # Soma SDK
//!
//! Building blocks for long-running, resumable agents on top of
//! [`soma_durable`].
//!
//! ## Features
//!
//! - **Chat pattern**: turns until the handler reports its goal achieved
//! - **Workflow pattern**: a single handler run that new input can interrupt and restart
//! - **Durable MCP client**: every MCP call is a uniquely keyed, replayable step
//! - **Registration**: agents and typed functions with JSON Schema metadata
//! - **Task API**: history and message endpoints of the Soma server
//!
//! ## Example
//!
//! ```ignore
//! use soma_sdk::prelude::*;
//!
//! let claim = chat(|params: ChatParams<(), ()>| async move {
//!     if params.history.len() > 2 {
//!         return Ok(TurnOutcome::Achieved(params.history.len()));
//!     }
//!     params.messages.send_text("Tell me more about the incident").await?;
//!     Ok::<_, anyhow::Error>(TurnOutcome::Continue)
//! });
//!
//! let agent = create_soma_agent("insurance", "claims", "Claims", "Collects claims",
//!     move |params: HandlerParams| async move {
//!         let run = ChatRunParams::new(params.ctx, params.soma, params.task_id, (), ());
//!         claim.run(run).await?;
//!         Ok(())
//!     });
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod function;
pub mod mcp;
pub mod patterns;
pub mod resync;
pub mod telemetry;

/// Prelude for common imports
pub mod prelude {
    pub use crate::agent::{create_soma_agent, Agent, AgentRegistry, HandlerParams};
    pub use crate::api::{
        CreateMessageRequest, HttpSomaApi, InMemorySomaApi, Message, MessagePart, SomaApi,
        TaskTimelineItem,
    };
    pub use crate::config::SomaConfig;
    pub use crate::error::{ApiError, McpError, PatternError};
    pub use crate::function::{
        create_soma_function, FunctionRegistry, ProviderController, ProviderCredentialController,
        SomaFunction,
    };
    pub use crate::mcp::{with_mcp_client, McpClientConfig, McpConnector, McpSession, SomaMcpClient};
    pub use crate::patterns::{
        chat, signal_new_input, workflow, ChatParams, ChatRunParams, FirstTurn, MessageSender,
        TurnOutcome, WorkflowParams, WorkflowRunParams,
    };
    pub use soma_durable::prelude::*;
}

// Re-export key types at crate root
pub use agent::{
    create_soma_agent, Agent, AgentDescriptor, AgentEntrypoint, AgentRegistry, HandlerParams,
};
pub use api::{HttpSomaApi, InMemorySomaApi, SomaApi};
pub use config::SomaConfig;
pub use error::{ApiError, McpError, PatternError, RegistryError};
pub use function::{
    create_soma_function, AnyFunction, CallbackError, FunctionMetadata, FunctionRegistry,
    InvokeFunctionResponse, ProviderController, ProviderCredentialController, SomaFunction,
};
pub use mcp::{
    get_mcp_url, with_mcp_client, McpClientConfig, McpConnector, McpSession, SomaMcpClient,
};
pub use patterns::{
    chat, signal_new_input, workflow, ChatHandler, ChatParams, ChatPattern, ChatRunParams,
    FirstTurn, MessageSender, TurnOutcome, WorkflowHandler, WorkflowParams, WorkflowPattern,
    WorkflowRunParams, NEW_INPUT_PROMISE,
};
pub use resync::{resync_sdk, resync_with_backoff, resync_with_backoff_if};
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};

pub use soma_durable;
