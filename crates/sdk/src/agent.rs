// Agent registration
//
// An Agent binds an entrypoint to the identifiers the transport layer uses
// to route invocations. Registration only stores values; it never touches
// durable state, so registering the same agent twice is harmless.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use soma_durable::DurableContext;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::SomaApi;
use crate::error::RegistryError;

/// What an agent entrypoint receives on each invocation
pub struct HandlerParams {
    pub task_id: Uuid,
    pub context_id: Uuid,
    pub ctx: Arc<dyn DurableContext>,
    pub soma: Arc<dyn SomaApi>,
}

/// Agent entrypoint
///
/// Implemented for closures `Fn(HandlerParams) -> impl Future<Output =
/// anyhow::Result<()>>`.
#[async_trait]
pub trait AgentEntrypoint: Send + Sync {
    async fn call(&self, params: HandlerParams) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> AgentEntrypoint for F
where
    F: Fn(HandlerParams) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, params: HandlerParams) -> anyhow::Result<()> {
        (self)(params).await
    }
}

/// Static description of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub project_id: String,
    pub agent_id: String,
    pub name: String,
    pub description: String,
}

impl AgentDescriptor {
    /// Name the durable substrate registers the agent under
    pub fn service_name(&self) -> String {
        format!("{}.{}", self.project_id, self.agent_id)
    }
}

/// An agent: descriptor plus entrypoint
#[derive(Clone)]
pub struct Agent {
    descriptor: AgentDescriptor,
    entrypoint: Arc<dyn AgentEntrypoint>,
}

/// Create an agent
///
/// # Example
///
/// ```ignore
/// let agent = create_soma_agent(
///     "insurance",
///     "claims",
///     "Claims agent",
///     "Collects and assesses insurance claims",
///     |params: HandlerParams| async move { run_claim(params).await },
/// );
/// ```
pub fn create_soma_agent(
    project_id: impl Into<String>,
    agent_id: impl Into<String>,
    name: impl Into<String>,
    description: impl Into<String>,
    entrypoint: impl AgentEntrypoint + 'static,
) -> Agent {
    Agent {
        descriptor: AgentDescriptor {
            project_id: project_id.into(),
            agent_id: agent_id.into(),
            name: name.into(),
            description: description.into(),
        },
        entrypoint: Arc::new(entrypoint),
    }
}

impl Agent {
    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn project_id(&self) -> &str {
        &self.descriptor.project_id
    }

    pub fn agent_id(&self) -> &str {
        &self.descriptor.agent_id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn service_name(&self) -> String {
        self.descriptor.service_name()
    }

    /// Invoke the entrypoint
    pub async fn invoke(&self, params: HandlerParams) -> anyhow::Result<()> {
        debug!(
            service = %self.service_name(),
            task_id = %params.task_id,
            context_id = %params.context_id,
            "Invoking agent entrypoint"
        );
        self.entrypoint.call(params).await
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Agents known to this process, keyed by `(project_id, agent_id)`
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<(String, String), Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any agent with the same ids
    ///
    /// Returns `true` if the agent was not registered before.
    pub fn register(&self, agent: Agent) -> bool {
        let key = (agent.project_id().to_string(), agent.agent_id().to_string());
        let service = agent.service_name();
        let is_new = self.agents.write().insert(key, agent).is_none();
        if is_new {
            info!(service = %service, "Agent registered");
        } else {
            debug!(service = %service, "Agent re-registered");
        }
        is_new
    }

    pub fn get(&self, project_id: &str, agent_id: &str) -> Option<Agent> {
        self.agents
            .read()
            .get(&(project_id.to_string(), agent_id.to_string()))
            .cloned()
    }

    /// Look up an agent by its service name (`{project_id}.{agent_id}`)
    pub fn get_by_service_name(&self, service_name: &str) -> Result<Agent, RegistryError> {
        self.agents
            .read()
            .values()
            .find(|agent| agent.service_name() == service_name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownAgent(service_name.to_string()))
    }

    /// Descriptors of all registered agents, sorted by service name
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        let mut descriptors: Vec<_> = self
            .agents
            .read()
            .values()
            .map(|agent| agent.descriptor.clone())
            .collect();
        descriptors.sort_by_key(AgentDescriptor::service_name);
        descriptors
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}
