//! Durable MCP client
//!
//! Every call made through a [`SomaMcpClient`] is a durable step named
//! `mcp-{client_name}-{operation}-index-{n}`, so tool calls, resource reads
//! and prompt fetches are executed once and replayed from the journal
//! afterwards. The transport itself is provided by an [`McpConnector`].
//!
//! Sessions are scoped: [`with_mcp_client`] connects, hands the client to a
//! closure and closes the session on every exit path.

mod types;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use soma_durable::{DurableClient, DurableContext};
use tracing::{debug, warn};

use crate::config::{SomaConfig, DEFAULT_BASE_URL};
use crate::error::McpError;

pub use types::*;

/// A live MCP session
///
/// Mirrors the client half of the protocol. Implementations wrap whatever
/// transport reaches the server (streamable HTTP, stdio, an in-process fake).
#[async_trait]
pub trait McpSession: Send + Sync + 'static {
    async fn ping(&self) -> anyhow::Result<EmptyResult>;

    async fn list_tools(&self, cursor: Option<String>) -> anyhow::Result<ListToolsResult>;

    async fn call_tool(
        &self,
        name: String,
        arguments: Option<ToolArguments>,
    ) -> anyhow::Result<CallToolResult>;

    async fn list_resources(&self, cursor: Option<String>) -> anyhow::Result<ListResourcesResult>;

    async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> anyhow::Result<ListResourceTemplatesResult>;

    async fn read_resource(&self, uri: String) -> anyhow::Result<ReadResourceResult>;

    async fn subscribe_resource(&self, uri: String) -> anyhow::Result<EmptyResult>;

    async fn unsubscribe_resource(&self, uri: String) -> anyhow::Result<EmptyResult>;

    async fn list_prompts(&self, cursor: Option<String>) -> anyhow::Result<ListPromptsResult>;

    async fn get_prompt(
        &self,
        name: String,
        arguments: Option<PromptArguments>,
    ) -> anyhow::Result<GetPromptResult>;

    async fn send_roots_list_changed(&self) -> anyhow::Result<()>;

    /// Tear the session down
    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens MCP sessions
#[async_trait]
pub trait McpConnector: Send + Sync {
    type Session: McpSession;

    async fn connect(&self, url: &str) -> anyhow::Result<Self::Session>;
}

/// Where MCP sessions connect to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpClientConfig {
    /// Soma server base URL; falls back to `SOMA_SERVER_BASE_URL`
    pub soma_base_url: Option<String>,
}

impl From<&SomaConfig> for McpClientConfig {
    fn from(config: &SomaConfig) -> Self {
        Self {
            soma_base_url: Some(config.base_url.clone()),
        }
    }
}

/// URL of the MCP endpoint bridging to a Soma MCP server instance
pub fn get_mcp_url(mcp_server_instance_id: &str, config: &McpClientConfig) -> String {
    let base = config.soma_base_url.clone().unwrap_or_else(|| {
        std::env::var("SOMA_SERVER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
    });
    format!(
        "{}/api/bridge/v1/mcp-instance/{}/mcp",
        base.trim_end_matches('/'),
        mcp_server_instance_id
    )
}

/// MCP client whose calls are durable steps
pub struct SomaMcpClient<S: McpSession> {
    inner: DurableClient<S>,
    client_name: String,
}

impl<S: McpSession> Clone for SomaMcpClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            client_name: self.client_name.clone(),
        }
    }
}

impl<S: McpSession> SomaMcpClient<S> {
    pub fn new(
        ctx: Arc<dyn DurableContext>,
        session: Arc<S>,
        client_name: impl Into<String>,
    ) -> Self {
        let client_name = client_name.into();
        Self {
            inner: DurableClient::new(ctx, session, format!("mcp-{client_name}")),
            client_name,
        }
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Check whether the owning scope is still active
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Number of calls issued through this client and its clones
    pub fn calls_issued(&self) -> u64 {
        self.inner.calls_issued()
    }

    pub(crate) fn close(&self) -> bool {
        self.inner.close()
    }

    pub async fn ping(&self) -> Result<EmptyResult, McpError> {
        Ok(self
            .inner
            .call("ping", |s| async move { s.ping().await })
            .await?)
    }

    pub async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, McpError> {
        Ok(self
            .inner
            .call("listTools", |s| async move { s.list_tools(cursor).await })
            .await?)
    }

    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<ToolArguments>,
    ) -> Result<CallToolResult, McpError> {
        let name = name.into();
        Ok(self
            .inner
            .call("callTool", |s| async move { s.call_tool(name, arguments).await })
            .await?)
    }

    pub async fn list_resources(
        &self,
        cursor: Option<String>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(self
            .inner
            .call("listResources", |s| async move {
                s.list_resources(cursor).await
            })
            .await?)
    }

    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(self
            .inner
            .call("listResourceTemplates", |s| async move {
                s.list_resource_templates(cursor).await
            })
            .await?)
    }

    pub async fn read_resource(
        &self,
        uri: impl Into<String>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = uri.into();
        Ok(self
            .inner
            .call("readResource", |s| async move { s.read_resource(uri).await })
            .await?)
    }

    pub async fn subscribe_resource(
        &self,
        uri: impl Into<String>,
    ) -> Result<EmptyResult, McpError> {
        let uri = uri.into();
        Ok(self
            .inner
            .call("subscribeResource", |s| async move {
                s.subscribe_resource(uri).await
            })
            .await?)
    }

    pub async fn unsubscribe_resource(
        &self,
        uri: impl Into<String>,
    ) -> Result<EmptyResult, McpError> {
        let uri = uri.into();
        Ok(self
            .inner
            .call("unsubscribeResource", |s| async move {
                s.unsubscribe_resource(uri).await
            })
            .await?)
    }

    pub async fn list_prompts(
        &self,
        cursor: Option<String>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(self
            .inner
            .call("listPrompts", |s| async move { s.list_prompts(cursor).await })
            .await?)
    }

    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<PromptArguments>,
    ) -> Result<GetPromptResult, McpError> {
        let name = name.into();
        Ok(self
            .inner
            .call("getPrompt", |s| async move { s.get_prompt(name, arguments).await })
            .await?)
    }

    pub async fn send_roots_list_changed(&self) -> Result<(), McpError> {
        Ok(self
            .inner
            .call("sendRootsListChanged", |s| async move {
                s.send_roots_list_changed().await
            })
            .await?)
    }
}

/// Closes the session when the scope ends, including by cancellation
struct SessionGuard<S: McpSession> {
    session: Option<Arc<S>>,
    client: SomaMcpClient<S>,
}

impl<S: McpSession> SessionGuard<S> {
    async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            self.client.close();
            if let Err(e) = session.close().await {
                warn!(
                    client = %self.client.client_name(),
                    error = %e,
                    "Failed to close MCP session"
                );
            } else {
                debug!(client = %self.client.client_name(), "MCP session closed");
            }
        }
    }
}

impl<S: McpSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.client.close();

        let client_name = self.client.client_name().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(
                            client = %client_name,
                            error = %e,
                            "Failed to close abandoned MCP session"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(client = %client_name, "No runtime available to close abandoned MCP session");
            }
        }
    }
}

/// Connect to an MCP server instance and run `scope` with a durable client
///
/// The session is closed after `scope` returns, whether it succeeded or
/// failed, and also when the returned future is dropped before completion.
/// The client refuses calls once the scope has ended.
///
/// # Example
///
/// ```ignore
/// let scope = |client: SomaMcpClient<_>| async move {
///     let tools = client.list_tools(None).await?;
///     Ok::<_, McpError>(tools.tools)
/// };
/// let tools = with_mcp_client(ctx, &connector, "claims-db", "claims", &config, scope).await?;
/// ```
pub async fn with_mcp_client<C, F, Fut, T, E>(
    ctx: Arc<dyn DurableContext>,
    connector: &C,
    mcp_server_instance_id: &str,
    client_name: &str,
    config: &McpClientConfig,
    scope: F,
) -> Result<T, E>
where
    C: McpConnector,
    F: FnOnce(SomaMcpClient<C::Session>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<McpError>,
{
    let url = get_mcp_url(mcp_server_instance_id, config);
    let session = connector.connect(&url).await.map_err(|e| McpError::Connect {
        url: url.clone(),
        message: format!("{e:#}"),
    })?;
    debug!(client = %client_name, url = %url, "MCP session opened");

    let session = Arc::new(session);
    let client = SomaMcpClient::new(ctx, session.clone(), client_name);
    let mut guard = SessionGuard {
        session: Some(session),
        client: client.clone(),
    };

    let result = scope(client).await;
    guard.close().await;
    result
}
