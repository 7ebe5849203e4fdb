//! Durable MCP client over a fake session

mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{eventually, Harness};
use parking_lot::Mutex;
use serde_json::json;
use soma_sdk::mcp::*;
use soma_sdk::prelude::*;

#[derive(Default)]
struct SessionStats {
    urls: Mutex<Vec<String>>,
    calls: AtomicU32,
    closed: AtomicBool,
}

struct FakeSession {
    stats: Arc<SessionStats>,
}

impl FakeSession {
    fn record(&self) -> u32 {
        self.stats.calls.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl McpSession for FakeSession {
    async fn ping(&self) -> anyhow::Result<EmptyResult> {
        self.record();
        Ok(EmptyResult {})
    }

    async fn list_tools(&self, _cursor: Option<String>) -> anyhow::Result<ListToolsResult> {
        let n = self.record();
        Ok(ListToolsResult {
            tools: vec![Tool {
                name: format!("lookup_policy_v{n}"),
                description: None,
                input_schema: json!({"type": "object"}),
            }],
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        name: String,
        arguments: Option<ToolArguments>,
    ) -> anyhow::Result<CallToolResult> {
        let n = self.record();
        if name == "explode" {
            anyhow::bail!("tool {name} crashed");
        }
        let policy = arguments
            .and_then(|args| args.get("policy").cloned())
            .unwrap_or(json!(null));
        Ok(CallToolResult {
            content: vec![Content::text(format!("call {n}: policy {policy} is active"))],
            structured_content: None,
            is_error: false,
        })
    }

    async fn list_resources(&self, _cursor: Option<String>) -> anyhow::Result<ListResourcesResult> {
        self.record();
        Ok(ListResourcesResult::default())
    }

    async fn list_resource_templates(
        &self,
        _cursor: Option<String>,
    ) -> anyhow::Result<ListResourceTemplatesResult> {
        self.record();
        Ok(ListResourceTemplatesResult::default())
    }

    async fn read_resource(&self, uri: String) -> anyhow::Result<ReadResourceResult> {
        self.record();
        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri,
                mime_type: Some("text/plain".into()),
                text: Some("policy terms".into()),
                blob: None,
            }],
        })
    }

    async fn subscribe_resource(&self, _uri: String) -> anyhow::Result<EmptyResult> {
        self.record();
        Ok(EmptyResult {})
    }

    async fn unsubscribe_resource(&self, _uri: String) -> anyhow::Result<EmptyResult> {
        self.record();
        Ok(EmptyResult {})
    }

    async fn list_prompts(&self, _cursor: Option<String>) -> anyhow::Result<ListPromptsResult> {
        self.record();
        Ok(ListPromptsResult::default())
    }

    async fn get_prompt(
        &self,
        name: String,
        _arguments: Option<PromptArguments>,
    ) -> anyhow::Result<GetPromptResult> {
        self.record();
        Ok(GetPromptResult {
            description: Some(name),
            messages: vec![],
        })
    }

    async fn send_roots_list_changed(&self) -> anyhow::Result<()> {
        self.record();
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.stats.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeConnector {
    stats: Arc<SessionStats>,
}

#[async_trait]
impl McpConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, url: &str) -> anyhow::Result<FakeSession> {
        self.stats.urls.lock().push(url.to_string());
        Ok(FakeSession {
            stats: self.stats.clone(),
        })
    }
}

fn config() -> McpClientConfig {
    McpClientConfig {
        soma_base_url: Some("http://soma.test".into()),
    }
}

fn policy_args() -> Option<ToolArguments> {
    json!({"policy": "P-100"}).as_object().cloned()
}

#[test_log::test(tokio::test)]
async fn test_each_call_gets_its_own_step() {
    let harness = Harness::new();
    let connector = FakeConnector::default();
    let ctx = harness.context("mcp-keys").await;

    let scope = |client: SomaMcpClient<FakeSession>| async move {
        client.list_tools(None).await?;
        client.call_tool("lookup", policy_args()).await?;
        client.list_tools(None).await?;
        Ok::<_, McpError>(client.calls_issued())
    };
    let issued = with_mcp_client(ctx, &connector, "policies", "claims", &config(), scope)
        .await
        .unwrap();
    assert_eq!(issued, 3);

    let steps: Vec<String> = harness
        .store
        .load_journal("mcp-keys")
        .await
        .unwrap()
        .into_iter()
        .filter_map(|(_, event)| event.step().map(|step| step.name.clone()))
        .collect();
    assert_eq!(
        steps,
        vec![
            "mcp-claims-listTools-index-0",
            "mcp-claims-callTool-index-1",
            "mcp-claims-listTools-index-2",
        ]
    );
    assert_eq!(
        connector.stats.urls.lock().clone(),
        vec!["http://soma.test/api/bridge/v1/mcp-instance/policies/mcp".to_string()]
    );
}

#[test_log::test(tokio::test)]
async fn test_replay_does_not_reach_the_server() {
    let harness = Harness::new();
    let connector = FakeConnector::default();

    let config = config();
    let (connector_ref, config_ref) = (&connector, &config);
    let run = move |ctx: Arc<dyn DurableContext>| {
        with_mcp_client(ctx, connector_ref, "policies", "claims", config_ref, |client| async move {
            let tools = client.list_tools(None).await?;
            let result = client.call_tool("lookup", policy_args()).await?;
            let terms = client.read_resource("policy://P-100").await?;
            Ok::<_, McpError>((tools, result, terms))
        })
    };

    let first = run(harness.context("mcp-replay").await).await.unwrap();
    assert_eq!(connector.stats.calls.load(Ordering::SeqCst), 3);

    let replayed = run(harness.context("mcp-replay").await).await.unwrap();
    assert_eq!(replayed, first);
    assert_eq!(connector.stats.calls.load(Ordering::SeqCst), 3);
    assert_eq!(first.0.tools[0].name, "lookup_policy_v1");
}

#[test_log::test(tokio::test)]
async fn test_failed_call_is_recorded_and_session_closed() {
    let harness = Harness::new();
    let connector = FakeConnector::default();
    let ctx = harness.context("mcp-fail").await;

    let scope = |client: SomaMcpClient<FakeSession>| async move {
        client.call_tool("explode", None).await?;
        Ok::<_, anyhow::Error>(())
    };
    let result = with_mcp_client(ctx, &connector, "policies", "claims", &config(), scope).await;

    let error = result.unwrap_err();
    assert!(format!("{error:#}").contains("tool explode crashed"));
    assert!(connector.stats.closed.load(Ordering::SeqCst));

    // The failure itself is durable: replay reports it without calling again
    let ctx = harness.context("mcp-fail").await;
    let scope =
        |client: SomaMcpClient<FakeSession>| async move { client.call_tool("explode", None).await };
    let replayed = with_mcp_client(ctx, &connector, "policies", "claims", &config(), scope).await;
    assert!(matches!(replayed, Err(McpError::Step(_))));
    assert_eq!(connector.stats.calls.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn test_session_closed_when_scope_is_cancelled() {
    let harness = Harness::new();
    let connector = Arc::new(FakeConnector::default());
    let ctx = harness.context("mcp-cancel").await;

    let task_connector = connector.clone();
    let handle = tokio::spawn(async move {
        let scope = |client: SomaMcpClient<FakeSession>| async move {
            client.ping().await?;
            std::future::pending::<()>().await;
            Ok::<_, McpError>(())
        };
        with_mcp_client(ctx, task_connector.as_ref(), "policies", "claims", &config(), scope).await
    });

    eventually(|| connector.stats.calls.load(Ordering::SeqCst) == 1).await;
    assert!(!connector.stats.closed.load(Ordering::SeqCst));

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
    eventually(|| connector.stats.closed.load(Ordering::SeqCst)).await;
}

#[test_log::test(tokio::test)]
async fn test_client_refuses_calls_after_scope() {
    let harness = Harness::new();
    let connector = FakeConnector::default();
    let ctx = harness.context("mcp-escape").await;

    let scope = |client: SomaMcpClient<FakeSession>| async move {
        client.send_roots_list_changed().await?;
        Ok::<_, McpError>(client)
    };
    let escaped = with_mcp_client(ctx, &connector, "policies", "claims", &config(), scope)
        .await
        .unwrap();

    assert!(!escaped.is_open());
    let error = escaped.ping().await.unwrap_err();
    assert!(matches!(error, McpError::SessionClosed(name) if name == "mcp-claims"));
    assert_eq!(connector.stats.calls.load(Ordering::SeqCst), 1);
}
