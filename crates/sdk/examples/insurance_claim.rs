//! Insurance claim agent on the in-memory substrate
//!
//! A chat collects the claim from the user, then a workflow asks the
//! `approve-claim` function for a decision and closes the task. The user is
//! simulated by a background task that answers whenever the agent listens.
//! Finally the same run is invoked again to show that a redelivery replays
//! from the journal instead of repeating side effects.
//!
//! Run with:
//!   cargo run -p soma-sdk --example insurance_claim
//!   RUST_LOG=soma_sdk=debug,soma_durable=debug cargo run -p soma-sdk --example insurance_claim

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use soma_sdk::api::{messages, MessageRole, TaskStatus, UpdateTaskStatusRequest};
use soma_sdk::prelude::*;
use soma_sdk::{init_telemetry, TelemetryConfig, NEW_INPUT_PROMISE};
use uuid::Uuid;

const REQUIRED_FIELDS: [&str; 5] = ["date", "category", "reason", "amount", "email"];

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct InsuranceClaim {
    date: String,
    category: String,
    reason: String,
    amount: f64,
    email: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Assessment {
    claim: InsuranceClaim,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ApprovalResult {
    approved: bool,
}

#[derive(Clone)]
struct Bridge {
    functions: Arc<FunctionRegistry>,
}

/// Collect `key: value` pairs from everything the user said so far
fn parse_fields(history: &[TaskTimelineItem]) -> HashMap<String, String> {
    messages(history)
        .filter(|m| m.role == MessageRole::User)
        .flat_map(|m| {
            m.text()
                .split([',', '\n'])
                .filter_map(|pair| {
                    let (key, value) = pair.split_once(':')?;
                    Some((key.trim().to_lowercase(), value.trim().to_string()))
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

async fn discover_claim(
    params: ChatParams<Bridge, ()>,
) -> anyhow::Result<TurnOutcome<InsuranceClaim>> {
    let fields = parse_fields(&params.history);
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !fields.contains_key(*field))
        .collect();

    if missing.is_empty() {
        let claim = InsuranceClaim {
            date: fields["date"].clone(),
            category: fields["category"].clone(),
            reason: fields["reason"].clone(),
            amount: fields["amount"].parse()?,
            email: fields["email"].clone(),
        };
        return Ok(TurnOutcome::Achieved(claim));
    }

    let prompt = if params.turn == 1 {
        format!("Hi! To file your claim I need: {}.", missing.join(", "))
    } else {
        format!("Thanks. Still missing: {}.", missing.join(", "))
    };
    params.messages.send_text(prompt).await?;
    Ok(TurnOutcome::Continue)
}

async fn process_claim(params: WorkflowParams<Bridge, InsuranceClaim>) -> anyhow::Result<bool> {
    let functions = params.bridge.functions.clone();
    let parameters = serde_json::to_string(&Assessment {
        claim: params.input.clone(),
    })?;

    let response: String = params
        .ctx
        .run("approve_claim", move || async move {
            let response = functions
                .invoke("approve-claim", "approve-claim", &parameters)
                .await?;
            Ok(response.result?)
        })
        .await?;
    let approval: ApprovalResult = serde_json::from_str(&response)?;

    let verdict = if approval.approved { "approved" } else { "sent for manual review" };
    params
        .messages
        .send_text(format!(
            "Your {} claim over {:.2} was {verdict}. We will email {}.",
            params.input.category, params.input.amount, params.input.email
        ))
        .await?;
    Ok(approval.approved)
}

fn claims_agent(functions: Arc<FunctionRegistry>) -> Agent {
    create_soma_agent(
        "insurance",
        "claims",
        "Insurance Claims Agent",
        "Collects a claim through chat and routes it for approval",
        move |params: HandlerParams| {
            let bridge = Bridge {
                functions: functions.clone(),
            };
            async move {
                let claim = chat(discover_claim)
                    .run(
                        ChatRunParams::new(
                            params.ctx.clone(),
                            params.soma.clone(),
                            params.task_id,
                            bridge.clone(),
                            (),
                        )
                        .with_first_turn(FirstTurn::Agent),
                    )
                    .await?;

                workflow(process_claim)
                    .run(WorkflowRunParams::new(
                        params.ctx.clone(),
                        params.soma.clone(),
                        params.task_id,
                        bridge,
                        claim,
                    ))
                    .await?;

                let soma = params.soma.clone();
                let task_id = params.task_id;
                params
                    .ctx
                    .run("complete_task", move || async move {
                        soma.update_task_status(
                            task_id,
                            UpdateTaskStatusRequest {
                                status: TaskStatus::Completed,
                                message: None,
                            },
                        )
                        .await?;
                        Ok(())
                    })
                    .await?;
                Ok(())
            }
        },
    )
}

fn approve_claim() -> SomaFunction<Assessment, ApprovalResult> {
    create_soma_function(
        ProviderController::new("approve-claim", "Approve Claim", "Approve a claim"),
        "approve-claim",
        "Approve a claim",
        |input: Assessment| async move {
            Ok(ApprovalResult {
                approved: input.claim.amount <= 5_000.0,
            })
        },
    )
}

/// Answer one line every time the run publishes a listen handle it has not
/// been answered on yet
async fn simulate_user(
    store: Arc<dyn JournalStore>,
    api: Arc<InMemorySomaApi>,
    run_id: String,
    task_id: Uuid,
    lines: Vec<&'static str>,
) -> anyhow::Result<()> {
    let mut answered: Option<String> = None;
    for line in lines {
        let handle = loop {
            let current = store
                .get_state(&run_id, NEW_INPUT_PROMISE)
                .await?
                .and_then(|value| value.as_str().map(str::to_string));
            if current.is_some() && current != answered {
                break current;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        println!("user  > {line}");
        api.push_user_message(task_id, line);
        signal_new_input(store.as_ref(), &run_id, json!({ "text": line })).await?;
        answered = handle;
    }
    Ok(())
}

fn print_transcript(api: &InMemorySomaApi, task_id: Uuid) {
    println!("\n--- transcript ---");
    for message in messages(&api.timeline(task_id)) {
        let who = match message.role {
            MessageRole::User => "user ",
            MessageRole::Agent => "agent",
        };
        println!("{who} > {}", message.text());
    }
    println!("status: {:?}", api.status(task_id));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::from_env());

    let functions = Arc::new(FunctionRegistry::new());
    functions.register(approve_claim());

    let agents = AgentRegistry::new();
    agents.register(claims_agent(functions.clone()));

    let store: Arc<dyn JournalStore> = Arc::new(InMemoryJournalStore::new());
    let api = Arc::new(InMemorySomaApi::new());
    let task_id = Uuid::now_v7();
    let run_id = format!("insurance.claims:{task_id}");

    let user = tokio::spawn(simulate_user(
        store.clone(),
        api.clone(),
        run_id.clone(),
        task_id,
        vec![
            "date: 2026-10-01, category: auto",
            "reason: hail damage on the roof, amount: 1200",
            "email: jo@example.com",
        ],
    ));

    let agent = agents.get_by_service_name("insurance.claims")?;
    let invoke = |ctx: Arc<dyn DurableContext>| HandlerParams {
        task_id,
        context_id: task_id,
        ctx,
        soma: api.clone(),
    };

    let ctx: Arc<dyn DurableContext> =
        Arc::new(DurableRun::start(run_id.clone(), store.clone()).await?);
    agent.invoke(invoke(ctx)).await?;
    user.await??;
    print_transcript(&api, task_id);

    // Redelivery of the same run: everything is replayed from the journal
    let before = api.timeline(task_id).len();
    let ctx: Arc<dyn DurableContext> = Arc::new(DurableRun::start(run_id, store).await?);
    agent.invoke(invoke(ctx)).await?;
    println!(
        "\nreplayed run added {} timeline items",
        api.timeline(task_id).len() - before
    );

    Ok(())
}
