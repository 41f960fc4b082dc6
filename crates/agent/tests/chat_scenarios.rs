use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{json, Value};

use kathir_agent::llm::{ChatRole, Completion, LlmError, ScriptedProvider, ToolCall};
use kathir_agent::{AgentRuntime, ChatRequest, ChatResponse};
use kathir_core::config::{AppConfig, LlmProvider};
use kathir_core::domain::session::UserId;
use kathir_core::domain::turn::TurnRole;
use kathir_db::{connect_with_settings, migrations, DbPool, DemoSeedDataset, DEMO_USER_ID};

type TestResult<T = ()> = Result<T, String>;

async fn seeded_pool() -> TestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    DemoSeedDataset::load(&pool).await.map_err(|error| format!("seed: {error}"))?;
    Ok(pool)
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.llm.provider = LlmProvider::Ollama;
    config
}

async fn runtime(script: Vec<Result<Completion, LlmError>>) -> TestResult<(AgentRuntime, Arc<ScriptedProvider>)> {
    let pool = seeded_pool().await?;
    let provider = Arc::new(ScriptedProvider::new(script));
    Ok((AgentRuntime::with_provider(&config(), pool, provider.clone()), provider))
}

fn tool_call(name: &str, arguments: Value) -> Completion {
    Completion::with_tool_calls(vec![ToolCall {
        id: "call_1".to_string(),
        name: name.to_string(),
        arguments,
    }])
}

fn request(message: &str, user_id: &str) -> ChatRequest {
    ChatRequest { message: message.to_string(), user_id: user_id.to_string(), ..ChatRequest::default() }
}

#[tokio::test]
async fn meals_under_fifty_without_a_session() -> TestResult {
    let (runtime, provider) = runtime(vec![
        Ok(tool_call("search_meals", json!({ "max_price": 50 }))),
        Ok(Completion::text("Here are some meals under 50 EGP.")),
    ])
    .await?;

    let reply = runtime
        .handle_message(request("meals under 50 EGP", "shopper-a"), "scenario-a")
        .await
        .map_err(|error| error.to_string())?;

    if reply.session_id.is_empty() {
        return Err("a new session id should be returned".to_string());
    }
    if reply.suggestions.is_empty() {
        return Err("expected suggestions for meals under 50".to_string());
    }
    if let Some(expensive) =
        reply.suggestions.iter().find(|s| s.item.effective_price > Decimal::new(50, 0))
    {
        return Err(format!("{} is above the requested price", expensive.item.id.0));
    }
    if reply.suggestions.iter().any(|s| s.suggested_quantity != 1) {
        return Err("without a budget every quantity should be 1".to_string());
    }
    if reply.budget_remaining.is_some() {
        return Err("no budget was set".to_string());
    }

    let requests = provider.requests().await;
    let phase_one = requests.first().ok_or("phase 1 was not sent")?;
    if phase_one.profile.model != "nvidia/nemotron-3-nano-30b-a3b:free" {
        return Err(format!("unexpected tool model {}", phase_one.profile.model));
    }
    let phase_two = requests.get(1).ok_or("phase 2 was not sent")?;
    if phase_two.profile.model != "openai/gpt-oss-120b:free" {
        return Err(format!("unexpected response model {}", phase_two.profile.model));
    }
    Ok(())
}

#[tokio::test]
async fn remaining_budget_caps_suggested_quantity() -> TestResult {
    let (runtime, _provider) = runtime(vec![
        Ok(tool_call("search_meals", json!({ "query": "koshari" }))),
        Ok(Completion::text("Koshari fits your budget.")),
    ])
    .await?;
    let user = UserId("shopper-b".to_string());
    let session = runtime.sessions().resolve(&user, None).await.map_err(|error| error.to_string())?;
    runtime
        .sessions()
        .update_budget(&session.id, Decimal::new(200, 0))
        .await
        .map_err(|error| error.to_string())?;
    runtime
        .sessions()
        .record_spend(&session.id, Decimal::new(50, 0))
        .await
        .map_err(|error| error.to_string())?;

    let reply = runtime
        .handle_message(
            ChatRequest {
                session_id: Some(session.id.0.clone()),
                ..request("any koshari left?", "shopper-b")
            },
            "scenario-b",
        )
        .await
        .map_err(|error| error.to_string())?;

    if reply.budget_remaining != Some(Decimal::new(150, 0)) {
        return Err(format!("expected 150 remaining, got {:?}", reply.budget_remaining));
    }
    let koshari = reply
        .suggestions
        .iter()
        .find(|s| s.item.id.0 == "meal-koshari")
        .ok_or("koshari should be suggested")?;
    // floor(150 / 35) = 4, capped at 3
    if koshari.suggested_quantity != 3 {
        return Err(format!("expected quantity 3, got {}", koshari.suggested_quantity));
    }
    Ok(())
}

#[tokio::test]
async fn empty_cart_is_narrated_not_failed() -> TestResult {
    let (runtime, provider) = runtime(vec![
        Ok(tool_call("get_cart_contents", json!({}))),
        Ok(Completion::text("Your cart is empty.")),
    ])
    .await?;

    let reply = runtime
        .handle_message(request("what's in my cart?", "shopper-c"), "scenario-c")
        .await
        .map_err(|error| error.to_string())?;

    if reply.message != "Your cart is empty." {
        return Err(format!("unexpected reply {}", reply.message));
    }
    let requests = provider.requests().await;
    let tool_message = requests
        .get(1)
        .and_then(|request| request.messages.iter().find(|message| message.role == ChatRole::Tool))
        .and_then(|message| message.content.clone())
        .ok_or("phase 2 should carry the cart result")?;
    let payload: Value = serde_json::from_str(&tool_message).map_err(|error| error.to_string())?;
    if payload["items"] != json!([]) || payload["count"] != 0 || payload["total"].as_f64() != Some(0.0)
    {
        return Err(format!("unexpected cart payload {payload}"));
    }
    Ok(())
}

#[tokio::test]
async fn demo_cart_total_reaches_the_reply_phase() -> TestResult {
    let (runtime, provider) = runtime(vec![
        Ok(tool_call("get_cart_contents", json!({}))),
        Ok(Completion::text("Two taameya and a mango juice, 61 EGP.")),
    ])
    .await?;

    runtime
        .handle_message(request("show my cart", DEMO_USER_ID), "scenario-c2")
        .await
        .map_err(|error| error.to_string())?;

    let requests = provider.requests().await;
    let tool_message = requests
        .get(1)
        .and_then(|request| request.messages.iter().find(|message| message.role == ChatRole::Tool))
        .and_then(|message| message.content.clone())
        .ok_or("phase 2 should carry the cart result")?;
    let payload: Value = serde_json::from_str(&tool_message).map_err(|error| error.to_string())?;
    if payload["count"] != 2 || payload["total"].as_f64() != Some(61.0) {
        return Err(format!("unexpected cart payload {payload}"));
    }
    Ok(())
}

#[tokio::test]
async fn seeded_profile_reaches_the_system_instructions() -> TestResult {
    let (runtime, provider) = runtime(vec![
        Ok(Completion::text("Welcome back, Mariam!")),
        Ok(Completion::text("Hi there!")),
    ])
    .await?;

    runtime
        .handle_message(request("hello", DEMO_USER_ID), "scenario-p")
        .await
        .map_err(|error| error.to_string())?;
    runtime
        .handle_message(request("hello", "walk-in"), "scenario-p2")
        .await
        .map_err(|error| format!("unknown users should still be served: {error}"))?;

    let requests = provider.requests().await;
    let system = |index: usize| {
        requests
            .get(index)
            .and_then(|request| request.messages.first())
            .and_then(|message| message.content.clone())
            .unwrap_or_default()
    };
    if !system(0).contains("USER: Mariam | Budget remaining: no limit set | Points: 120") {
        return Err(format!("demo profile missing from prompt: {}", system(0)));
    }
    if !system(1).contains("USER: walk-in | Budget remaining: no limit set | Points: 0") {
        return Err(format!("fallback identity missing from prompt: {}", system(1)));
    }
    Ok(())
}

#[tokio::test]
async fn phase_one_failure_surfaces_and_keeps_only_the_user_turn() -> TestResult {
    let (runtime, _provider) = runtime(vec![Err(LlmError::Provider(
        "model overloaded".to_string(),
    ))])
    .await?;
    let session = runtime
        .sessions()
        .resolve(&UserId("shopper-d".to_string()), None)
        .await
        .map_err(|error| error.to_string())?;

    let response = ChatResponse::from(
        runtime
            .respond(
                ChatRequest {
                    session_id: Some(session.id.0.clone()),
                    ..request("find me dinner", "shopper-d")
                },
                "scenario-d",
            )
            .await,
    );

    match &response {
        ChatResponse::Failure { success: false, error } if !error.is_empty() => {}
        other => return Err(format!("expected a failure envelope, got {other:?}")),
    }
    let turns = runtime.history().load(&session.id, 20).await.map_err(|error| error.to_string())?;
    if turns.len() != 1 || turns[0].role != TurnRole::User || turns[0].content != "find me dinner" {
        return Err(format!("only the user turn should be stored, got {turns:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn cart_message_without_tool_calls_still_searches() -> TestResult {
    let (runtime, provider) = runtime(vec![
        Ok(Completion::text("Sure, carts are great.")),
        Ok(Completion::text("Here are meals you can add to your cart.")),
    ])
    .await?;

    let reply = runtime
        .handle_message(request("help me fill my cart", "shopper-e"), "safety-net")
        .await
        .map_err(|error| error.to_string())?;

    if reply.suggestions.len() != 9 {
        return Err(format!("forced search should browse the catalog, got {}", reply.suggestions.len()));
    }
    let requests = provider.requests().await;
    let forced = requests
        .get(1)
        .and_then(|request| request.messages.iter().find(|message| !message.tool_calls.is_empty()))
        .ok_or("phase 2 should carry the forced call")?;
    if forced.tool_calls[0].name != "search_meals" || forced.tool_calls[0].arguments != json!({}) {
        return Err(format!("unexpected forced call {:?}", forced.tool_calls[0]));
    }
    Ok(())
}

#[tokio::test]
async fn conversation_resumes_with_history_and_audit_rows() -> TestResult {
    let (runtime, provider) = runtime(vec![
        Ok(tool_call("search_meals", json!({ "category": "sweet" }))),
        Ok(Completion::text("Basbousa and konafa are available.")),
        Ok(Completion::text("You're welcome!")),
    ])
    .await?;

    let first = runtime
        .handle_message(request("something sweet please", "shopper-f"), "resume-1")
        .await
        .map_err(|error| error.to_string())?;
    let ids = first.suggestions.iter().map(|s| s.item.id.0.as_str()).collect::<Vec<_>>();
    if ids != ["meal-basbousa", "meal-konafa"] {
        return Err(format!("unexpected dessert suggestions {ids:?}"));
    }

    runtime
        .handle_message(
            ChatRequest { session_id: Some(first.session_id.clone()), ..request("thanks", "shopper-f") },
            "resume-2",
        )
        .await
        .map_err(|error| error.to_string())?;

    let requests = provider.requests().await;
    let resumed = requests.get(2).ok_or("second turn phase 1 missing")?;
    let history = resumed
        .messages
        .iter()
        .skip(1)
        .map(|message| (message.role, message.content.clone().unwrap_or_default()))
        .collect::<Vec<_>>();
    let expected = vec![
        (ChatRole::User, "something sweet please".to_string()),
        (ChatRole::Assistant, "Basbousa and konafa are available.".to_string()),
        (ChatRole::User, "thanks".to_string()),
    ];
    if history != expected {
        return Err(format!("unexpected context {history:?}"));
    }

    let stored = runtime
        .history()
        .load(&kathir_core::domain::session::SessionId(first.session_id.clone()), 20)
        .await
        .map_err(|error| error.to_string())?;
    let metadata = stored.get(1).and_then(|turn| turn.metadata.clone()).ok_or("metadata missing")?;
    if metadata.suggestions.len() != 2 || metadata.tools != ["search_meals"] {
        return Err(format!("unexpected metadata {metadata:?}"));
    }
    Ok(())
}
