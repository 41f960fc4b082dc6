use std::io::{self, BufRead, Write};

use anyhow::Context;
use kathir_agent::{AgentRuntime, ChatReply, ChatRequest};
use kathir_core::config::AppConfig;
use kathir_db::{connect_with_config, migrations};
use rust_decimal::Decimal;

use crate::commands::{prepare, CommandResult};

const EXIT_WORDS: [&str; 3] = ["/quit", "/exit", "/q"];

#[derive(Debug, Clone)]
pub struct ChatArgs {
    pub user_id: String,
    pub session_id: Option<String>,
    pub budget: Option<Decimal>,
}

pub fn run(args: ChatArgs) -> CommandResult {
    let (config, runtime) = match prepare("chat") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    init_logging(&config);

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let agent = AgentRuntime::from_config(&config, pool.clone())
            .map_err(|error| ("agent_init", error.to_string(), 2u8))?;

        let stdin = io::stdin();
        let stdout = io::stdout();
        let transcript = converse(
            &agent,
            &config.agent.assistant_name,
            &config.agent.currency,
            args,
            stdin.lock(),
            stdout.lock(),
        )
        .await
        .map_err(|error| ("chat_io", format!("{error:#}"), 1u8));

        pool.close().await;
        transcript
    });

    match result {
        // The transcript already went to stdout; no JSON envelope on a clean exit.
        Ok(_) => CommandResult { exit_code: 0, output: String::new() },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

/// Reads one message per line until EOF or an exit word and returns the session id in use.
/// Turn failures are printed and the loop continues.
pub async fn converse<R: BufRead, W: Write>(
    agent: &AgentRuntime,
    assistant_name: &str,
    currency: &str,
    args: ChatArgs,
    input: R,
    mut output: W,
) -> anyhow::Result<Option<String>> {
    let mut session_id = args.session_id;
    let mut budget = args.budget;

    writeln!(output, "{assistant_name} is ready. Type /quit to leave.").context("write banner")?;
    for line in input.lines() {
        let line = line.context("read message")?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message) {
            break;
        }

        let request = ChatRequest {
            message: message.to_string(),
            session_id: session_id.clone(),
            user_id: args.user_id.clone(),
            budget,
        };
        let correlation_id = correlation_for(session_id.as_deref());
        match agent.handle_message(request, &correlation_id).await {
            Ok(reply) => {
                session_id = Some(reply.session_id.clone());
                budget = None;
                render_reply(&mut output, assistant_name, currency, &reply)
                    .context("write reply")?;
            }
            Err(error) => {
                writeln!(output, "! {error}").context("write error")?;
            }
        }
    }

    if let Some(session_id) = &session_id {
        writeln!(output, "session: {session_id}").context("write session id")?;
    }
    Ok(session_id)
}

fn render_reply<W: Write>(
    output: &mut W,
    assistant_name: &str,
    currency: &str,
    reply: &ChatReply,
) -> io::Result<()> {
    writeln!(output, "{assistant_name}: {}", reply.message)?;
    for suggestion in &reply.suggestions {
        writeln!(
            output,
            "  - {} x{} @ {} {} ({})",
            suggestion.item.title,
            suggestion.suggested_quantity,
            suggestion.item.effective_price,
            currency,
            suggestion.reason
        )?;
    }
    if let Some(remaining) = reply.budget_remaining {
        writeln!(output, "  budget remaining: {remaining} {currency}")?;
    }
    if let Some(action) = &reply.action {
        writeln!(output, "  action: {} {}", action.kind, action.data)?;
    }
    Ok(())
}

fn correlation_for(session_id: Option<&str>) -> String {
    format!("cli-{}", session_id.unwrap_or("new"))
}

fn init_logging(config: &AppConfig) {
    use kathir_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(io::stderr);

    // A subscriber may already be installed when embedded; ignore that case.
    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use kathir_agent::llm::{Completion, ScriptedProvider, ToolCall};
    use kathir_agent::AgentRuntime;
    use kathir_core::config::{AppConfig, LlmProvider};
    use kathir_db::{connect_with_settings, migrations, DemoSeedDataset};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{converse, ChatArgs};

    async fn agent(script: Vec<Completion>) -> AgentRuntime {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool).await.expect("seed");

        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        let provider = ScriptedProvider::new(script.into_iter().map(Ok).collect());
        AgentRuntime::with_provider(&config, pool, Arc::new(provider))
    }

    fn args(budget: Option<Decimal>) -> ChatArgs {
        ChatArgs { user_id: "terminal-user".to_string(), session_id: None, budget }
    }

    #[tokio::test]
    async fn prints_reply_suggestions_and_budget_then_quits() {
        let agent = agent(vec![
            Completion::with_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "search_meals".to_string(),
                arguments: json!({ "query": "koshari" }),
            }]),
            Completion::text("Koshari is available."),
        ])
        .await;
        let mut output = Vec::new();

        let session_id = converse(
            &agent,
            "Kathir AI",
            "EGP",
            args(Some(Decimal::new(100, 0))),
            Cursor::new("koshari please\n/quit\nnever read\n"),
            &mut output,
        )
        .await
        .expect("conversation");

        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.contains("Kathir AI: Koshari is available."), "{transcript}");
        assert!(transcript.contains("budget remaining: 100"), "{transcript}");
        assert!(transcript.lines().any(|line| line.starts_with("  - ") && line.contains(" x")));
        let session_id = session_id.expect("a session should be created");
        assert!(transcript.ends_with(&format!("session: {session_id}\n")));
    }

    #[tokio::test]
    async fn blank_input_and_eof_create_no_session() {
        let agent = agent(Vec::new()).await;
        let mut output = Vec::new();

        let session_id = converse(
            &agent,
            "Kathir AI",
            "EGP",
            args(None),
            Cursor::new("\n   \n"),
            &mut output,
        )
        .await
        .expect("conversation");

        assert_eq!(session_id, None);
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "Kathir AI is ready. Type /quit to leave.\n"
        );
    }

    #[tokio::test]
    async fn turn_failures_are_printed_and_the_loop_continues() {
        let agent = agent(vec![Completion::text("Hello there!")]).await;
        let mut output = Vec::new();

        converse(
            &agent,
            "Kathir AI",
            "EGP",
            ChatArgs {
                user_id: "terminal-user".to_string(),
                session_id: Some("missing-session".to_string()),
                budget: None,
            },
            Cursor::new("hi\n"),
            &mut output,
        )
        .await
        .expect("conversation");

        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.lines().any(|line| line.starts_with("! ")), "{transcript}");
    }
}
