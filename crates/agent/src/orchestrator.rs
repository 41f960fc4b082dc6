//! Two-phase turn protocol.
//!
//! Phase 1 asks a function-calling model which tools to run; the tools run sequentially in
//! emission order; phase 2 asks a prose model to narrate the tool results. A turn with no tool
//! calls skips phase 2 unless the shopping keyword net forces a search.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use kathir_core::config::{AgentConfig, LlmConfig};
use kathir_core::domain::profile::UserProfile;
use kathir_core::domain::session::Session;
use kathir_core::domain::turn::{Turn, TurnMetadata, TurnRole};
use kathir_core::errors::ApplicationError;
use kathir_core::suggestions::Suggestion;
use kathir_db::ProfileRepository;

use crate::conversation::{
    build_messages, parse_reply, requires_search, PromptContext, ReplyPayload,
    FALLBACK_GREETING_REPLY, FALLBACK_RESULTS_REPLY,
};
use crate::history::HistoryStore;
use crate::llm::{
    ChatMessage, Completion, CompletionProvider, CompletionRequest, LlmError, PhaseProfile,
    ToolCall,
};
use crate::tools::{tool_schema, ToolContext, ToolRegistry, SEARCH_MEALS};

pub const SAFETY_NET_CALL_ID: &str = "call_safety_net";

/// Prompt and model settings shared by every turn.
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorSettings {
    pub assistant_name: String,
    pub currency: String,
    pub history_limit: u32,
    pub tool_profile: PhaseProfile,
    pub response_profile: PhaseProfile,
}

impl OrchestratorSettings {
    pub fn from_config(agent: &AgentConfig, llm: &LlmConfig) -> Self {
        Self {
            assistant_name: agent.assistant_name.clone(),
            currency: agent.currency.clone(),
            history_limit: agent.history_limit,
            tool_profile: PhaseProfile::tool_selection(llm),
            response_profile: PhaseProfile::response(llm),
        }
    }
}

/// Result of one completed turn. Both turns are already persisted.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub reply: ReplyPayload,
    pub suggestions: Vec<Suggestion>,
    pub tools_invoked: Vec<String>,
    pub forced_search: bool,
    pub assistant_turn: Turn,
}

pub struct TwoPhaseOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    tools: Arc<ToolRegistry>,
    history: HistoryStore,
    settings: OrchestratorSettings,
    profiles: Option<Arc<dyn ProfileRepository>>,
}

impl TwoPhaseOrchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        tools: Arc<ToolRegistry>,
        history: HistoryStore,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { provider, tools, history, settings, profiles: None }
    }

    /// Adds the shopper's name and loyalty points to the system instructions when known.
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileRepository>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    pub async fn run_turn(
        &self,
        session: &Session,
        user_message: &str,
        correlation_id: &str,
    ) -> Result<TurnOutcome, ApplicationError> {
        let history = self.history.load(&session.id, self.settings.history_limit).await?;
        let profile = self.load_profile(session, correlation_id).await;
        let system_prompt = PromptContext {
            assistant_name: &self.settings.assistant_name,
            currency: &self.settings.currency,
            session,
            profile: profile.as_ref(),
        }
        .system_prompt();
        let messages = build_messages(system_prompt, &history, user_message);

        self.history.append(&session.id, TurnRole::User, user_message, None).await?;

        let selection = self
            .complete(
                "tool_selection",
                correlation_id,
                CompletionRequest {
                    profile: self.settings.tool_profile.clone(),
                    messages: messages.clone(),
                    tools: Some(tool_schema()),
                },
            )
            .await?;

        let mut forced_search = false;
        let calls = if !selection.tool_calls.is_empty() {
            selection.tool_calls.clone()
        } else if requires_search(user_message) {
            tracing::info!(
                event_name = "agent.turn.safety_net",
                correlation_id,
                session_id = %session.id,
                "model skipped tools on a shopping message; forcing search"
            );
            forced_search = true;
            vec![ToolCall {
                id: SAFETY_NET_CALL_ID.to_string(),
                name: SEARCH_MEALS.to_string(),
                arguments: json!({}),
            }]
        } else {
            let text = selection.trimmed_content().unwrap_or(FALLBACK_GREETING_REPLY);
            return self.finish(session, parse_reply(text), Vec::new(), Vec::new(), false).await;
        };

        let context = ToolContext { user_id: session.user_id.clone(), session: session.clone() };
        let mut suggestions = Vec::new();
        let mut tools_invoked = Vec::with_capacity(calls.len());
        let mut tool_messages = Vec::with_capacity(calls.len());
        for call in &calls {
            let output = self.tools.dispatch(call, &context).await;
            if let Some(found) = output.suggestions {
                suggestions = found;
            }
            tools_invoked.push(call.name.clone());
            tool_messages.push(ChatMessage::tool_result(call.id.clone(), output.payload.to_string()));
        }

        let mut synthesis_messages = messages;
        synthesis_messages.push(ChatMessage::assistant_tool_calls(selection.content, calls));
        synthesis_messages.extend(tool_messages);

        let synthesis = self
            .complete(
                "response",
                correlation_id,
                CompletionRequest {
                    profile: self.settings.response_profile.clone(),
                    messages: synthesis_messages,
                    tools: None,
                },
            )
            .await?;

        let text = synthesis.trimmed_content().unwrap_or(FALLBACK_RESULTS_REPLY);
        self.finish(session, parse_reply(text), suggestions, tools_invoked, forced_search).await
    }

    /// A missing or failing profile lookup only leaves the name and points out of the prompt.
    async fn load_profile(&self, session: &Session, correlation_id: &str) -> Option<UserProfile> {
        let profiles = self.profiles.as_ref()?;
        match profiles.find_profile(&session.user_id).await {
            Ok(profile) => profile,
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.profile.lookup_failed",
                    correlation_id,
                    user_id = %session.user_id,
                    error = %error,
                    "continuing without user profile"
                );
                None
            }
        }
    }

    async fn complete(
        &self,
        phase: &'static str,
        correlation_id: &str,
        request: CompletionRequest,
    ) -> Result<Completion, ApplicationError> {
        let model = request.profile.model.clone();
        let started = Instant::now();
        tracing::debug!(
            event_name = "agent.phase.request",
            phase,
            correlation_id,
            model = %model,
            message_count = request.messages.len(),
            "sending completion request"
        );

        match self.provider.complete(request).await {
            Ok(completion) => {
                tracing::info!(
                    event_name = "agent.phase.completed",
                    phase,
                    correlation_id,
                    model = %model,
                    tool_calls = completion.tool_calls.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "completion received"
                );
                Ok(completion)
            }
            Err(error) => {
                tracing::error!(
                    event_name = "agent.phase.failed",
                    phase,
                    correlation_id,
                    model = %model,
                    error = %error,
                    "completion failed; aborting turn"
                );
                Err(provider_error(phase, error))
            }
        }
    }

    async fn finish(
        &self,
        session: &Session,
        reply: ReplyPayload,
        suggestions: Vec<Suggestion>,
        tools_invoked: Vec<String>,
        forced_search: bool,
    ) -> Result<TurnOutcome, ApplicationError> {
        let metadata = TurnMetadata {
            suggestions: suggestions.iter().map(|suggestion| suggestion.item.id.clone()).collect(),
            tools: tools_invoked.clone(),
            action: reply.action().map(str::to_string),
        };
        let assistant_turn = self
            .history
            .append(&session.id, TurnRole::Assistant, reply.message(), Some(metadata))
            .await?;
        self.history.record_suggestions(&assistant_turn, &suggestions).await?;

        Ok(TurnOutcome { reply, suggestions, tools_invoked, forced_search, assistant_turn })
    }
}

fn provider_error(phase: &str, error: LlmError) -> ApplicationError {
    ApplicationError::Provider(format!("{phase} phase: {error}"))
}
