use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kathir_core::config::AppConfig;
use kathir_core::domain::session::{SessionId, UserId};
use kathir_core::errors::{ApplicationError, InterfaceError};
use kathir_core::suggestions::Suggestion;
use kathir_db::repositories::{
    SqlCartRepository, SqlCatalogGateway, SqlHistoryRepository, SqlOrderRepository,
    SqlProfileRepository, SqlSessionRepository,
};
use kathir_db::DbPool;

use crate::conversation::ReplyPayload;
use crate::history::HistoryStore;
use crate::llm::{CompletionProvider, OpenAiCompatibleClient};
use crate::orchestrator::{OrchestratorSettings, TwoPhaseOrchestrator};
use crate::session::SessionRegistry;
use crate::tools::{ToolLimits, ToolRegistry};

/// Inbound facade request. `user_id` and `message` are required; absent values are rejected as
/// validation failures rather than deserialization failures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub budget: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyAction {
    pub kind: String,
    pub data: Value,
}

/// Successful turn as returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub message: String,
    pub suggestions: Vec<Suggestion>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub budget_remaining: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ReplyAction>,
}

/// Wire envelope: `{success: true, ...reply}` or `{success: false, error}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Success {
        success: bool,
        #[serde(flatten)]
        reply: ChatReply,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl ChatResponse {
    pub fn success(reply: ChatReply) -> Self {
        Self::Success { success: true, reply }
    }

    /// Validation failures keep their message; everything else is reported generically.
    pub fn failure(error: &InterfaceError) -> Self {
        let error = match error {
            InterfaceError::BadRequest { message, .. } => message.clone(),
            other => other.user_message().to_string(),
        };
        Self::Failure { success: false, error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Single entry point for a user message: resolve the session, run the two-phase turn, and
/// report the reply with the session's remaining budget.
pub struct AgentRuntime {
    sessions: SessionRegistry,
    history: HistoryStore,
    orchestrator: TwoPhaseOrchestrator,
}

impl AgentRuntime {
    pub fn new(
        sessions: SessionRegistry,
        history: HistoryStore,
        orchestrator: TwoPhaseOrchestrator,
    ) -> Self {
        Self { sessions, history, orchestrator }
    }

    /// SQLite-backed runtime talking to the configured completion endpoint.
    pub fn from_config(config: &AppConfig, pool: DbPool) -> Result<Self, ApplicationError> {
        let client = OpenAiCompatibleClient::from_config(&config.llm)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        Ok(Self::with_provider(config, pool, Arc::new(client)))
    }

    pub fn with_provider(
        config: &AppConfig,
        pool: DbPool,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let sessions = SessionRegistry::new(Arc::new(SqlSessionRepository::new(pool.clone())))
            .bound_to_user(config.agent.bind_sessions_to_user);
        let history = HistoryStore::new(Arc::new(SqlHistoryRepository::new(pool.clone())));
        let tools = ToolRegistry::shopping(
            Arc::new(SqlCatalogGateway::new(pool.clone())),
            Arc::new(SqlOrderRepository::new(pool.clone())),
            Arc::new(SqlCartRepository::new(pool.clone())),
            ToolLimits {
                search_limit: config.agent.search_limit,
                order_limit: config.agent.order_limit,
            },
        );
        let orchestrator = TwoPhaseOrchestrator::new(
            provider,
            Arc::new(tools),
            history.clone(),
            OrchestratorSettings::from_config(&config.agent, &config.llm),
        )
        .with_profiles(Arc::new(SqlProfileRepository::new(pool)));
        Self::new(sessions, history, orchestrator)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn orchestrator(&self) -> &TwoPhaseOrchestrator {
        &self.orchestrator
    }

    pub async fn handle_message(
        &self,
        request: ChatRequest,
        correlation_id: &str,
    ) -> Result<ChatReply, ApplicationError> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(ApplicationError::Validation("user_id is required".to_string()));
        }
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ApplicationError::Validation("message is required".to_string()));
        }
        if request.budget.is_some_and(|budget| budget.is_sign_negative()) {
            return Err(ApplicationError::Validation("budget must not be negative".to_string()));
        }

        let user_id = UserId(user_id.to_string());
        let existing = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| SessionId(id.to_string()));

        let mut session = self.sessions.resolve(&user_id, existing.as_ref()).await?;
        if let Some(budget) = request.budget {
            session = self.sessions.update_budget(&session.id, budget).await?;
        }
        tracing::info!(
            event_name = "agent.turn.started",
            correlation_id,
            session_id = %session.id,
            user_id = %user_id,
            "processing user message"
        );

        let outcome = self.orchestrator.run_turn(&session, message, correlation_id).await?;
        let budget_remaining = session.remaining_budget();

        tracing::info!(
            event_name = "agent.turn.completed",
            correlation_id,
            session_id = %session.id,
            suggestion_count = outcome.suggestions.len(),
            tools = ?outcome.tools_invoked,
            forced_search = outcome.forced_search,
            "turn completed"
        );

        let action = match &outcome.reply {
            ReplyPayload::Plain { .. } => None,
            ReplyPayload::StructuredAction { kind, data, .. } => {
                Some(ReplyAction { kind: kind.clone(), data: data.clone() })
            }
        };
        Ok(ChatReply {
            session_id: session.id.0,
            message: outcome.reply.message().to_string(),
            suggestions: outcome.suggestions,
            budget_remaining,
            action,
        })
    }

    /// Facade entry point: failures are logged once and mapped to their interface class, so
    /// callers only choose how to present them.
    pub async fn respond(
        &self,
        request: ChatRequest,
        correlation_id: &str,
    ) -> Result<ChatReply, InterfaceError> {
        self.handle_message(request, correlation_id).await.map_err(|error| {
            tracing::warn!(
                event_name = "agent.turn.failed",
                correlation_id,
                error = %error,
                "turn failed"
            );
            error.into_interface(correlation_id)
        })
    }
}

impl From<Result<ChatReply, InterfaceError>> for ChatResponse {
    fn from(outcome: Result<ChatReply, InterfaceError>) -> Self {
        match outcome {
            Ok(reply) => Self::success(reply),
            Err(error) => Self::failure(&error),
        }
    }
}
