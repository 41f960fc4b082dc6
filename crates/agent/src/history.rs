use std::sync::Arc;

use kathir_core::domain::session::SessionId;
use kathir_core::domain::turn::{Turn, TurnMetadata, TurnRole};
use kathir_core::errors::ApplicationError;
use kathir_core::suggestions::Suggestion;
use kathir_db::HistoryRepository;

use crate::session::persistence;

/// Append-only conversation log. Write failures are surfaced to the caller.
#[derive(Clone)]
pub struct HistoryStore {
    turns: Arc<dyn HistoryRepository>,
}

impl HistoryStore {
    pub fn new(turns: Arc<dyn HistoryRepository>) -> Self {
        Self { turns }
    }

    pub async fn append(
        &self,
        session_id: &SessionId,
        role: TurnRole,
        content: impl Into<String>,
        metadata: Option<TurnMetadata>,
    ) -> Result<Turn, ApplicationError> {
        let turn = Turn::new(session_id.clone(), role, content, metadata);
        self.turns.append(turn.clone()).await.map_err(|error| {
            tracing::error!(
                event_name = "agent.history.append_failed",
                session_id = %session_id,
                role = role.as_str(),
                error = %error,
                "could not persist turn"
            );
            persistence(error)
        })?;
        Ok(turn)
    }

    /// Most recent `limit` turns, oldest first.
    pub async fn load(&self, session_id: &SessionId, limit: u32) -> Result<Vec<Turn>, ApplicationError> {
        self.turns.load_recent(session_id, limit).await.map_err(persistence)
    }

    pub async fn record_suggestions(
        &self,
        turn: &Turn,
        suggestions: &[Suggestion],
    ) -> Result<(), ApplicationError> {
        if suggestions.is_empty() {
            return Ok(());
        }
        self.turns
            .record_suggestions(&turn.session_id, &turn.id, suggestions)
            .await
            .map_err(persistence)
    }
}
