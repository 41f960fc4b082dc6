use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use kathir_core::domain::session::SessionId;
use kathir_core::domain::turn::{Turn, TurnId, TurnMetadata, TurnRole};
use kathir_core::suggestions::Suggestion;

use super::{decode, format_timestamp, parse_timestamp};
use super::{HistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn turn_from_row(row: &SqliteRow) -> Result<Turn, RepositoryError> {
    let id: String = decode("id", row.try_get("id"))?;
    let session_id: String = decode("session_id", row.try_get("session_id"))?;
    let role: String = decode("role", row.try_get("role"))?;
    let content: String = decode("content", row.try_get("content"))?;
    let metadata_json: Option<String> = decode("metadata_json", row.try_get("metadata_json"))?;
    let created_at: String = decode("created_at", row.try_get("created_at"))?;

    let role = TurnRole::parse(&role)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown turn role `{role}`")))?;
    let metadata = metadata_json
        .as_deref()
        .map(serde_json::from_str::<TurnMetadata>)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("metadata_json: {error}")))?;

    Ok(Turn {
        id: TurnId(id),
        session_id: SessionId(session_id),
        role,
        content,
        metadata,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn append(&self, turn: Turn) -> Result<(), RepositoryError> {
        let metadata_json = turn
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("metadata_json: {error}")))?;

        sqlx::query(
            "INSERT INTO ai_chat_messages (id, session_id, role, content, metadata_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.id.0)
        .bind(&turn.session_id.0)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(metadata_json)
        .bind(format_timestamp(&turn.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, metadata_json, created_at
             FROM ai_chat_messages
             WHERE session_id = ?
             ORDER BY rowid DESC
             LIMIT ?",
        )
        .bind(&session_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        // Append order is authoritative; created_at comes from the writer's clock.
        let mut turns = rows.iter().map(turn_from_row).collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn record_suggestions(
        &self,
        session_id: &SessionId,
        message_id: &TurnId,
        suggestions: &[Suggestion],
    ) -> Result<(), RepositoryError> {
        if suggestions.is_empty() {
            return Ok(());
        }

        let created_at = format_timestamp(&Utc::now());
        let mut tx = self.pool.begin().await?;
        for suggestion in suggestions {
            sqlx::query(
                "INSERT INTO ai_suggestions (id, session_id, message_id, meal_id, quantity, price,
                                             reason, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&session_id.0)
            .bind(&message_id.0)
            .bind(&suggestion.item.id.0)
            .bind(i64::from(suggestion.suggested_quantity))
            .bind(suggestion.item.effective_price.to_string())
            .bind(&suggestion.reason)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
