use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use kathir_core::domain::session::{Session, SessionId, SessionStatus, UserId};

use super::{decode, format_timestamp, parse_decimal, parse_timestamp};
use super::{RepositoryError, SessionRepository};
use crate::DbPool;

const SESSION_COLUMNS: &str =
    "id, user_id, budget_limit, current_spend, status, created_at, updated_at";

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &SqliteRow) -> Result<Session, RepositoryError> {
    let id: String = decode("id", row.try_get("id"))?;
    let user_id: String = decode("user_id", row.try_get("user_id"))?;
    let budget_limit: Option<String> = decode("budget_limit", row.try_get("budget_limit"))?;
    let current_spend: String = decode("current_spend", row.try_get("current_spend"))?;
    let status: String = decode("status", row.try_get("status"))?;
    let created_at: String = decode("created_at", row.try_get("created_at"))?;
    let updated_at: String = decode("updated_at", row.try_get("updated_at"))?;

    let status = SessionStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown session status `{status}`")))?;

    Ok(Session {
        id: SessionId(id),
        user_id: UserId(user_id),
        budget_limit: budget_limit
            .as_deref()
            .map(|raw| parse_decimal("budget_limit", raw))
            .transpose()?,
        current_spend: parse_decimal("current_spend", &current_spend)?,
        status,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM ai_chat_sessions WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_chat_sessions (id, user_id, budget_limit, current_spend, status,
                                           created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 budget_limit = excluded.budget_limit,
                 current_spend = excluded.current_spend,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&session.id.0)
        .bind(&session.user_id.0)
        .bind(session.budget_limit.map(|limit| limit.to_string()))
        .bind(session.current_spend.to_string())
        .bind(session.status.as_str())
        .bind(format_timestamp(&session.created_at))
        .bind(format_timestamp(&session.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM ai_chat_sessions
             WHERE user_id = ?
             ORDER BY updated_at DESC, rowid DESC"
        ))
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }
}
