use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use kathir_core::domain::cart::CartLine;
use kathir_core::domain::catalog::{CatalogItem, CatalogQuery};
use kathir_core::domain::order::OrderSummary;
use kathir_core::domain::profile::UserProfile;
use kathir_core::domain::session::{Session, SessionId, UserId};
use kathir_core::domain::turn::{Turn, TurnId};
use kathir_core::suggestions::Suggestion;

pub mod catalog;
pub mod commerce;
pub mod history;
pub mod memory;
pub mod profile;
pub mod session;

pub use catalog::SqlCatalogGateway;
pub use commerce::{SqlCartRepository, SqlOrderRepository};
pub use history::SqlHistoryRepository;
pub use memory::{
    InMemoryCartRepository, InMemoryCatalogGateway, InMemoryHistoryRepository,
    InMemoryOrderRepository, InMemoryProfileRepository, InMemorySessionRepository,
    RecordedSuggestion,
};
pub use profile::SqlProfileRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    async fn save(&self, session: Session) -> Result<(), RepositoryError>;
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError>;
}

/// Append-only turn log plus the per-turn suggestion audit trail.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, turn: Turn) -> Result<(), RepositoryError>;

    /// Most recent `limit` turns, returned oldest first.
    async fn load_recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Turn>, RepositoryError>;

    async fn record_suggestions(
        &self,
        session_id: &SessionId,
        message_id: &TurnId,
        suggestions: &[Suggestion],
    ) -> Result<(), RepositoryError>;
}

/// Read-only view over purchasable meals. Only active, in-stock, unexpired meals are visible.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Newest first.
    async fn recent_orders(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<OrderSummary>, RepositoryError>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn cart_lines(&self, user_id: &UserId) -> Result<Vec<CartLine>, RepositoryError>;
}

/// Optional shopper profile. Users without a row are still served.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError>;
}

/// Fixed-width nanosecond timestamps: lexical order equals chronological order, so
/// turns appended within the same second still sort correctly.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw.trim())
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}

pub(crate) fn decode<T>(column: &str, result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}
