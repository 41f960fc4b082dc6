use std::collections::HashMap;

use tokio::sync::RwLock;

use kathir_core::domain::cart::CartLine;
use kathir_core::domain::catalog::{CatalogItem, CatalogQuery};
use kathir_core::domain::order::OrderSummary;
use kathir_core::domain::profile::UserProfile;
use kathir_core::domain::session::{Session, SessionId, UserId};
use kathir_core::domain::turn::{Turn, TurnId};
use kathir_core::suggestions::Suggestion;

use super::{
    CartRepository, CatalogGateway, HistoryRepository, OrderRepository, ProfileRepository,
    RepositoryError, SessionRepository,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut owned = sessions
            .values()
            .filter(|session| &session.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
        Ok(owned)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSuggestion {
    pub session_id: SessionId,
    pub message_id: TurnId,
    pub suggestion: Suggestion,
}

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    turns: RwLock<HashMap<String, Vec<Turn>>>,
    suggestions: RwLock<Vec<RecordedSuggestion>>,
}

impl InMemoryHistoryRepository {
    pub async fn recorded_suggestions(&self) -> Vec<RecordedSuggestion> {
        self.suggestions.read().await.clone()
    }

    pub async fn all_turns(&self, session_id: &SessionId) -> Vec<Turn> {
        self.turns.read().await.get(&session_id.0).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn append(&self, turn: Turn) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        turns.entry(turn.session_id.0.clone()).or_default().push(turn);
        Ok(())
    }

    async fn load_recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let turns = self.turns.read().await;
        let Some(session_turns) = turns.get(&session_id.0) else {
            return Ok(Vec::new());
        };
        let skip = session_turns.len().saturating_sub(limit as usize);
        Ok(session_turns[skip..].to_vec())
    }

    async fn record_suggestions(
        &self,
        session_id: &SessionId,
        message_id: &TurnId,
        suggestions: &[Suggestion],
    ) -> Result<(), RepositoryError> {
        let mut recorded = self.suggestions.write().await;
        recorded.extend(suggestions.iter().cloned().map(|suggestion| RecordedSuggestion {
            session_id: session_id.clone(),
            message_id: message_id.clone(),
            suggestion,
        }));
        Ok(())
    }
}

/// Catalog over a fixed list of purchasable items. Every query it receives is kept so tests
/// can assert on the parameters a tool actually sent.
#[derive(Default)]
pub struct InMemoryCatalogGateway {
    items: RwLock<Vec<CatalogItem>>,
    queries: RwLock<Vec<CatalogQuery>>,
    failure: Option<String>,
}

impl InMemoryCatalogGateway {
    pub fn with_items(items: Vec<CatalogItem>) -> Self {
        Self { items: RwLock::new(items), ..Self::default() }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { failure: Some(message.into()), ..Self::default() }
    }

    pub async fn recorded_queries(&self) -> Vec<CatalogQuery> {
        self.queries.read().await.clone()
    }
}

fn item_matches(item: &CatalogItem, query: &CatalogQuery) -> bool {
    let terms = query.terms();
    if !terms.is_empty() {
        let haystack = format!(
            "{} {}",
            item.title.to_lowercase(),
            item.category.as_deref().unwrap_or_default().to_lowercase()
        );
        if !terms.iter().any(|term| haystack.contains(term.as_str())) {
            return false;
        }
    }

    if let Some(category) = query.category.as_deref().filter(|value| !value.trim().is_empty()) {
        let same = item
            .category
            .as_deref()
            .map(|value| value.eq_ignore_ascii_case(category.trim()))
            .unwrap_or(false);
        if !same {
            return false;
        }
    }

    if query.max_price.is_some_and(|max| item.effective_price > max) {
        return false;
    }
    if query.min_price.is_some_and(|min| item.effective_price < min) {
        return false;
    }

    query.restaurant_id.as_ref().map_or(true, |restaurant| &item.restaurant_id == restaurant)
}

#[async_trait::async_trait]
impl CatalogGateway for InMemoryCatalogGateway {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, RepositoryError> {
        self.queries.write().await.push(query.clone());
        if let Some(message) = &self.failure {
            return Err(RepositoryError::Decode(message.clone()));
        }

        let items = self.items.read().await;
        let mut matched =
            items.iter().filter(|item| item_matches(item, query)).cloned().collect::<Vec<_>>();
        matched.sort_by(|left, right| {
            left.effective_price.cmp(&right.effective_price).then_with(|| left.title.cmp(&right.title))
        });
        matched.truncate(query.effective_limit() as usize);
        Ok(matched)
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<OrderSummary>>,
}

impl InMemoryOrderRepository {
    pub fn with_orders(orders: Vec<OrderSummary>) -> Self {
        Self { orders: RwLock::new(orders) }
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn recent_orders(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut owned =
            orders.iter().filter(|order| &order.user_id == user_id).cloned().collect::<Vec<_>>();
        owned.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        owned.truncate(limit as usize);
        Ok(owned)
    }
}

#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: RwLock<HashMap<String, Vec<CartLine>>>,
}

impl InMemoryCartRepository {
    pub async fn put_line(&self, user_id: &UserId, line: CartLine) {
        self.carts.write().await.entry(user_id.0.clone()).or_default().push(line);
    }
}

#[async_trait::async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn cart_lines(&self, user_id: &UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let carts = self.carts.read().await;
        Ok(carts.get(&user_id.0).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, UserProfile>>,
    failure: Option<String>,
}

impl InMemoryProfileRepository {
    pub fn with_profiles(profiles: Vec<UserProfile>) -> Self {
        let profiles =
            profiles.into_iter().map(|profile| (profile.user_id.0.clone(), profile)).collect();
        Self { profiles: RwLock::new(profiles), failure: None }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { failure: Some(message.into()), ..Self::default() }
    }
}

#[async_trait::async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        if let Some(message) = &self.failure {
            return Err(RepositoryError::Decode(message.clone()));
        }
        Ok(self.profiles.read().await.get(&user_id.0).cloned())
    }
}
