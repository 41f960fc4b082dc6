use std::sync::Arc;

use rust_decimal::Decimal;

use kathir_core::domain::session::{Session, SessionId, UserId};
use kathir_core::errors::ApplicationError;
use kathir_db::{RepositoryError, SessionRepository};

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Lifecycle and budget bookkeeping for sessions. The repository is the only writer.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<dyn SessionRepository>,
    bind_to_user: bool,
}

impl SessionRegistry {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions, bind_to_user: false }
    }

    /// Reject a supplied session id that belongs to a different user.
    pub fn bound_to_user(mut self, enabled: bool) -> Self {
        self.bind_to_user = enabled;
        self
    }

    /// Existing sessions are returned as stored; otherwise a fresh active session is persisted.
    pub async fn resolve(
        &self,
        user_id: &UserId,
        existing: Option<&SessionId>,
    ) -> Result<Session, ApplicationError> {
        let Some(session_id) = existing else {
            let session = Session::open(user_id.clone());
            self.sessions.save(session.clone()).await.map_err(persistence)?;
            tracing::info!(
                event_name = "agent.session.created",
                session_id = %session.id,
                user_id = %user_id,
                "opened new session"
            );
            return Ok(session);
        };

        let session = self.require(session_id).await?;
        if !session.is_active() {
            return Err(ApplicationError::Validation(format!(
                "session `{session_id}` is closed"
            )));
        }
        if self.bind_to_user && &session.user_id != user_id {
            tracing::warn!(
                event_name = "agent.session.owner_mismatch",
                session_id = %session_id,
                user_id = %user_id,
                "rejected session owned by another user"
            );
            return Err(ApplicationError::Validation(format!(
                "session `{session_id}` does not belong to user `{user_id}`"
            )));
        }
        Ok(session)
    }

    pub async fn find(&self, session_id: &SessionId) -> Result<Option<Session>, ApplicationError> {
        self.sessions.find_by_id(session_id).await.map_err(persistence)
    }

    async fn require(&self, session_id: &SessionId) -> Result<Session, ApplicationError> {
        self.find(session_id).await?.ok_or_else(|| {
            ApplicationError::Validation(format!("session `{session_id}` does not exist"))
        })
    }

    /// Sets the budget limit on the stored session. Spend is left alone.
    pub async fn update_budget(
        &self,
        session_id: &SessionId,
        amount: Decimal,
    ) -> Result<Session, ApplicationError> {
        if amount.is_sign_negative() {
            return Err(ApplicationError::Validation(format!(
                "budget must not be negative (got {amount})"
            )));
        }
        let mut session = self.require(session_id).await?;
        session.set_budget(amount)?;
        self.sessions.save(session.clone()).await.map_err(persistence)?;
        tracing::info!(
            event_name = "agent.session.budget_updated",
            session_id = %session_id,
            budget_limit = %amount,
            "session budget updated"
        );
        Ok(session)
    }

    /// Completed-order accounting hook.
    pub async fn record_spend(
        &self,
        session_id: &SessionId,
        amount: Decimal,
    ) -> Result<Session, ApplicationError> {
        if amount.is_sign_negative() {
            return Err(ApplicationError::Validation(format!(
                "spend must not be negative (got {amount})"
            )));
        }
        let mut session = self.require(session_id).await?;
        session.record_spend(amount)?;
        self.sessions.save(session.clone()).await.map_err(persistence)?;
        Ok(session)
    }

    pub async fn close(&self, session_id: &SessionId) -> Result<Session, ApplicationError> {
        let mut session = self.require(session_id).await?;
        session.close()?;
        self.sessions.save(session.clone()).await.map_err(persistence)?;
        tracing::info!(event_name = "agent.session.closed", session_id = %session_id, "session closed");
        Ok(session)
    }

    /// Most recently updated first.
    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Session>, ApplicationError> {
        self.sessions.list_for_user(user_id).await.map_err(persistence)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use kathir_core::domain::session::{SessionId, SessionStatus, UserId};
    use kathir_core::errors::{ApplicationError, DomainError};
    use kathir_db::repositories::InMemorySessionRepository;

    use super::SessionRegistry;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(InMemorySessionRepository::default()))
    }

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    async fn stored_remaining(registry: &SessionRegistry, id: &SessionId) -> Option<Decimal> {
        registry.find(id).await.expect("find").expect("persisted").remaining_budget()
    }

    #[tokio::test]
    async fn new_session_is_active_with_zero_spend_and_no_limit() {
        let registry = registry();

        let session = registry.resolve(&user("user-1"), None).await.expect("resolve");

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_spend, Decimal::ZERO);
        assert_eq!(session.budget_limit, None);
        let stored = registry.find(&session.id).await.expect("find").expect("persisted");
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn existing_session_is_returned_verbatim() {
        let registry = registry();
        let created = registry.resolve(&user("user-1"), None).await.expect("create");

        let resolved = registry.resolve(&user("user-1"), Some(&created.id)).await.expect("resume");

        assert_eq!(resolved, created);
    }

    #[tokio::test]
    async fn unknown_session_id_is_a_validation_error() {
        let error = registry()
            .resolve(&user("user-1"), Some(&SessionId("missing".to_string())))
            .await
            .expect_err("unknown id");

        assert_eq!(error, ApplicationError::Validation("session `missing` does not exist".to_string()));
    }

    #[tokio::test]
    async fn foreign_sessions_are_accepted_unless_binding_is_enabled() {
        let repository = Arc::new(InMemorySessionRepository::default());
        let trusting = SessionRegistry::new(repository.clone());
        let strict = SessionRegistry::new(repository).bound_to_user(true);
        let owned = trusting.resolve(&user("owner"), None).await.expect("create");

        assert!(trusting.resolve(&user("intruder"), Some(&owned.id)).await.is_ok());
        let error = strict
            .resolve(&user("intruder"), Some(&owned.id))
            .await
            .expect_err("binding rejects mismatch");
        assert!(matches!(error, ApplicationError::Validation(message) if message.contains("does not belong")));
        assert!(strict.resolve(&user("owner"), Some(&owned.id)).await.is_ok());
    }

    #[tokio::test]
    async fn remaining_budget_tracks_limit_and_spend_across_updates() {
        let registry = registry();
        let session = registry.resolve(&user("user-1"), None).await.expect("create");
        assert_eq!(stored_remaining(&registry, &session.id).await, None);

        registry.update_budget(&session.id, Decimal::new(200, 0)).await.expect("budget");
        registry.record_spend(&session.id, Decimal::new(50, 0)).await.expect("spend");
        assert_eq!(
            stored_remaining(&registry, &session.id).await,
            Some(Decimal::new(150, 0))
        );

        // Lowering the limit below spend floors at zero and never touches spend.
        let lowered = registry.update_budget(&session.id, Decimal::new(30, 0)).await.expect("budget");
        assert_eq!(lowered.current_spend, Decimal::new(50, 0));
        assert_eq!(lowered.remaining_budget(), Some(Decimal::ZERO));

        let repeated = registry.update_budget(&session.id, Decimal::new(30, 0)).await.expect("budget");
        assert_eq!(repeated.budget_limit, lowered.budget_limit);
        assert_eq!(repeated.current_spend, lowered.current_spend);
    }

    #[tokio::test]
    async fn negative_budget_is_rejected_before_touching_storage() {
        let registry = registry();
        let session = registry.resolve(&user("user-1"), None).await.expect("create");

        let error =
            registry.update_budget(&session.id, Decimal::new(-5, 0)).await.expect_err("negative");

        assert!(matches!(error, ApplicationError::Validation(_)));
        assert_eq!(stored_remaining(&registry, &session.id).await, None);
    }

    #[tokio::test]
    async fn closed_sessions_cannot_be_resumed_or_closed_twice() {
        let registry = registry();
        let session = registry.resolve(&user("user-1"), None).await.expect("create");

        let closed = registry.close(&session.id).await.expect("close");
        assert_eq!(closed.status, SessionStatus::Closed);

        let resumed = registry.resolve(&user("user-1"), Some(&session.id)).await;
        assert!(matches!(resumed, Err(ApplicationError::Validation(message)) if message.contains("closed")));

        let again = registry.close(&session.id).await.expect_err("already closed");
        assert!(matches!(
            again,
            ApplicationError::Domain(DomainError::InvalidSessionTransition { .. })
        ));
    }

    #[tokio::test]
    async fn sessions_are_listed_per_user() {
        let registry = registry();
        registry.resolve(&user("user-1"), None).await.expect("first");
        registry.resolve(&user("user-1"), None).await.expect("second");
        registry.resolve(&user("user-2"), None).await.expect("other");

        let listed = registry.list_for_user(&user("user-1")).await.expect("list");

        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|session| session.user_id == user("user-1")));
    }
}
