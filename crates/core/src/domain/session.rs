use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A budget-scoped conversation context owned by one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub budget_limit: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_spend: Decimal,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Fresh active session: zero spend, no budget limit.
    pub fn open(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            user_id,
            budget_limit: None,
            current_spend: Decimal::ZERO,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// `max(0, limit - spend)` when a limit is set; `None` means unconstrained.
    pub fn remaining_budget(&self) -> Option<Decimal> {
        self.budget_limit.map(|limit| (limit - self.current_spend).max(Decimal::ZERO))
    }

    /// Sets the budget limit. Spend is never touched, so repeating the call is a no-op.
    pub fn set_budget(&mut self, amount: Decimal) -> Result<(), DomainError> {
        if amount.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "budget limit must not be negative (got {amount})"
            )));
        }
        self.budget_limit = Some(amount);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_spend(&mut self, amount: Decimal) -> Result<(), DomainError> {
        if amount.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "spend amount must not be negative (got {amount})"
            )));
        }
        self.current_spend += amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::InvalidSessionTransition {
                from: self.status,
                to: SessionStatus::Closed,
            });
        }
        self.status = SessionStatus::Closed;
        self.updated_at = Utc::now();
        Ok(())
    }
}
