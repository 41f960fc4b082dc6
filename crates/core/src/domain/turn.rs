use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::MealId;
use crate::domain::session::SessionId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Audit data attached to a turn; stored as JSON next to the text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<MealId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl TurnMetadata {
    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty() && self.tools.is_empty() && self.action.is_none()
    }
}

/// One message in a session. Never mutated after it is appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub session_id: SessionId,
    pub role: TurnRole,
    pub content: String,
    pub metadata: Option<TurnMetadata>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        session_id: SessionId,
        role: TurnRole,
        content: impl Into<String>,
        metadata: Option<TurnMetadata>,
    ) -> Self {
        Self {
            id: TurnId(Uuid::new_v4().to_string()),
            session_id,
            role,
            content: content.into(),
            metadata: metadata.filter(|metadata| !metadata.is_empty()),
            created_at: Utc::now(),
        }
    }
}
