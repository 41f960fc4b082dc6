use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use kathir_core::domain::profile::UserProfile;
use kathir_core::domain::session::Session;
use kathir_core::domain::turn::{Turn, TurnRole};

use crate::llm::ChatMessage;

/// Words that mark a message as shopping intent even when the model declines to call a tool.
pub const SHOPPING_KEYWORDS: [&str; 6] = ["meal", "food", "dessert", "cart", "budget", "find"];

pub const FALLBACK_RESULTS_REPLY: &str = "Found some meals for you!";
pub const FALLBACK_GREETING_REPLY: &str = "How can I help you find meals today?";

/// Per-turn facts rendered into the system instructions.
#[derive(Clone, Debug)]
pub struct PromptContext<'a> {
    pub assistant_name: &'a str,
    pub currency: &'a str,
    pub session: &'a Session,
    pub profile: Option<&'a UserProfile>,
}

impl PromptContext<'_> {
    pub fn system_prompt(&self) -> String {
        let budget_line = match self.session.remaining_budget() {
            Some(remaining) => format!("{} {}", format_amount(remaining), self.currency),
            None => "no limit set".to_string(),
        };
        let currency = self.currency;
        let user = self
            .profile
            .map_or(self.session.user_id.0.as_str(), |profile| profile.display_name.as_str());
        let points = self.profile.map_or(0, |profile| profile.loyalty_points);

        format!(
            "You are {name}, a food rescue assistant. Help users find discounted meals.\n\
             \n\
             USER: {user} | Budget remaining: {budget_line} | Points: {points}\n\
             \n\
             WHEN TO USE FUNCTIONS:\n\
             - User wants meals/food/desserts/categories -> CALL search_meals\n\
             - User asks \"build cart\", \"find meals\", \"show me\" -> CALL search_meals\n\
             - User mentions budget/price -> CALL search_meals with max_price\n\
             - User asks about orders/history -> CALL get_user_orders\n\
             - User asks about cart -> CALL get_cart_contents\n\
             \n\
             EXAMPLES:\n\
             \"build my cart with desserts\" -> search_meals(category: \"Desserts\")\n\
             \"meals under 50 {currency}\" -> search_meals(max_price: 50)\n\
             \"show me pizza\" -> search_meals(query: \"pizza\")\n\
             \"my orders\" -> get_user_orders()\n\
             \n\
             Prices are in {currency}. Be brief. Always call functions when user wants meal info.",
            name = self.assistant_name,
        )
    }
}

fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Context window for one turn: system instructions, stored history oldest-first, then the new
/// user message.
pub fn build_messages(system_prompt: String, history: &[Turn], user_message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().map(|turn| match turn.role {
        TurnRole::User => ChatMessage::user(turn.content.clone()),
        TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
    }));
    messages.push(ChatMessage::user(user_message));
    messages
}

/// Keyword net for turns where the model answered in prose instead of calling a tool.
pub fn requires_search(user_message: &str) -> bool {
    let lower = user_message.to_lowercase();
    SHOPPING_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Phase-2 text is either prose or a JSON action envelope `{"action", "message", "data"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyPayload {
    Plain { text: String },
    StructuredAction { kind: String, message: String, data: Value },
}

impl ReplyPayload {
    pub fn message(&self) -> &str {
        match self {
            Self::Plain { text } => text,
            Self::StructuredAction { message, .. } => message,
        }
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Plain { .. } => None,
            Self::StructuredAction { kind, .. } => Some(kind),
        }
    }
}

/// Single parse attempt: the first balanced `{...}` span in the reply is tried as an action
/// envelope; anything else is plain text.
pub fn parse_reply(raw: &str) -> ReplyPayload {
    let text = raw.trim();
    let envelope = first_json_object(text)
        .and_then(|span| serde_json::from_str::<Map<String, Value>>(span).ok())
        .and_then(action_from_envelope);

    envelope.unwrap_or_else(|| ReplyPayload::Plain { text: text.to_string() })
}

fn action_from_envelope(mut envelope: Map<String, Value>) -> Option<ReplyPayload> {
    let kind = match envelope.remove("action") {
        Some(Value::String(kind)) if !kind.trim().is_empty() => kind.trim().to_string(),
        _ => return None,
    };
    let message = match envelope.remove("message") {
        Some(Value::String(message)) if !message.trim().is_empty() => message,
        _ => FALLBACK_RESULTS_REPLY.to_string(),
    };
    let data = envelope.remove("data").unwrap_or(Value::Null);
    Some(ReplyPayload::StructuredAction { kind, message, data })
}

fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
