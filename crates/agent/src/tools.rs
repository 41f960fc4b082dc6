use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use thiserror::Error;

use kathir_core::domain::cart::CartSummary;
use kathir_core::domain::catalog::{normalize_category, CatalogQuery, MealCategory};
use kathir_core::domain::session::{Session, UserId};
use kathir_core::suggestions::{Suggestion, SuggestionEngine};
use kathir_db::{CartRepository, CatalogGateway, OrderRepository, RepositoryError};

use crate::llm::ToolCall;

pub const SEARCH_MEALS: &str = "search_meals";
pub const GET_USER_ORDERS: &str = "get_user_orders";
pub const GET_CART_CONTENTS: &str = "get_cart_contents";

pub const MAX_ORDER_LIMIT: u32 = 20;

/// Function-calling schema sent with every phase-1 request.
pub fn tool_schema() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": SEARCH_MEALS,
                "description": "REQUIRED when user wants to find/search/build meals, food, desserts, or mentions categories/budget/price. Returns available meals matching criteria.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Meal name/keyword (pizza, chicken, etc)" },
                        "category": { "type": "string", "description": "Category: Meals, Desserts, Beverages, Appetizers, Bakery" },
                        "max_price": { "type": "number", "description": "Max price in EGP" },
                        "min_price": { "type": "number", "description": "Min price in EGP" },
                        "limit": { "type": "number", "description": "Results limit (default: 10)" }
                    }
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": GET_USER_ORDERS,
                "description": "Get order history when user asks about orders/history",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "limit": { "type": "number", "description": "Number of orders (default: 5)" }
                    }
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": GET_CART_CONTENTS,
                "description": "Get cart when user asks about cart contents",
                "parameters": { "type": "object", "properties": {} }
            }
        }
    ])
}

/// Per-turn inputs every tool may read.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub user_id: UserId,
    pub session: Session,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub payload: Value,
    pub suggestions: Option<Vec<Suggestion>>,
}

impl ToolOutput {
    fn payload(payload: Value) -> Self {
        Self { payload, suggestions: None }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    Unknown(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Store(#[from] RepositoryError),
    #[error("could not encode tool result: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry holding the three shopping tools.
    pub fn shopping(
        catalog: Arc<dyn CatalogGateway>,
        orders: Arc<dyn OrderRepository>,
        cart: Arc<dyn CartRepository>,
        limits: ToolLimits,
    ) -> Self {
        let mut registry = Self::default();
        registry.register(SearchMealsTool {
            catalog,
            engine: SuggestionEngine::new(),
            default_limit: limits.search_limit,
        });
        registry.register(UserOrdersTool { orders, default_limit: limits.order_limit });
        registry.register(CartContentsTool { cart });
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.tools.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Runs one model-emitted call. Failures never escape: they become an `{"error": ...}`
    /// payload so the reply phase can narrate them.
    pub async fn dispatch(&self, call: &ToolCall, context: &ToolContext) -> ToolOutput {
        let started = std::time::Instant::now();
        let result = match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call.arguments.clone(), context).await,
            None => Err(ToolError::Unknown(call.name.clone())),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::info!(
                    event_name = "agent.tool.executed",
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    session_id = %context.session.id,
                    elapsed_ms,
                    "tool call completed"
                );
                output
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.tool.failed",
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    session_id = %context.session.id,
                    elapsed_ms,
                    error = %error,
                    "tool call failed; folding error into reply context"
                );
                ToolOutput::payload(json!({ "error": error.to_string() }))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolLimits {
    pub search_limit: u32,
    pub order_limit: u32,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self { search_limit: 10, order_limit: 5 }
    }
}

fn argument_object(input: Value) -> Result<Map<String, Value>, ToolError> {
    match input {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(raw) => {
            Err(ToolError::InvalidArguments(format!("arguments are not a JSON object: `{raw}`")))
        }
        other => Err(ToolError::InvalidArguments(format!("arguments are not a JSON object: {other}"))),
    }
}

fn string_arg(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => {
            Ok(Some(value.trim().to_string()).filter(|value| !value.is_empty()))
        }
        Some(other) => Err(ToolError::InvalidArguments(format!("`{key}` must be a string, got {other}"))),
    }
}

/// Accepts JSON numbers and numeric strings ("50", "49.5").
fn decimal_arg(args: &Map<String, Value>, key: &str) -> Result<Option<Decimal>, ToolError> {
    let invalid = || ToolError::InvalidArguments(format!("`{key}` must be a number"));
    let value = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => {
            number.as_f64().and_then(Decimal::from_f64).ok_or_else(invalid)?
        }
        Some(Value::String(raw)) if raw.trim().is_empty() => return Ok(None),
        Some(Value::String(raw)) => raw.trim().parse::<Decimal>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    if value.is_sign_negative() {
        return Err(ToolError::InvalidArguments(format!("`{key}` must not be negative")));
    }
    Ok(Some(value.normalize()))
}

fn count_arg(args: &Map<String, Value>, key: &str) -> Result<Option<u32>, ToolError> {
    let Some(value) = decimal_arg(args, key)? else {
        return Ok(None);
    };
    Ok(Some(value.trunc().to_u32().unwrap_or(u32::MAX)))
}

fn decimal_json(value: Option<Decimal>) -> Value {
    value.and_then(|amount| amount.to_f64()).map(|amount| json!(amount)).unwrap_or(Value::Null)
}

struct SearchMealsTool {
    catalog: Arc<dyn CatalogGateway>,
    engine: SuggestionEngine,
    default_limit: u32,
}

impl SearchMealsTool {
    /// Canonical category for the call: an explicit argument wins, otherwise the query is
    /// scanned for a category keyword. A query that is nothing but a category name is consumed.
    fn resolve_category(
        query: Option<String>,
        category: Option<String>,
    ) -> (Option<String>, Option<String>) {
        if let Some(category) = category.as_deref().and_then(normalize_category) {
            return (query, Some(category));
        }
        let Some(text) = query else {
            return (None, None);
        };
        if let Some(exact) = MealCategory::from_synonym(&text) {
            return (None, Some(exact.as_str().to_string()));
        }
        let detected = MealCategory::detect_in(&text).map(|found| found.as_str().to_string());
        (Some(text), detected)
    }

    /// Explicit `max_price`, else the remaining budget; an exhausted budget falls back to the limit.
    fn budget_cap(session: &Session) -> Option<Decimal> {
        let limit = session.budget_limit?;
        match session.remaining_budget() {
            Some(remaining) if remaining > Decimal::ZERO => Some(remaining),
            _ => Some(limit),
        }
    }
}

#[async_trait]
impl Tool for SearchMealsTool {
    fn name(&self) -> &'static str {
        SEARCH_MEALS
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args = argument_object(input)?;
        let (query, category) =
            Self::resolve_category(string_arg(&args, "query")?, string_arg(&args, "category")?);
        let max_price = match decimal_arg(&args, "max_price")? {
            Some(explicit) => Some(explicit),
            None => Self::budget_cap(&context.session),
        };
        let min_price = decimal_arg(&args, "min_price")?;
        let limit = count_arg(&args, "limit")?.unwrap_or(self.default_limit);

        let catalog_query =
            CatalogQuery { query, category, max_price, min_price, restaurant_id: None, limit };
        let items = self.catalog.search(&catalog_query).await?;
        let suggestions = self.engine.annotate(items, Some(&context.session));

        let payload = json!({
            "items": serde_json::to_value(&suggestions)?,
            "count": suggestions.len(),
            "applied_parameters": {
                "query": catalog_query.query,
                "category": catalog_query.category,
                "max_price": decimal_json(catalog_query.max_price),
                "min_price": decimal_json(catalog_query.min_price),
                "limit": catalog_query.effective_limit(),
            },
        });

        Ok(ToolOutput { payload, suggestions: Some(suggestions) })
    }
}

struct UserOrdersTool {
    orders: Arc<dyn OrderRepository>,
    default_limit: u32,
}

#[async_trait]
impl Tool for UserOrdersTool {
    fn name(&self) -> &'static str {
        GET_USER_ORDERS
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args = argument_object(input)?;
        let limit = count_arg(&args, "limit")?.unwrap_or(self.default_limit).clamp(1, MAX_ORDER_LIMIT);

        let orders = self.orders.recent_orders(&context.user_id, limit).await?;
        Ok(ToolOutput::payload(json!({
            "count": orders.len(),
            "orders": serde_json::to_value(&orders)?,
        })))
    }
}

struct CartContentsTool {
    cart: Arc<dyn CartRepository>,
}

#[async_trait]
impl Tool for CartContentsTool {
    fn name(&self) -> &'static str {
        GET_CART_CONTENTS
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        argument_object(input)?;
        let lines = self.cart.cart_lines(&context.user_id).await?;
        Ok(ToolOutput::payload(serde_json::to_value(CartSummary::from_lines(lines))?))
    }
}
