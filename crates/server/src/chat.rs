//! JSON API for the assistant: the chat facade plus session administration.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kathir_agent::{AgentRuntime, ChatRequest, ChatResponse};
use kathir_core::domain::session::{Session, SessionId, UserId};
use kathir_core::domain::turn::Turn;
use kathir_core::errors::{ApplicationError, InterfaceError};

const MAX_HISTORY_PAGE: u32 = 200;

#[derive(Clone)]
pub struct ChatState {
    pub runtime: Arc<AgentRuntime>,
    pub info: Arc<AgentInfo>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentInfo {
    pub assistant_name: String,
    pub provider: String,
    pub tool_model: String,
    pub response_model: String,
    pub currency: String,
    pub tools: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Default, Deserialize)]
pub struct SessionListQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub remaining_budget: Option<Decimal>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        let remaining_budget = session.remaining_budget();
        Self { session, remaining_budget }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionListResponse {
    pub user_id: String,
    pub sessions: Vec<SessionView>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/{session_id}/budget", post(update_budget))
        .route("/api/v1/sessions/{session_id}/close", post(close_session))
        .route("/api/v1/sessions/{session_id}/history", get(session_history))
        .route("/api/v1/agent/info", get(agent_info))
        .with_state(state)
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ApplicationError, correlation_id: String) -> (StatusCode, Json<ApiError>) {
    tracing::warn!(
        event_name = "server.request.rejected",
        correlation_id = %correlation_id,
        error = %error,
        "request failed"
    );
    let interface = error.into_interface(correlation_id);
    let message = match &interface {
        InterfaceError::BadRequest { message, .. } => message.clone(),
        other => other.user_message().to_string(),
    };
    (
        status_for(&interface),
        Json(ApiError {
            success: false,
            error: message,
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Agent facade. The body always follows the `{success, ...}` envelope, including bodies that
/// are not valid JSON; the status code reflects the failure class.
pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> (StatusCode, Json<ChatResponse>) {
    let correlation_id = correlation_id();
    let outcome = match payload {
        Ok(Json(request)) => state.runtime.respond(request, &correlation_id).await,
        Err(rejection) => {
            tracing::warn!(
                event_name = "server.chat.malformed_body",
                correlation_id = %correlation_id,
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "chat body rejected"
            );
            Err(ApplicationError::Validation(rejection.body_text()).into_interface(correlation_id))
        }
    };
    let status = outcome.as_ref().err().map_or(StatusCode::OK, status_for);
    (status, Json(ChatResponse::from(outcome)))
}

pub async fn list_sessions(
    State(state): State<ChatState>,
    Query(query): Query<SessionListQuery>,
) -> ApiResult<SessionListResponse> {
    let Some(user_id) = query.user_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
    else {
        return Err(reject(
            ApplicationError::Validation("user_id query parameter is required".to_string()),
            correlation_id(),
        ));
    };

    let sessions = state
        .runtime
        .sessions()
        .list_for_user(&UserId(user_id.clone()))
        .await
        .map_err(|error| reject(error, correlation_id()))?;

    Ok(Json(SessionListResponse {
        user_id,
        sessions: sessions.into_iter().map(SessionView::from).collect(),
    }))
}

pub async fn update_budget(
    Path(session_id): Path<String>,
    State(state): State<ChatState>,
    Json(body): Json<BudgetRequest>,
) -> ApiResult<SessionView> {
    let session = state
        .runtime
        .sessions()
        .update_budget(&SessionId(session_id), body.amount)
        .await
        .map_err(|error| reject(error, correlation_id()))?;
    Ok(Json(session.into()))
}

pub async fn close_session(
    Path(session_id): Path<String>,
    State(state): State<ChatState>,
) -> ApiResult<SessionView> {
    let session = state
        .runtime
        .sessions()
        .close(&SessionId(session_id))
        .await
        .map_err(|error| reject(error, correlation_id()))?;
    Ok(Json(session.into()))
}

pub async fn session_history(
    Path(session_id): Path<String>,
    State(state): State<ChatState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let session_id = SessionId(session_id);
    let exists = state
        .runtime
        .sessions()
        .find(&session_id)
        .await
        .map_err(|error| reject(error, correlation_id()))?
        .is_some();
    if !exists {
        return Err(reject(
            ApplicationError::Validation(format!("session `{session_id}` does not exist")),
            correlation_id(),
        ));
    }

    let limit = query
        .limit
        .unwrap_or(state.runtime.orchestrator().settings().history_limit)
        .clamp(1, MAX_HISTORY_PAGE);
    let turns = state
        .runtime
        .history()
        .load(&session_id, limit)
        .await
        .map_err(|error| reject(error, correlation_id()))?;

    Ok(Json(HistoryResponse { session_id: session_id.0, turns }))
}

pub async fn agent_info(State(state): State<ChatState>) -> Json<AgentInfo> {
    Json(state.info.as_ref().clone())
}
