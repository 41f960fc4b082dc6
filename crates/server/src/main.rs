mod bootstrap;
pub mod chat;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use kathir_core::config::{AppConfig, LoadOptions};
use tower_http::cors::CorsLayer;

use crate::chat::{AgentInfo, ChatState};
use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use kathir_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

/// Chat API plus health, behind permissive CORS for the browser widget.
pub fn app_router(chat_state: ChatState, health_state: Option<HealthState>) -> Router {
    let mut router = chat::router(chat_state);
    if let Some(health_state) = health_state {
        router = router.merge(health::router(health_state));
    }
    router.layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let info = AgentInfo {
        assistant_name: app.config.agent.assistant_name.clone(),
        provider: app.config.llm.provider.as_str().to_string(),
        tool_model: app.config.llm.tool_model.clone(),
        response_model: app.config.llm.response_model.clone(),
        currency: app.config.agent.currency.clone(),
        tools: app.agent_runtime.orchestrator().tool_names(),
    };
    let router = app_router(
        ChatState { runtime: app.agent_runtime.clone(), info: Arc::new(info) },
        Some(HealthState {
            db_pool: app.db_pool.clone(),
            model: app.config.llm.response_model.clone(),
        }),
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "kathir-server listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "kathir-server stopping"
    );
    let _ = shutdown_tx.send(());

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not drain before the grace period"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
