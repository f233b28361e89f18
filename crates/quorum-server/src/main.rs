use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::json;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use quorum_core::events::{remote_event_registry, RoomEventBus};
use quorum_core::registry::RoomRegistry;
use quorum_core::vote::VoteToggler;
use quorum_core::{AppConfig, AppState};
use quorum_fanout::FanoutClient;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dirs(&config);

    let db = quorum_db::create_pool(&config.database.url, config.database.max_connections).await?;
    quorum_db::run_migrations(&db).await?;

    let fanout = Arc::new(FanoutClient::connect(&config.redis.url).await?);
    let shutdown_notify = Arc::new(Notify::new());

    let state = AppState {
        db,
        event_bus: RoomEventBus::default(),
        fanout: fanout.clone(),
        registry: Arc::new(RoomRegistry::new()),
        votes: Arc::new(VoteToggler::new()),
        config: AppConfig {
            worker_id: config.server.worker_id,
            presence_stale_max_age: Duration::from_secs(config.presence.stale_max_age_seconds),
            presence_sweep_interval: Duration::from_secs(config.presence.sweep_interval_seconds),
        },
        shutdown: shutdown_notify.clone(),
    };

    // Re-emit events from other processes to this process's connections.
    let subscriber_task = fanout.spawn_subscriber(remote_event_registry(&state));
    let sweep_task = tokio::spawn(run_presence_sweep(state.clone()));

    let app = Router::new()
        .merge(quorum_ws::gateway_router())
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        addr = %config.server.bind_address,
        origin = %fanout.origin_process_id(),
        "quorum gateway listening"
    );

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down (ctrl-c)...");
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("Shutting down (requested)...");
            }
        }
        subscriber_task.abort();
        sweep_task.abort();
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Periodically evict presence entries whose owners vanished without a
/// clean disconnect reaching any process. Sweeps only rooms this process
/// currently serves.
async fn run_presence_sweep(state: AppState) {
    let mut interval = tokio::time::interval(state.config.presence_sweep_interval);
    interval.tick().await; // skip immediate first tick
    loop {
        interval.tick().await;
        for room_code in state.registry.room_codes() {
            match state
                .fanout
                .cleanup_stale(&room_code, state.config.presence_stale_max_age)
                .await
            {
                Ok(0) => {}
                Ok(evicted) => {
                    tracing::info!(room_code = %room_code, evicted, "presence sweep evicted stale entries");
                }
                Err(err) => {
                    tracing::warn!(room_code = %room_code, error = %err, "presence sweep failed");
                }
            }
        }
    }
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let database = quorum_db::ping(&state.db).await.is_ok();
    let redis = state.fanout.ping().await.is_ok();
    let healthy = database && redis;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = if healthy { "ok" } else { "degraded" };
    (
        status,
        Json(json!({
            "status": body,
            "database": database,
            "redis": redis,
        })),
    )
}

/// Ensure the sqlite data directory exists before the pool opens it.
fn ensure_data_dirs(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
    }
}
