//! HTTP server for rankd

use crate::events::ActivityEvent;
use crate::metrics::RankMetrics;
use crate::routes;
use crate::voice::VoiceRoster;
use anyhow::{Context, Result};
use axum::Router;
use rank_common::{LevelUpDispatcher, LevelingEngine, SnapshotClaimReconciler};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers and the event loop
pub struct AppState {
    pub engine: Arc<LevelingEngine>,
    pub dispatcher: Arc<LevelUpDispatcher>,
    pub claims: SnapshotClaimReconciler,
    pub roster: Arc<VoiceRoster>,
    pub metrics: Arc<RankMetrics>,
    pub events: mpsc::Sender<ActivityEvent>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        engine: Arc<LevelingEngine>,
        dispatcher: Arc<LevelUpDispatcher>,
        roster: Arc<VoiceRoster>,
        metrics: Arc<RankMetrics>,
        events: mpsc::Sender<ActivityEvent>,
    ) -> Self {
        let claims = SnapshotClaimReconciler::new(Arc::clone(engine.ledger()));
        Self {
            engine,
            dispatcher,
            claims,
            roster,
            metrics,
            events,
            start_time: Instant::now(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::activity_routes())
        .merge(routes::rank_routes())
        .merge(routes::admin_routes())
        .merge(routes::health_routes())
        .merge(routes::metrics_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until `shutdown` resolves
pub async fn run(
    state: Arc<AppState>,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
