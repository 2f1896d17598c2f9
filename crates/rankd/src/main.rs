//! rankd - XP and leveling daemon

use anyhow::{Context, Result};
use clap::Parser;
use rank_common::{
    AnnouncementSink, Ledger, LevelUpDispatcher, LevelingEngine, RoleGrantExecutor,
};
use rankd::bridge::{HttpBridge, LogBridge};
use rankd::config::Config;
use rankd::events::run_event_loop;
use rankd::metrics::RankMetrics;
use rankd::server::{self, AppState};
use rankd::voice::{VoiceRoster, VoiceTicker};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rankd")]
#[command(about = "XP and leveling daemon", version)]
struct Args {
    /// Config file (defaults to /etc/rank/rankd.toml)
    #[arg(long, env = "RANKD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address from the config file
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("rankd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let listen = args.listen.unwrap_or_else(|| config.daemon.listen.clone());

    let ledger = Ledger::open(config.daemon.db_location(), config.curve.to_curve())
        .await
        .context("Failed to open ledger")?;
    info!("Ledger ready at {}", ledger.path().display());
    let ledger = Arc::new(ledger);

    let settings = Arc::new(config.settings_registry());
    let metrics = Arc::new(RankMetrics::new().context("Failed to register metrics")?);

    let (roles, announcer): (Arc<dyn RoleGrantExecutor>, Arc<dyn AnnouncementSink>) =
        match &config.bridge.url {
            Some(url) => {
                let bridge = Arc::new(HttpBridge::new(
                    url,
                    Duration::from_secs(config.bridge.timeout_secs),
                )?);
                info!("Using gateway bridge at {}", url);
                let roles: Arc<dyn RoleGrantExecutor> = bridge.clone();
                let announcer: Arc<dyn AnnouncementSink> = bridge;
                (roles, announcer)
            }
            None => {
                warn!("No bridge url configured, role grants and announcements are only logged");
                let roles: Arc<dyn RoleGrantExecutor> = Arc::new(LogBridge);
                let announcer: Arc<dyn AnnouncementSink> = Arc::new(LogBridge);
                (roles, announcer)
            }
        };

    let engine = Arc::new(LevelingEngine::new(Arc::clone(&ledger), settings));
    let dispatcher = Arc::new(LevelUpDispatcher::new(ledger, roles, announcer));
    let roster = Arc::new(VoiceRoster::new());

    let (events_tx, events_rx) = mpsc::channel(config.daemon.event_queue.max(1));
    let state = Arc::new(AppState::new(
        Arc::clone(&engine),
        Arc::clone(&dispatcher),
        Arc::clone(&roster),
        Arc::clone(&metrics),
        events_tx,
    ));

    tokio::spawn(run_event_loop(Arc::clone(&state), events_rx));

    let ticker = VoiceTicker::new(engine, dispatcher, roster, metrics);
    tokio::spawn(ticker.run(Duration::from_secs(config.daemon.voice_tick_secs.max(1))));

    server::run(state, &listen, shutdown_signal()).await?;
    info!("rankd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
