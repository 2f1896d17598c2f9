//! Shared setup for rankd integration tests: a temp ledger, fake side
//! effects and an AppState whose event queue the test drains itself.

#![allow(dead_code)]

use rank_common::dispatch::{FakeAnnouncer, FakeRoleExecutor};
use rank_common::{
    ChannelId, CommunityId, CommunitySettings, DbLocation, Ledger, LevelCurve, LevelUpDispatcher,
    LevelingEngine, SettingsOverride, SettingsRegistry,
};
use rankd::events::ActivityEvent;
use rankd::metrics::RankMetrics;
use rankd::server::AppState;
use rankd::voice::{VoiceRoster, VoiceTicker};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const GUILD: CommunityId = CommunityId(81384788765712384);
pub const QUIET_GUILD: CommunityId = CommunityId(175928847299117063);

pub struct Harness {
    _dir: TempDir,
    pub state: Arc<AppState>,
    pub roles: Arc<FakeRoleExecutor>,
    pub announcer: Arc<FakeAnnouncer>,
    pub events: mpsc::Receiver<ActivityEvent>,
}

impl Harness {
    pub fn ledger(&self) -> &Arc<Ledger> {
        self.state.engine.ledger()
    }

    pub fn ticker(&self) -> VoiceTicker {
        VoiceTicker::new(
            Arc::clone(&self.state.engine),
            Arc::clone(&self.state.dispatcher),
            Arc::clone(&self.state.roster),
            Arc::clone(&self.state.metrics),
        )
    }
}

/// Messages always grant 20 XP and never cool down. QUIET_GUILD grants
/// nothing for voice and ignores channel 13 and category 14.
pub fn test_settings() -> SettingsRegistry {
    let defaults = CommunitySettings {
        message_xp_min: 20,
        message_xp_max: 20,
        message_cooldown_secs: 0,
        ..CommunitySettings::default()
    };
    SettingsRegistry::new(defaults).with_override(
        QUIET_GUILD,
        &SettingsOverride {
            voice_xp_per_minute: Some(0),
            ignored_channels: Some(vec![ChannelId(13), ChannelId(14)]),
            ignored_voice_channels: Some(vec![ChannelId(77)]),
            message_cooldown_secs: Some(60),
            ..SettingsOverride::default()
        },
    )
}

pub async fn harness() -> Harness {
    harness_with_queue(64).await
}

pub async fn harness_with_queue(capacity: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(
        DbLocation::Custom(dir.path().join("ledger.db")),
        LevelCurve::default(),
    )
    .await
    .unwrap();
    let ledger = Arc::new(ledger);

    let roles = Arc::new(FakeRoleExecutor::new());
    let announcer = Arc::new(FakeAnnouncer::new());
    let engine = Arc::new(LevelingEngine::new(
        Arc::clone(&ledger),
        Arc::new(test_settings()),
    ));
    let dispatcher = Arc::new(LevelUpDispatcher::new(
        ledger,
        roles.clone(),
        announcer.clone(),
    ));

    let (tx, rx) = mpsc::channel(capacity);
    let state = Arc::new(AppState::new(
        engine,
        dispatcher,
        Arc::new(VoiceRoster::new()),
        Arc::new(RankMetrics::new().unwrap()),
        tx,
    ));

    Harness {
        _dir: dir,
        state,
        roles,
        announcer,
        events: rx,
    }
}
