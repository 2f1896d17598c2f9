//! Voice roster and the periodic voice XP tick

use crate::events::spawn_dispatch;
use crate::metrics::RankMetrics;
use rank_common::{ChannelId, CommunityId, LevelUpDispatcher, LevelingEngine, MemberId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where a member is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicePresence {
    pub channel: ChannelId,
    pub category: Option<ChannelId>,
}

/// Members currently connected to voice, per community
#[derive(Default)]
pub struct VoiceRoster {
    members: RwLock<HashMap<CommunityId, HashMap<MemberId, VoicePresence>>>,
}

impl VoiceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a join or move (`Some`) or a disconnect (`None`).
    pub async fn update(
        &self,
        community: CommunityId,
        member: MemberId,
        presence: Option<VoicePresence>,
    ) {
        let mut members = self.members.write().await;
        match presence {
            Some(presence) => {
                members.entry(community).or_default().insert(member, presence);
            }
            None => {
                if let Some(connected) = members.get_mut(&community) {
                    connected.remove(&member);
                    if connected.is_empty() {
                        members.remove(&community);
                    }
                }
            }
        }
    }

    pub async fn snapshot(&self) -> HashMap<CommunityId, HashMap<MemberId, VoicePresence>> {
        self.members.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Awards voice XP to everyone in the roster on a fixed interval.
///
/// Each community runs in its own task. A community whose previous tick has
/// not finished is skipped.
pub struct VoiceTicker {
    engine: Arc<LevelingEngine>,
    dispatcher: Arc<LevelUpDispatcher>,
    roster: Arc<VoiceRoster>,
    metrics: Arc<RankMetrics>,
    in_flight: Arc<Mutex<HashSet<CommunityId>>>,
}

/// Clears the in-flight mark when the community task ends, panics included.
struct InFlight {
    community: CommunityId,
    set: Arc<Mutex<HashSet<CommunityId>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.community);
        }
    }
}

impl VoiceTicker {
    pub fn new(
        engine: Arc<LevelingEngine>,
        dispatcher: Arc<LevelUpDispatcher>,
        roster: Arc<VoiceRoster>,
        metrics: Arc<RankMetrics>,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            roster,
            metrics,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start one tick: spawn a task per community and return their handles.
    pub async fn tick(&self) -> Vec<JoinHandle<()>> {
        let snapshot = self.roster.snapshot().await;
        let mut handles = Vec::with_capacity(snapshot.len());

        for (community, members) in snapshot {
            let guard = match self.claim(community) {
                Some(guard) => guard,
                None => {
                    debug!("Voice tick for {} still running, skipping", community);
                    continue;
                }
            };

            let engine = Arc::clone(&self.engine);
            let dispatcher = Arc::clone(&self.dispatcher);
            let metrics = Arc::clone(&self.metrics);

            handles.push(tokio::spawn(async move {
                let _guard = guard;
                award_community(&engine, &dispatcher, &metrics, community, members).await;
            }));
        }

        handles
    }

    /// Tick forever at `period`.
    pub async fn run(self, period: Duration) {
        info!("Voice ticker started ({}s interval)", period.as_secs());
        let mut interval = tokio::time::interval(period);
        // The first tick of a tokio interval fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    fn claim(&self, community: CommunityId) -> Option<InFlight> {
        let mut set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !set.insert(community) {
            return None;
        }
        Some(InFlight {
            community,
            set: Arc::clone(&self.in_flight),
        })
    }
}

async fn award_community(
    engine: &Arc<LevelingEngine>,
    dispatcher: &Arc<LevelUpDispatcher>,
    metrics: &Arc<RankMetrics>,
    community: CommunityId,
    members: HashMap<MemberId, VoicePresence>,
) {
    let settings = engine.settings_for(community).clone();
    let mut awarded = 0usize;

    for (member, presence) in members {
        if settings.is_ignored_voice_channel(presence.channel, presence.category) {
            continue;
        }
        match engine.on_voice_tick(community, member).await {
            Ok(outcome) => {
                metrics.record_award(rank_common::ActivitySource::Voice, &outcome);
                if outcome.is_granted() {
                    awarded += 1;
                }
                if let Some(level_up) = outcome.level_up() {
                    spawn_dispatch(
                        Arc::clone(dispatcher),
                        Arc::clone(metrics),
                        level_up,
                        settings.clone(),
                    );
                }
            }
            Err(e) => {
                metrics.store_failures_total.inc();
                if e.is_transient() {
                    warn!("Voice award for {} in {} failed: {}", member, community, e);
                } else {
                    error!("Voice award for {} in {} failed: {}", member, community, e);
                }
            }
        }
    }

    debug!("Voice tick in {}: {} members awarded", community, awarded);
}
