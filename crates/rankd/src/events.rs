//! Activity event bus
//!
//! The HTTP ingest handler only enqueues. A single loop drains the queue in
//! acceptance order and awaits each ledger award before taking the next
//! event, so awards for one member land in the order they were accepted.
//! Level-up side effects run in detached tasks.

use crate::metrics::RankMetrics;
use crate::server::AppState;
use crate::voice::VoicePresence;
use rank_common::{
    Activity, ActivitySource, AwardOutcome, ChannelId, CommunityId, CommunitySettings,
    DispatchReport, LevelUp, LevelUpDispatcher, MemberId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A message or reaction seen by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPayload {
    pub community: CommunityId,
    pub member: MemberId,
    pub channel: ChannelId,
    /// Parent category of `channel`
    #[serde(default)]
    pub category: Option<ChannelId>,
    #[serde(default)]
    pub is_bot: bool,
    /// Milliseconds since epoch; stamped on acceptance when missing
    #[serde(default)]
    pub at_ms: Option<i64>,
}

/// A voice join, move or disconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStatePayload {
    pub community: CommunityId,
    pub member: MemberId,
    /// None when the member disconnected
    #[serde(default)]
    pub channel: Option<ChannelId>,
    #[serde(default)]
    pub category: Option<ChannelId>,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    Message(ActivityPayload),
    Reaction(ActivityPayload),
    VoiceState(VoiceStatePayload),
}

impl ActivityEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::Message(_) => "message",
            ActivityEvent::Reaction(_) => "reaction",
            ActivityEvent::VoiceState(_) => "voice_state",
        }
    }

    /// Fill in the acceptance timestamp where the sender left it out.
    pub fn stamped(mut self, now_ms: i64) -> Self {
        match &mut self {
            ActivityEvent::Message(p) | ActivityEvent::Reaction(p) => {
                p.at_ms.get_or_insert(now_ms);
            }
            ActivityEvent::VoiceState(_) => {}
        }
        self
    }
}

/// Run the dispatcher for `level_up` in a detached task.
pub fn spawn_dispatch(
    dispatcher: Arc<LevelUpDispatcher>,
    metrics: Arc<RankMetrics>,
    level_up: LevelUp,
    settings: CommunitySettings,
) -> JoinHandle<DispatchReport> {
    tokio::spawn(async move {
        let report = dispatcher.dispatch(&level_up, &settings).await;
        metrics.record_dispatch(&report);
        report
    })
}

/// Process one event. Returns the dispatch task when the event caused a
/// level-up.
pub async fn handle_event(
    state: &AppState,
    event: ActivityEvent,
) -> Option<JoinHandle<DispatchReport>> {
    match event {
        ActivityEvent::Message(payload) => {
            handle_activity(state, ActivitySource::Message, payload).await
        }
        ActivityEvent::Reaction(payload) => {
            handle_activity(state, ActivitySource::Reaction, payload).await
        }
        ActivityEvent::VoiceState(payload) => {
            if payload.is_bot {
                state.metrics.record_dropped("bot");
                return None;
            }
            let presence = payload.channel.map(|channel| VoicePresence {
                channel,
                category: payload.category,
            });
            state
                .roster
                .update(payload.community, payload.member, presence)
                .await;
            state.metrics.voice_members.set(state.roster.len().await as i64);
            None
        }
    }
}

async fn handle_activity(
    state: &AppState,
    source: ActivitySource,
    payload: ActivityPayload,
) -> Option<JoinHandle<DispatchReport>> {
    if payload.is_bot {
        state.metrics.record_dropped("bot");
        return None;
    }

    let settings = state.engine.settings_for(payload.community);
    if settings.is_ignored_channel(payload.channel, payload.category) {
        debug!(
            "Dropping {} from {} in ignored channel {}",
            source.as_str(),
            payload.member,
            payload.channel
        );
        state.metrics.record_dropped("ignored_channel");
        return None;
    }

    let activity = Activity {
        community: payload.community,
        member: payload.member,
        channel: Some(payload.channel),
        at_ms: payload
            .at_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    };

    let result = match source {
        ActivitySource::Reaction => state.engine.on_reaction_activity(&activity).await,
        _ => state.engine.on_message_activity(&activity).await,
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            // Redelivery is the gateway's concern; the event is not retried here
            state.metrics.store_failures_total.inc();
            error!(
                "{} award for {} in {} failed: {}",
                source.as_str(),
                activity.member,
                activity.community,
                e
            );
            return None;
        }
    };

    state.metrics.record_award(source, &outcome);

    match outcome {
        AwardOutcome::Granted(change) => change.level_up().map(|level_up| {
            spawn_dispatch(
                Arc::clone(&state.dispatcher),
                Arc::clone(&state.metrics),
                level_up,
                settings.clone(),
            )
        }),
        AwardOutcome::Declined => None,
    }
}

/// Drain the bus until every sender is gone.
pub async fn run_event_loop(state: Arc<AppState>, mut rx: mpsc::Receiver<ActivityEvent>) {
    info!("Event loop started");
    while let Some(event) = rx.recv().await {
        handle_event(&state, event).await;
    }
    warn!("Event bus closed, event loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event: ActivityEvent = serde_json::from_str(
            r#"{"type": "message", "community": 1, "member": 2, "channel": 3}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "message");
        match &event {
            ActivityEvent::Message(p) => {
                assert!(!p.is_bot);
                assert_eq!(p.category, None);
                assert_eq!(p.at_ms, None);
            }
            other => panic!("unexpected {:?}", other),
        }

        let voice: ActivityEvent = serde_json::from_str(
            r#"{"type": "voice_state", "community": 1, "member": 2}"#,
        )
        .unwrap();
        assert_eq!(
            voice,
            ActivityEvent::VoiceState(VoiceStatePayload {
                community: CommunityId(1),
                member: MemberId(2),
                channel: None,
                category: None,
                is_bot: false,
            })
        );
    }

    #[test]
    fn test_stamped_keeps_sender_timestamp() {
        let payload = ActivityPayload {
            community: CommunityId(1),
            member: MemberId(2),
            channel: ChannelId(3),
            category: None,
            is_bot: false,
            at_ms: Some(5),
        };
        match ActivityEvent::Reaction(payload.clone()).stamped(99) {
            ActivityEvent::Reaction(p) => assert_eq!(p.at_ms, Some(5)),
            other => panic!("unexpected {:?}", other),
        }
        match ActivityEvent::Message(ActivityPayload { at_ms: None, ..payload }).stamped(99) {
            ActivityEvent::Message(p) => assert_eq!(p.at_ms, Some(99)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
