//! Award policy
//!
//! Decides whether an activity event may earn XP now and how much. Per
//! (account, source) the policy is a two-state machine: eligible or cooling
//! down. A declined award writes nothing and is never surfaced to the member.
//!
//! Channel filtering happens before the policy is consulted.

use crate::ids::{ChannelId, CommunityId, MemberId};
use crate::ledger::{AddOutcome, CooldownSlot};
use crate::settings::CommunitySettings;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Message,
    Reaction,
    Voice,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::Message => "message",
            ActivitySource::Reaction => "reaction",
            ActivitySource::Voice => "voice",
        }
    }

    /// Voice ticks are paced by the scheduler, not by a cooldown.
    pub fn cooldown_slot(&self) -> Option<CooldownSlot> {
        match self {
            ActivitySource::Message => Some(CooldownSlot::Message),
            ActivitySource::Reaction => Some(CooldownSlot::Reaction),
            ActivitySource::Voice => None,
        }
    }
}

/// `true` while `now - last_award_at` is shorter than the cooldown.
/// A zero cooldown never gates.
pub fn is_cooling_down(last_award_at_ms: i64, now_ms: i64, cooldown_secs: u64) -> bool {
    if cooldown_secs == 0 {
        return false;
    }
    let window_ms = i64::try_from(cooldown_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    now_ms.saturating_sub(last_award_at_ms) < window_ms
}

#[derive(Debug, Clone, Default)]
pub struct AwardPolicy;

impl AwardPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Grant size: uniform in `[min, max]` for messages, fixed otherwise.
    pub fn grant_amount(&self, source: ActivitySource, settings: &CommunitySettings) -> u64 {
        match source {
            ActivitySource::Message => {
                let (min, max) = (settings.message_xp_min, settings.message_xp_max);
                if min >= max {
                    return max;
                }
                rand::thread_rng().gen_range(min..=max)
            }
            ActivitySource::Reaction => settings.reaction_xp,
            ActivitySource::Voice => settings.voice_xp_per_minute,
        }
    }

    pub fn cooldown_secs(&self, source: ActivitySource, settings: &CommunitySettings) -> u64 {
        match source {
            ActivitySource::Message => settings.message_cooldown_secs,
            ActivitySource::Reaction => settings.reaction_cooldown_secs,
            ActivitySource::Voice => 0,
        }
    }
}

/// Result of one activity event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardOutcome {
    /// Cooling down, or nothing to grant
    Declined,
    Granted(LevelChange),
}

impl AwardOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AwardOutcome::Granted(_))
    }

    pub fn level_up(&self) -> Option<LevelUp> {
        match self {
            AwardOutcome::Granted(change) => change.level_up(),
            AwardOutcome::Declined => None,
        }
    }
}

/// A committed grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    pub community: CommunityId,
    pub member: MemberId,
    pub source: ActivitySource,
    pub amount: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub new_total: u64,
    /// Channel the activity happened in, if any
    pub origin_channel: Option<ChannelId>,
}

impl LevelChange {
    pub fn from_outcome(
        community: CommunityId,
        member: MemberId,
        source: ActivitySource,
        amount: u64,
        origin_channel: Option<ChannelId>,
        outcome: AddOutcome,
    ) -> Self {
        Self {
            community,
            member,
            source,
            amount,
            old_level: outcome.old_level,
            new_level: outcome.new_level,
            new_total: outcome.new_total,
            origin_channel,
        }
    }

    pub fn level_up(&self) -> Option<LevelUp> {
        if self.new_level <= self.old_level {
            return None;
        }
        Some(LevelUp {
            community: self.community,
            member: self.member,
            old_level: self.old_level,
            new_level: self.new_level,
            total_xp: self.new_total,
            origin_channel: self.origin_channel,
        })
    }
}

/// A threshold crossing, handed to the level-up dispatcher exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub community: CommunityId,
    pub member: MemberId,
    pub old_level: u32,
    pub new_level: u32,
    pub total_xp: u64,
    pub origin_channel: Option<ChannelId>,
}
