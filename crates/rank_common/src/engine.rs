//! Leveling engine: the activity entry points.
//!
//! Callers filter bot accounts and ignored channels before calling in. Each
//! entry point runs one award through the policy and the ledger; when the
//! result is a level-up the caller hands it to the dispatcher once.

use crate::award::{ActivitySource, AwardOutcome, AwardPolicy, LevelChange};
use crate::error::Result;
use crate::ids::{ChannelId, CommunityId, MemberId};
use crate::ledger::Ledger;
use crate::settings::{CommunitySettings, SettingsRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A message or reaction by a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub community: CommunityId,
    pub member: MemberId,
    pub channel: Option<ChannelId>,
    /// Milliseconds since epoch
    pub at_ms: i64,
}

pub struct LevelingEngine {
    ledger: Arc<Ledger>,
    settings: Arc<SettingsRegistry>,
    policy: AwardPolicy,
}

impl LevelingEngine {
    pub fn new(ledger: Arc<Ledger>, settings: Arc<SettingsRegistry>) -> Self {
        Self {
            ledger,
            settings,
            policy: AwardPolicy::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn settings_for(&self, community: CommunityId) -> &CommunitySettings {
        self.settings.settings_for(community)
    }

    pub async fn on_message_activity(&self, activity: &Activity) -> Result<AwardOutcome> {
        self.award(
            ActivitySource::Message,
            activity.community,
            activity.member,
            activity.channel,
            activity.at_ms,
        )
        .await
    }

    pub async fn on_reaction_activity(&self, activity: &Activity) -> Result<AwardOutcome> {
        self.award(
            ActivitySource::Reaction,
            activity.community,
            activity.member,
            activity.channel,
            activity.at_ms,
        )
        .await
    }

    /// One scheduled voice tick for a connected member. Not cooldown-gated.
    pub async fn on_voice_tick(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<AwardOutcome> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.award(ActivitySource::Voice, community, member, None, now_ms)
            .await
    }

    async fn award(
        &self,
        source: ActivitySource,
        community: CommunityId,
        member: MemberId,
        channel: Option<ChannelId>,
        now_ms: i64,
    ) -> Result<AwardOutcome> {
        let settings = self.settings.settings_for(community);
        let amount = self.policy.grant_amount(source, settings);
        let slot = source.cooldown_slot();

        // Nothing to grant and no cooldown to record
        if amount == 0 && slot.is_none() {
            return Ok(AwardOutcome::Declined);
        }

        let cooldown_secs = self.policy.cooldown_secs(source, settings);
        let outcome = self
            .ledger
            .try_award(community, member, slot, now_ms, cooldown_secs, amount)
            .await?;

        match outcome {
            None => {
                debug!(
                    "{} award for {} in {} declined (cooling down)",
                    source.as_str(),
                    member,
                    community
                );
                Ok(AwardOutcome::Declined)
            }
            Some(outcome) => {
                debug!(
                    "{} award for {} in {}: +{} XP, total {}",
                    source.as_str(),
                    member,
                    community,
                    amount,
                    outcome.new_total
                );
                Ok(AwardOutcome::Granted(LevelChange::from_outcome(
                    community, member, source, amount, channel, outcome,
                )))
            }
        }
    }
}
