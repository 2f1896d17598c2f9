//! Per-community leveling settings.
//!
//! Settings are parsed and normalized once at the boundary (config file,
//! admin API) and passed downstream as a typed record. Absent fields fall
//! back to the documented defaults below.

use crate::ids::{ChannelId, CommunityId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_LEVEL_UP_MESSAGE: &str =
    "GG {user}, you just advanced to level {level}! ({xp} XP)";

/// Leveling settings of one community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySettings {
    /// Lower bound of the random per-message grant (inclusive)
    #[serde(default = "default_message_xp_min")]
    pub message_xp_min: u64,

    /// Upper bound of the random per-message grant (inclusive)
    #[serde(default = "default_message_xp_max")]
    pub message_xp_max: u64,

    /// Seconds between two message awards for the same member; 0 disables
    #[serde(default = "default_cooldown")]
    pub message_cooldown_secs: u64,

    /// Fixed grant per reaction
    #[serde(default = "default_reaction_xp")]
    pub reaction_xp: u64,

    /// Seconds between two reaction awards for the same member; 0 disables
    #[serde(default = "default_cooldown")]
    pub reaction_cooldown_secs: u64,

    /// Grant applied on every voice tick to each connected member
    #[serde(default = "default_voice_xp_per_minute")]
    pub voice_xp_per_minute: u64,

    /// Template with `{user}`, `{level}` and `{xp}` placeholders
    #[serde(default = "default_level_up_message")]
    pub level_up_message: String,

    /// Fixed announcement channel; when unset, announce where the activity happened
    #[serde(default)]
    pub level_up_channel: Option<ChannelId>,

    /// Text channels (or categories) that never earn XP
    #[serde(default)]
    pub ignored_channels: Vec<ChannelId>,

    /// Voice channels (or categories) that never earn voice XP
    #[serde(default)]
    pub ignored_voice_channels: Vec<ChannelId>,
}

fn default_message_xp_min() -> u64 {
    15
}

fn default_message_xp_max() -> u64 {
    25
}

fn default_cooldown() -> u64 {
    60
}

fn default_reaction_xp() -> u64 {
    5
}

fn default_voice_xp_per_minute() -> u64 {
    10
}

fn default_level_up_message() -> String {
    DEFAULT_LEVEL_UP_MESSAGE.to_string()
}

impl Default for CommunitySettings {
    fn default() -> Self {
        Self {
            message_xp_min: default_message_xp_min(),
            message_xp_max: default_message_xp_max(),
            message_cooldown_secs: default_cooldown(),
            reaction_xp: default_reaction_xp(),
            reaction_cooldown_secs: default_cooldown(),
            voice_xp_per_minute: default_voice_xp_per_minute(),
            level_up_message: default_level_up_message(),
            level_up_channel: None,
            ignored_channels: Vec::new(),
            ignored_voice_channels: Vec::new(),
        }
    }
}

impl CommunitySettings {
    /// Repair values that would otherwise be malformed downstream.
    pub fn normalized(mut self) -> Self {
        if self.message_xp_min > self.message_xp_max {
            std::mem::swap(&mut self.message_xp_min, &mut self.message_xp_max);
        }
        if self.level_up_message.trim().is_empty() {
            self.level_up_message = default_level_up_message();
        }
        self
    }

    /// A text channel is ignored if it or its parent category is listed.
    pub fn is_ignored_channel(&self, channel: ChannelId, category: Option<ChannelId>) -> bool {
        listed(&self.ignored_channels, channel, category)
    }

    pub fn is_ignored_voice_channel(&self, channel: ChannelId, category: Option<ChannelId>) -> bool {
        listed(&self.ignored_voice_channels, channel, category)
    }
}

fn listed(list: &[ChannelId], channel: ChannelId, category: Option<ChannelId>) -> bool {
    list.contains(&channel) || category.map(|c| list.contains(&c)).unwrap_or(false)
}

/// Partial settings for one community. Unset fields inherit the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsOverride {
    pub message_xp_min: Option<u64>,
    pub message_xp_max: Option<u64>,
    pub message_cooldown_secs: Option<u64>,
    pub reaction_xp: Option<u64>,
    pub reaction_cooldown_secs: Option<u64>,
    pub voice_xp_per_minute: Option<u64>,
    pub level_up_message: Option<String>,
    pub level_up_channel: Option<ChannelId>,
    pub ignored_channels: Option<Vec<ChannelId>>,
    pub ignored_voice_channels: Option<Vec<ChannelId>>,
}

impl SettingsOverride {
    pub fn apply(&self, base: &CommunitySettings) -> CommunitySettings {
        CommunitySettings {
            message_xp_min: self.message_xp_min.unwrap_or(base.message_xp_min),
            message_xp_max: self.message_xp_max.unwrap_or(base.message_xp_max),
            message_cooldown_secs: self
                .message_cooldown_secs
                .unwrap_or(base.message_cooldown_secs),
            reaction_xp: self.reaction_xp.unwrap_or(base.reaction_xp),
            reaction_cooldown_secs: self
                .reaction_cooldown_secs
                .unwrap_or(base.reaction_cooldown_secs),
            voice_xp_per_minute: self.voice_xp_per_minute.unwrap_or(base.voice_xp_per_minute),
            level_up_message: self
                .level_up_message
                .clone()
                .unwrap_or_else(|| base.level_up_message.clone()),
            level_up_channel: self.level_up_channel.or(base.level_up_channel),
            ignored_channels: self
                .ignored_channels
                .clone()
                .unwrap_or_else(|| base.ignored_channels.clone()),
            ignored_voice_channels: self
                .ignored_voice_channels
                .clone()
                .unwrap_or_else(|| base.ignored_voice_channels.clone()),
        }
        .normalized()
    }
}

/// Effective settings for every community, resolved up front.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    defaults: CommunitySettings,
    communities: HashMap<CommunityId, CommunitySettings>,
}

impl SettingsRegistry {
    pub fn new(defaults: CommunitySettings) -> Self {
        Self {
            defaults: defaults.normalized(),
            communities: HashMap::new(),
        }
    }

    pub fn with_override(mut self, community: CommunityId, patch: &SettingsOverride) -> Self {
        let resolved = patch.apply(&self.defaults);
        self.communities.insert(community, resolved);
        self
    }

    pub fn settings_for(&self, community: CommunityId) -> &CommunitySettings {
        self.communities.get(&community).unwrap_or(&self.defaults)
    }

    pub fn defaults(&self) -> &CommunitySettings {
        &self.defaults
    }

    pub fn configured_communities(&self) -> impl Iterator<Item = &CommunityId> {
        self.communities.keys()
    }
}
