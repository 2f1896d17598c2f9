//! Level-up dispatcher
//!
//! Runs the side effects of a level-up: cumulative role grants and the
//! announcement. Both are best-effort and independent of each other; the XP
//! write that caused the level-up is already committed and stays so.
//!
//! The role-grant executor and announcement sink are traits so the daemon can
//! plug in its gateway bridge and tests can plug in the fakes below.

use crate::award::LevelUp;
use crate::error::SideEffectError;
use crate::ids::{ChannelId, CommunityId, MemberId, RoleId};
use crate::ledger::Ledger;
use crate::settings::CommunitySettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

// ============================================================================
// External seams
// ============================================================================

/// Grants roles on the chat platform. Granting a held role must be a no-op.
#[async_trait]
pub trait RoleGrantExecutor: Send + Sync {
    async fn has_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<bool, SideEffectError>;

    async fn grant_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<(), SideEffectError>;
}

/// Posts a text message to a channel.
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    async fn send(
        &self,
        community: CommunityId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), SideEffectError>;
}

// ============================================================================
// Dispatcher
// ============================================================================

/// What one dispatch did, for logs and metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub granted: Vec<RoleId>,
    pub already_held: Vec<RoleId>,
    pub failed: Vec<RoleId>,
    /// Role bindings could not be read; no grants were attempted
    pub bindings_unavailable: bool,
    pub announced_to: Option<ChannelId>,
    pub announce_failed: bool,
}

/// Substitute `{user}`, `{level}` and `{xp}` into a level-up template.
pub fn render_level_up(template: &str, level_up: &LevelUp) -> String {
    template
        .replace("{user}", &format!("<@{}>", level_up.member))
        .replace("{level}", &level_up.new_level.to_string())
        .replace("{xp}", &level_up.total_xp.to_string())
}

pub struct LevelUpDispatcher {
    ledger: Arc<Ledger>,
    roles: Arc<dyn RoleGrantExecutor>,
    announcer: Arc<dyn AnnouncementSink>,
}

impl LevelUpDispatcher {
    pub fn new(
        ledger: Arc<Ledger>,
        roles: Arc<dyn RoleGrantExecutor>,
        announcer: Arc<dyn AnnouncementSink>,
    ) -> Self {
        Self {
            ledger,
            roles,
            announcer,
        }
    }

    /// Attempt every side effect of `level_up`. Never fails; failures are
    /// logged and reported.
    pub async fn dispatch(&self, level_up: &LevelUp, settings: &CommunitySettings) -> DispatchReport {
        let mut report = DispatchReport::default();

        info!(
            "Member {} in {} reached level {} (from {}, {} XP)",
            level_up.member, level_up.community, level_up.new_level, level_up.old_level,
            level_up.total_xp
        );

        // Every threshold at or below the new level, not just the crossed
        // ones, so a previously failed grant heals here.
        match self
            .ledger
            .roles_up_to(level_up.community, level_up.new_level)
            .await
        {
            Ok(roles) => {
                for role in roles {
                    self.ensure_role(level_up, role, &mut report).await;
                }
            }
            Err(e) => {
                warn!(
                    "Could not read level roles for {}: {}",
                    level_up.community, e
                );
                report.bindings_unavailable = true;
            }
        }

        if let Some(channel) = settings.level_up_channel.or(level_up.origin_channel) {
            let text = render_level_up(&settings.level_up_message, level_up);
            match self.announcer.send(level_up.community, channel, &text).await {
                Ok(()) => report.announced_to = Some(channel),
                Err(e) => {
                    warn!(
                        "Level-up announcement for {} in channel {} failed: {}",
                        level_up.member, channel, e
                    );
                    report.announce_failed = true;
                }
            }
        } else {
            debug!("No announcement target for level-up of {}", level_up.member);
        }

        report
    }

    async fn ensure_role(&self, level_up: &LevelUp, role: RoleId, report: &mut DispatchReport) {
        let (community, member) = (level_up.community, level_up.member);

        match self.roles.has_role(community, member, role).await {
            Ok(true) => {
                report.already_held.push(role);
                return;
            }
            Ok(false) => {}
            // Granting is idempotent, so fall through and try anyway
            Err(e) => debug!("Role check {} for {} failed: {}", role, member, e),
        }

        match self.roles.grant_role(community, member, role).await {
            Ok(()) => {
                info!("Granted role {} to {} in {}", role, member, community);
                report.granted.push(role);
            }
            Err(e) => {
                warn!("Granting role {} to {} failed: {}", role, member, e);
                report.failed.push(role);
            }
        }
    }
}

// ============================================================================
// Fakes
// ============================================================================

/// In-memory role executor. Roles can be made to fail on grant.
#[derive(Default)]
pub struct FakeRoleExecutor {
    held: Mutex<HashSet<(CommunityId, MemberId, RoleId)>>,
    failing: Mutex<HashSet<RoleId>>,
    grant_calls: Mutex<Vec<(CommunityId, MemberId, RoleId)>>,
}

impl FakeRoleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn give(&self, community: CommunityId, member: MemberId, role: RoleId) {
        lock(&self.held).insert((community, member, role));
    }

    pub fn fail_role(&self, role: RoleId) {
        lock(&self.failing).insert(role);
    }

    pub fn heal_role(&self, role: RoleId) {
        lock(&self.failing).remove(&role);
    }

    pub fn holds(&self, community: CommunityId, member: MemberId, role: RoleId) -> bool {
        lock(&self.held).contains(&(community, member, role))
    }

    pub fn grant_calls(&self) -> Vec<(CommunityId, MemberId, RoleId)> {
        lock(&self.grant_calls).clone()
    }
}

#[async_trait]
impl RoleGrantExecutor for FakeRoleExecutor {
    async fn has_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<bool, SideEffectError> {
        Ok(self.holds(community, member, role))
    }

    async fn grant_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<(), SideEffectError> {
        lock(&self.grant_calls).push((community, member, role));
        if lock(&self.failing).contains(&role) {
            return Err(SideEffectError::Status(403));
        }
        self.give(community, member, role);
        Ok(())
    }
}

/// Records announcements instead of sending them.
#[derive(Default)]
pub struct FakeAnnouncer {
    sent: Mutex<Vec<(ChannelId, String)>>,
    failing: Mutex<bool>,
}

impl FakeAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl AnnouncementSink for FakeAnnouncer {
    async fn send(
        &self,
        _community: CommunityId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), SideEffectError> {
        if *lock(&self.failing) {
            return Err(SideEffectError::Request("connection reset".to_string()));
        }
        lock(&self.sent).push((channel, text.to_string()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
