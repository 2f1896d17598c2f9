//! Snapshot claim reconciler
//!
//! One-time bridge from the legacy leaderboard: a member claims the entry
//! recorded under their display name (or username) and their live total is
//! replaced by the imported one. First claim wins.

use crate::error::{LevelingError, Result};
use crate::ids::{CommunityId, MemberId};
use crate::ledger::{Ledger, LegacySnapshotEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What a successful claim did to the member's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub entry_name: String,
    pub previous_total: u64,
    pub total_xp: u64,
    pub level: u32,
}

/// Lookup key for legacy names. Matching is case-insensitive but otherwise
/// exact, so surrounding whitespace is significant.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Unclaimed entries and re-claims by the same member pass.
pub fn check_claimable(entry: &LegacySnapshotEntry, member: MemberId) -> Result<()> {
    match entry.claimed_by {
        Some(owner) if owner != member => Err(LevelingError::AlreadyClaimed),
        _ => Ok(()),
    }
}

pub struct SnapshotClaimReconciler {
    ledger: Arc<Ledger>,
}

impl SnapshotClaimReconciler {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Try `candidate_names` in order (display name first, then username).
    pub async fn claim(
        &self,
        community: CommunityId,
        member: MemberId,
        candidate_names: &[String],
    ) -> Result<ClaimReceipt> {
        let mut candidates: Vec<String> = Vec::new();
        for name in candidate_names {
            if name.trim().is_empty() {
                continue;
            }
            if !candidates.iter().any(|c| name_key(c) == name_key(name)) {
                candidates.push(name.clone());
            }
        }
        if candidates.is_empty() {
            return Err(LevelingError::NotFound);
        }

        match self.ledger.claim_snapshot(community, member, candidates).await {
            Ok(receipt) => {
                info!(
                    "Legacy entry '{}' claimed by {} in {}: {} -> {} XP (level {})",
                    receipt.entry_name,
                    member,
                    community,
                    receipt.previous_total,
                    receipt.total_xp,
                    receipt.level
                );
                Ok(receipt)
            }
            Err(e) => {
                if e.is_user_correctable() {
                    info!("Claim by {} in {} refused: {}", member, community, e.code());
                } else {
                    warn!("Claim by {} in {} failed: {}", member, community, e);
                }
                Err(e)
            }
        }
    }
}
