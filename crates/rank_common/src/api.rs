//! Request and response types of the rankd HTTP API, shared with rankctl.

use crate::curve::LevelProgress;
use crate::ids::{CommunityId, MemberId, RoleId};
use crate::ledger::{LegacyEntryInput, XpAccount};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 100;
pub const MAX_LEADERBOARD_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRankResponse {
    pub account: XpAccount,
    pub progress: LevelProgress,
    pub rank: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u64,
    pub member: MemberId,
    pub total_xp: u64,
    pub level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub community: CommunityId,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub member: MemberId,
    /// Display name first, then username
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotImportRequest {
    pub entries: Vec<LegacyEntryInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotImportResponse {
    pub imported: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindRoleRequest {
    pub level: u32,
    pub role: RoleId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub voice_members: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

/// Legacy leaderboard file: a bare list, or an export with a `players` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SnapshotFile {
    List(Vec<LegacyEntryInput>),
    Export { players: Vec<LegacyEntryInput> },
}

impl SnapshotFile {
    pub fn into_entries(self) -> Vec<LegacyEntryInput> {
        match self {
            SnapshotFile::List(entries) => entries,
            SnapshotFile::Export { players } => players,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_file_shapes() {
        let list: SnapshotFile =
            serde_json::from_str(r#"[{"name": "Bob", "xp": 500, "level": 3}]"#).unwrap();
        assert_eq!(list.into_entries().len(), 1);

        let export: SnapshotFile = serde_json::from_str(
            r#"{"players": [{"username": "Bob", "xp": 500, "level": 3, "avatar": "x"},
                            {"username": "Ann", "xp": 20}]}"#,
        )
        .unwrap();
        let entries = export.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "Ann");
        assert_eq!(entries[1].level, 0);
    }
}
