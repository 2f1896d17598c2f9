//! Legacy leaderboard snapshot (imported once from the previous bot).

use super::accounts::{ensure_row, write_total};
use super::{level_from_sql, xp_from_sql, xp_to_sql, Ledger};
use crate::claim::{check_claimable, name_key, ClaimReceipt};
use crate::error::{LevelingError, Result};
use crate::ids::{CommunityId, MemberId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One imported legacy record. `claimed_by` is set at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySnapshotEntry {
    pub name: String,
    pub xp: u64,
    pub level: u32,
    pub claimed_by: Option<MemberId>,
}

/// Import row. Accepts the `username` field of leaderboard exports too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEntryInput {
    #[serde(alias = "username")]
    pub name: String,
    pub xp: u64,
    #[serde(default)]
    pub level: u32,
}

impl Ledger {
    /// Upsert entries by case-insensitive name. Existing claims are kept.
    /// Returns the number of rows written.
    pub async fn import_snapshot(
        &self,
        community: CommunityId,
        entries: Vec<LegacyEntryInput>,
    ) -> Result<usize> {
        self.run(move |conn, _| {
            let tx = conn.transaction()?;
            let mut written = 0;
            for entry in &entries {
                if entry.name.trim().is_empty() {
                    continue;
                }
                let key = name_key(&entry.name);
                written += tx.execute(
                    "INSERT INTO legacy_snapshot (community_id, name_key, name, xp, level)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(community_id, name_key) DO UPDATE SET
                        name = excluded.name, xp = excluded.xp, level = excluded.level",
                    params![
                        community.to_sql(),
                        key,
                        entry.name,
                        xp_to_sql(entry.xp),
                        i64::from(entry.level)
                    ],
                )?;
            }
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    pub async fn snapshot_entry(
        &self,
        community: CommunityId,
        name: &str,
    ) -> Result<Option<LegacySnapshotEntry>> {
        let key = name_key(name);
        self.run(move |conn, _| Ok(find_entry(conn, community, &key)?))
            .await
    }

    /// Bind the first matching entry to `member` and overwrite the member's
    /// total with the imported XP, in one transaction.
    pub async fn claim_snapshot(
        &self,
        community: CommunityId,
        member: MemberId,
        candidates: Vec<String>,
    ) -> Result<ClaimReceipt> {
        self.run(move |conn, curve| {
            let tx = conn.transaction()?;

            let mut matched = None;
            for candidate in &candidates {
                if let Some(entry) = find_entry(&tx, community, &name_key(candidate))? {
                    matched = Some(entry);
                    break;
                }
            }
            let entry = matched.ok_or(LevelingError::NotFound)?;
            check_claimable(&entry, member)?;

            tx.execute(
                "UPDATE legacy_snapshot SET claimed_by = ?3
                 WHERE community_id = ?1 AND name_key = ?2
                   AND (claimed_by IS NULL OR claimed_by = ?3)",
                params![community.to_sql(), name_key(&entry.name), member.to_sql()],
            )?;

            ensure_row(&tx, community, member)?;
            let outcome = write_total(&tx, curve, community, member, entry.xp)?;
            tx.commit()?;

            Ok(ClaimReceipt {
                entry_name: entry.name,
                previous_total: outcome.old_total,
                total_xp: outcome.new_total,
                level: outcome.new_level,
            })
        })
        .await
    }
}

fn find_entry(
    conn: &Connection,
    community: CommunityId,
    key: &str,
) -> rusqlite::Result<Option<LegacySnapshotEntry>> {
    conn.query_row(
        "SELECT name, xp, level, claimed_by FROM legacy_snapshot
         WHERE community_id = ?1 AND name_key = ?2",
        params![community.to_sql(), key],
        |row| {
            let claimed_by: Option<i64> = row.get(3)?;
            Ok(LegacySnapshotEntry {
                name: row.get(0)?,
                xp: xp_from_sql(row.get(1)?),
                level: level_from_sql(row.get(2)?),
                claimed_by: claimed_by.map(MemberId::from_sql),
            })
        },
    )
    .optional()
}
