//! Account rows: totals, derived level and cooldown timestamps.

use super::{level_from_sql, xp_from_sql, xp_to_sql, Ledger};
use crate::award::is_cooling_down;
use crate::curve::LevelCurve;
use crate::error::Result;
use crate::ids::{CommunityId, MemberId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Per (community, member) XP record.
///
/// `level` is always `curve.level_from_total(total_xp)`; it is cached in the
/// row for leaderboard queries and written together with the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAccount {
    pub community: CommunityId,
    pub member: MemberId,
    pub total_xp: u64,
    pub level: u32,
    /// Milliseconds since epoch, 0 = never awarded
    pub last_message_award_at: i64,
    pub last_reaction_award_at: i64,
}

/// Before/after view of one ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    pub old_level: u32,
    pub new_level: u32,
    pub old_total: u64,
    pub new_total: u64,
}

impl AddOutcome {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// Sources whose awards are cooldown-gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownSlot {
    Message,
    Reaction,
}

impl CooldownSlot {
    fn column(self) -> &'static str {
        match self {
            CooldownSlot::Message => "last_message_award_at",
            CooldownSlot::Reaction => "last_reaction_award_at",
        }
    }
}

impl Ledger {
    /// Create a zeroed account if absent. Idempotent.
    pub async fn ensure(&self, community: CommunityId, member: MemberId) -> Result<()> {
        self.run(move |conn, _| {
            ensure_row(conn, community, member)?;
            Ok(())
        })
        .await
    }

    /// Current account state; creates the account first if needed.
    pub async fn get(&self, community: CommunityId, member: MemberId) -> Result<XpAccount> {
        self.run(move |conn, _| {
            ensure_row(conn, community, member)?;
            Ok(load_account(conn, community, member)?)
        })
        .await
    }

    /// Add `delta` XP and recompute the level in one transaction.
    pub async fn add(
        &self,
        community: CommunityId,
        member: MemberId,
        delta: u64,
    ) -> Result<AddOutcome> {
        self.run(move |conn, curve| {
            let tx = conn.transaction()?;
            ensure_row(&tx, community, member)?;
            let outcome = apply_delta(&tx, curve, community, member, delta)?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    /// Overwrite the total. Only the snapshot claim path uses this.
    pub async fn set_total(
        &self,
        community: CommunityId,
        member: MemberId,
        total: u64,
    ) -> Result<AddOutcome> {
        self.run(move |conn, curve| {
            let tx = conn.transaction()?;
            ensure_row(&tx, community, member)?;
            let outcome = write_total(&tx, curve, community, member, total)?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    /// Record the last award time for a cooldown-gated source.
    pub async fn touch_cooldown(
        &self,
        community: CommunityId,
        member: MemberId,
        slot: CooldownSlot,
        at_ms: i64,
    ) -> Result<()> {
        self.run(move |conn, _| {
            let tx = conn.transaction()?;
            ensure_row(&tx, community, member)?;
            stamp_cooldown(&tx, community, member, slot, at_ms)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Cooldown check, add and cooldown stamp as one atomic step.
    ///
    /// Returns `None` when the account is still cooling down for `slot`; in
    /// that case nothing is written. With no slot the grant is ungated.
    pub async fn try_award(
        &self,
        community: CommunityId,
        member: MemberId,
        slot: Option<CooldownSlot>,
        now_ms: i64,
        cooldown_secs: u64,
        amount: u64,
    ) -> Result<Option<AddOutcome>> {
        self.run(move |conn, curve| {
            let tx = conn.transaction()?;
            ensure_row(&tx, community, member)?;
            let account = load_account(&tx, community, member)?;

            if let Some(slot) = slot {
                let last = match slot {
                    CooldownSlot::Message => account.last_message_award_at,
                    CooldownSlot::Reaction => account.last_reaction_award_at,
                };
                if is_cooling_down(last, now_ms, cooldown_secs) {
                    return Ok(None);
                }
            }

            let outcome = apply_delta(&tx, curve, community, member, amount)?;
            if let Some(slot) = slot {
                stamp_cooldown(&tx, community, member, slot, now_ms)?;
            }
            tx.commit()?;
            Ok(Some(outcome))
        })
        .await
    }

    /// Leaderboard: highest total first, ties in row insertion order.
    pub async fn top_accounts(&self, community: CommunityId, limit: usize) -> Result<Vec<XpAccount>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT community_id, member_id, total_xp, level,
                        last_message_award_at, last_reaction_award_at
                 FROM xp_accounts
                 WHERE community_id = ?1
                 ORDER BY total_xp DESC, rowid ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![community.to_sql(), limit], row_to_account)?;
            let accounts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(accounts)
        })
        .await
    }

    /// 1-based leaderboard position, consistent with [`Ledger::top_accounts`].
    pub async fn rank_of(&self, community: CommunityId, member: MemberId) -> Result<u64> {
        self.run(move |conn, _| {
            ensure_row(conn, community, member)?;
            let ahead: i64 = conn.query_row(
                "SELECT COUNT(*) FROM xp_accounts AS other, xp_accounts AS me
                 WHERE me.community_id = ?1 AND me.member_id = ?2
                   AND other.community_id = ?1
                   AND (other.total_xp > me.total_xp
                        OR (other.total_xp = me.total_xp AND other.rowid < me.rowid))",
                params![community.to_sql(), member.to_sql()],
                |row| row.get(0),
            )?;
            Ok(xp_from_sql(ahead) + 1)
        })
        .await
    }

    pub async fn account_count(&self, community: CommunityId) -> Result<u64> {
        self.run(move |conn, _| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM xp_accounts WHERE community_id = ?1",
                params![community.to_sql()],
                |row| row.get(0),
            )?;
            Ok(xp_from_sql(count))
        })
        .await
    }
}

pub(super) fn ensure_row(
    conn: &Connection,
    community: CommunityId,
    member: MemberId,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO xp_accounts (community_id, member_id) VALUES (?1, ?2)",
        params![community.to_sql(), member.to_sql()],
    )?;
    Ok(())
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<XpAccount> {
    Ok(XpAccount {
        community: CommunityId::from_sql(row.get(0)?),
        member: MemberId::from_sql(row.get(1)?),
        total_xp: xp_from_sql(row.get(2)?),
        level: level_from_sql(row.get(3)?),
        last_message_award_at: row.get(4)?,
        last_reaction_award_at: row.get(5)?,
    })
}

pub(super) fn load_account(
    conn: &Connection,
    community: CommunityId,
    member: MemberId,
) -> rusqlite::Result<XpAccount> {
    conn.query_row(
        "SELECT community_id, member_id, total_xp, level,
                last_message_award_at, last_reaction_award_at
         FROM xp_accounts WHERE community_id = ?1 AND member_id = ?2",
        params![community.to_sql(), member.to_sql()],
        row_to_account,
    )
}

fn current_total(
    conn: &Connection,
    community: CommunityId,
    member: MemberId,
) -> rusqlite::Result<u64> {
    let raw: Option<i64> = conn
        .query_row(
            "SELECT total_xp FROM xp_accounts WHERE community_id = ?1 AND member_id = ?2",
            params![community.to_sql(), member.to_sql()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.map(xp_from_sql).unwrap_or(0))
}

fn apply_delta(
    conn: &Connection,
    curve: &LevelCurve,
    community: CommunityId,
    member: MemberId,
    delta: u64,
) -> rusqlite::Result<AddOutcome> {
    let old_total = current_total(conn, community, member)?;
    write_total(conn, curve, community, member, old_total.saturating_add(delta))
}

/// The only place `total_xp` and `level` are written.
pub(super) fn write_total(
    conn: &Connection,
    curve: &LevelCurve,
    community: CommunityId,
    member: MemberId,
    new_total: u64,
) -> rusqlite::Result<AddOutcome> {
    let old_total = current_total(conn, community, member)?;
    let old_level = curve.level_from_total(old_total);
    let new_total = new_total.min(xp_from_sql(i64::MAX));
    let new_level = curve.level_from_total(new_total);

    conn.execute(
        "UPDATE xp_accounts SET total_xp = ?3, level = ?4
         WHERE community_id = ?1 AND member_id = ?2",
        params![
            community.to_sql(),
            member.to_sql(),
            xp_to_sql(new_total),
            i64::from(new_level)
        ],
    )?;

    Ok(AddOutcome {
        old_level,
        new_level,
        old_total,
        new_total,
    })
}

fn stamp_cooldown(
    conn: &Connection,
    community: CommunityId,
    member: MemberId,
    slot: CooldownSlot,
    at_ms: i64,
) -> rusqlite::Result<()> {
    let sql = format!(
        "UPDATE xp_accounts SET {} = ?3 WHERE community_id = ?1 AND member_id = ?2",
        slot.column()
    );
    conn.execute(&sql, params![community.to_sql(), member.to_sql(), at_ms])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_ledger;
    use super::*;
    use std::sync::Arc;

    const GUILD: CommunityId = CommunityId(100);
    const ALICE: MemberId = MemberId(1);
    const BOB: MemberId = MemberId(2);

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (_dir, ledger) = temp_ledger().await;
        ledger.ensure(GUILD, ALICE).await.unwrap();
        ledger.ensure(GUILD, ALICE).await.unwrap();

        assert_eq!(ledger.account_count(GUILD).await.unwrap(), 1);
        let account = ledger.get(GUILD, ALICE).await.unwrap();
        assert_eq!(account.total_xp, 0);
        assert_eq!(account.level, 0);
        assert_eq!(account.last_message_award_at, 0);
        assert_eq!(account.last_reaction_award_at, 0);
    }

    #[tokio::test]
    async fn test_get_creates_missing_account() {
        let (_dir, ledger) = temp_ledger().await;
        let account = ledger.get(GUILD, BOB).await.unwrap();
        assert_eq!(account.member, BOB);
        assert_eq!(ledger.account_count(GUILD).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_is_additive() {
        let (_dir, ledger) = temp_ledger().await;
        ledger.add(GUILD, ALICE, 30).await.unwrap();
        ledger.add(GUILD, ALICE, 70).await.unwrap();
        ledger.add(GUILD, BOB, 100).await.unwrap();

        let split = ledger.get(GUILD, ALICE).await.unwrap();
        let single = ledger.get(GUILD, BOB).await.unwrap();
        assert_eq!(split.total_xp, single.total_xp);
        assert_eq!(split.level, single.level);
        assert_eq!(split.level, 1);
    }

    #[tokio::test]
    async fn test_add_reports_level_up() {
        let (_dir, ledger) = temp_ledger().await;
        ledger.add(GUILD, ALICE, 95).await.unwrap();
        let outcome = ledger.add(GUILD, ALICE, 10).await.unwrap();
        assert_eq!(outcome.old_level, 0);
        assert_eq!(outcome.new_level, 1);
        assert_eq!(outcome.old_total, 95);
        assert_eq!(outcome.new_total, 105);
        assert!(outcome.leveled_up());
    }

    #[tokio::test]
    async fn test_concurrent_adds_lose_nothing() {
        let (_dir, ledger) = temp_ledger().await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.add(GUILD, ALICE, 10).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let account = ledger.get(GUILD, ALICE).await.unwrap();
        assert_eq!(account.total_xp, 500);
        assert_eq!(account.level, ledger.curve().level_from_total(500));
    }

    #[tokio::test]
    async fn test_set_total_overwrites() {
        let (_dir, ledger) = temp_ledger().await;
        ledger.add(GUILD, ALICE, 5_000).await.unwrap();
        let outcome = ledger.set_total(GUILD, ALICE, 500).await.unwrap();
        assert_eq!(outcome.old_total, 5_000);
        assert_eq!(outcome.new_total, 500);

        let account = ledger.get(GUILD, ALICE).await.unwrap();
        assert_eq!(account.total_xp, 500);
        assert_eq!(account.level, 2);
    }

    #[tokio::test]
    async fn test_touch_cooldown_is_independent_of_xp() {
        let (_dir, ledger) = temp_ledger().await;
        ledger
            .touch_cooldown(GUILD, ALICE, CooldownSlot::Reaction, 1_234)
            .await
            .unwrap();
        let account = ledger.get(GUILD, ALICE).await.unwrap();
        assert_eq!(account.total_xp, 0);
        assert_eq!(account.last_reaction_award_at, 1_234);
        assert_eq!(account.last_message_award_at, 0);
    }

    #[tokio::test]
    async fn test_try_award_declines_inside_cooldown() {
        let (_dir, ledger) = temp_ledger().await;
        let now = 10_000_000;
        ledger
            .touch_cooldown(GUILD, ALICE, CooldownSlot::Message, now - 30_000)
            .await
            .unwrap();

        let outcome = ledger
            .try_award(GUILD, ALICE, Some(CooldownSlot::Message), now, 60, 20)
            .await
            .unwrap();
        assert!(outcome.is_none());

        let account = ledger.get(GUILD, ALICE).await.unwrap();
        assert_eq!(account.total_xp, 0);
        assert_eq!(account.last_message_award_at, now - 30_000);
    }

    #[tokio::test]
    async fn test_try_award_grants_after_cooldown() {
        let (_dir, ledger) = temp_ledger().await;
        let now = 10_000_000;
        ledger
            .touch_cooldown(GUILD, ALICE, CooldownSlot::Message, now - 90_000)
            .await
            .unwrap();

        let outcome = ledger
            .try_award(GUILD, ALICE, Some(CooldownSlot::Message), now, 60, 20)
            .await
            .unwrap()
            .expect("award should be granted");
        assert_eq!(outcome.new_total, 20);

        let account = ledger.get(GUILD, ALICE).await.unwrap();
        assert_eq!(account.total_xp, 20);
        assert_eq!(account.last_message_award_at, now);
    }

    #[tokio::test]
    async fn test_try_award_duplicates_pass_once() {
        let (_dir, ledger) = temp_ledger().await;
        let ledger = Arc::new(ledger);
        let now = 50_000_000;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .try_award(GUILD, ALICE, Some(CooldownSlot::Message), now, 60, 15)
                    .await
                    .unwrap()
            }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
        assert_eq!(ledger.get(GUILD, ALICE).await.unwrap().total_xp, 15);
    }

    #[tokio::test]
    async fn test_ungated_award_ignores_cooldowns() {
        let (_dir, ledger) = temp_ledger().await;
        for _ in 0..3 {
            let outcome = ledger.try_award(GUILD, ALICE, None, 1, 60, 10).await.unwrap();
            assert!(outcome.is_some());
        }
        assert_eq!(ledger.get(GUILD, ALICE).await.unwrap().total_xp, 30);
    }

    #[tokio::test]
    async fn test_leaderboard_order_and_rank() {
        let (_dir, ledger) = temp_ledger().await;
        let carol = MemberId(3);
        ledger.add(GUILD, ALICE, 50).await.unwrap();
        ledger.add(GUILD, BOB, 300).await.unwrap();
        ledger.add(GUILD, carol, 50).await.unwrap();
        ledger.add(CommunityId(999), MemberId(9), 10_000).await.unwrap();

        let top = ledger.top_accounts(GUILD, 10).await.unwrap();
        let order: Vec<MemberId> = top.iter().map(|a| a.member).collect();
        assert_eq!(order, vec![BOB, ALICE, carol]);

        assert_eq!(ledger.rank_of(GUILD, BOB).await.unwrap(), 1);
        assert_eq!(ledger.rank_of(GUILD, ALICE).await.unwrap(), 2);
        assert_eq!(ledger.rank_of(GUILD, carol).await.unwrap(), 3);

        let limited = ledger.top_accounts(GUILD, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].member, BOB);
    }
}
