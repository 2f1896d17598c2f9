//! Level-role bindings.

use super::{level_from_sql, Ledger};
use crate::error::Result;
use crate::ids::{CommunityId, RoleId};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// A member at `level` or above is entitled to `role`. Bindings are
/// cumulative; a role is bound to at most one threshold per community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRoleBinding {
    pub community: CommunityId,
    pub level: u32,
    pub role: RoleId,
}

impl Ledger {
    /// Bind `role` to `level`, moving it if it was bound elsewhere.
    pub async fn bind_role(&self, community: CommunityId, level: u32, role: RoleId) -> Result<()> {
        self.run(move |conn, _| {
            conn.execute(
                "INSERT INTO level_roles (community_id, level, role_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT(community_id, role_id) DO UPDATE SET level = excluded.level",
                params![community.to_sql(), i64::from(level), role.to_sql()],
            )?;
            Ok(())
        })
        .await
    }

    /// Returns whether a binding was removed.
    pub async fn unbind_role(&self, community: CommunityId, role: RoleId) -> Result<bool> {
        self.run(move |conn, _| {
            let removed = conn.execute(
                "DELETE FROM level_roles WHERE community_id = ?1 AND role_id = ?2",
                params![community.to_sql(), role.to_sql()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    pub async fn role_bindings(&self, community: CommunityId) -> Result<Vec<LevelRoleBinding>> {
        self.run(move |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT level, role_id FROM level_roles
                 WHERE community_id = ?1 ORDER BY level ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![community.to_sql()], |row| {
                Ok(LevelRoleBinding {
                    community,
                    level: level_from_sql(row.get(0)?),
                    role: RoleId::from_sql(row.get(1)?),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Every role whose threshold is at or below `level`.
    pub async fn roles_up_to(&self, community: CommunityId, level: u32) -> Result<Vec<RoleId>> {
        self.run(move |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT role_id FROM level_roles
                 WHERE community_id = ?1 AND level <= ?2
                 ORDER BY level ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![community.to_sql(), i64::from(level)], |row| {
                Ok(RoleId::from_sql(row.get(0)?))
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_ledger;
    use super::*;

    const GUILD: CommunityId = CommunityId(7);

    #[tokio::test]
    async fn test_roles_up_to_is_cumulative() {
        let (_dir, ledger) = temp_ledger().await;
        ledger.bind_role(GUILD, 0, RoleId(1)).await.unwrap();
        ledger.bind_role(GUILD, 5, RoleId(2)).await.unwrap();
        ledger.bind_role(GUILD, 10, RoleId(3)).await.unwrap();

        assert_eq!(ledger.roles_up_to(GUILD, 0).await.unwrap(), vec![RoleId(1)]);
        assert_eq!(
            ledger.roles_up_to(GUILD, 7).await.unwrap(),
            vec![RoleId(1), RoleId(2)]
        );
        assert_eq!(ledger.roles_up_to(GUILD, 10).await.unwrap().len(), 3);
        assert!(ledger.roles_up_to(CommunityId(8), 99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebinding_moves_threshold() {
        let (_dir, ledger) = temp_ledger().await;
        ledger.bind_role(GUILD, 5, RoleId(2)).await.unwrap();
        ledger.bind_role(GUILD, 15, RoleId(2)).await.unwrap();

        let bindings = ledger.role_bindings(GUILD).await.unwrap();
        assert_eq!(
            bindings,
            vec![LevelRoleBinding {
                community: GUILD,
                level: 15,
                role: RoleId(2),
            }]
        );
        assert!(ledger.roles_up_to(GUILD, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unbind() {
        let (_dir, ledger) = temp_ledger().await;
        ledger.bind_role(GUILD, 3, RoleId(4)).await.unwrap();
        assert!(ledger.unbind_role(GUILD, RoleId(4)).await.unwrap());
        assert!(!ledger.unbind_role(GUILD, RoleId(4)).await.unwrap());
        assert!(ledger.role_bindings(GUILD).await.unwrap().is_empty());
    }
}
