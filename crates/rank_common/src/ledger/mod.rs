//! XP ledger
//!
//! SQLite-backed persistence for accounts, level-role bindings and the
//! legacy leaderboard snapshot. [`Ledger`] owns the only connection to the
//! datastore; nothing else in the workspace touches storage.
//!
//! Every operation runs on the blocking pool and holds the connection lock
//! for its whole read-modify-write, inside a transaction. That serializes
//! writers per account (in fact globally), so concurrent awards never lose
//! an increment and a failed write leaves the account as it was.

mod accounts;
mod roles;
mod snapshot;

pub use accounts::{AddOutcome, CooldownSlot, XpAccount};
pub use roles::LevelRoleBinding;
pub use snapshot::{LegacyEntryInput, LegacySnapshotEntry};

use crate::curve::LevelCurve;
use crate::error::{LevelingError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA_VERSION: u32 = 1;

/// Database location
#[derive(Debug, Clone)]
pub enum DbLocation {
    /// $XDG_DATA_HOME/rank/ledger.db or ~/.local/share/rank/ledger.db
    Default,
    /// Explicit path (config file, tests)
    Custom(PathBuf),
}

impl DbLocation {
    pub fn path(&self) -> Result<PathBuf> {
        match self {
            DbLocation::Default => {
                let base_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
                    PathBuf::from(xdg_data)
                } else if let Ok(home) = std::env::var("HOME") {
                    PathBuf::from(home).join(".local/share")
                } else {
                    return Err(LevelingError::Location(
                        "neither XDG_DATA_HOME nor HOME is set".to_string(),
                    ));
                };
                Ok(base_dir.join("rank").join("ledger.db"))
            }
            DbLocation::Custom(path) => Ok(path.clone()),
        }
    }
}

/// The ledger service object
pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
    curve: LevelCurve,
    path: PathBuf,
}

impl Ledger {
    /// Open or create the ledger database.
    pub async fn open(location: DbLocation, curve: LevelCurve) -> Result<Self> {
        let db_path = location.path()?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        info!("Opening ledger database at: {}", db_path.display());

        let open_path = db_path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let mut conn = Connection::open(&open_path)?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("Ledger journal mode: {}", mode);
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            initialize_schema(&conn)?;
            sync_curve(&mut conn, &curve)?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            curve,
            path: db_path,
        })
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on the blocking pool with exclusive access to the connection.
    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection, &LevelCurve) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let curve = self.curve;
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn, &curve)
        })
        .await?
    }
}

fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS xp_accounts (
            community_id INTEGER NOT NULL,
            member_id INTEGER NOT NULL,
            total_xp INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 0,
            last_message_award_at INTEGER NOT NULL DEFAULT 0,
            last_reaction_award_at INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (community_id, member_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_leaderboard
         ON xp_accounts(community_id, total_xp DESC)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS level_roles (
            community_id INTEGER NOT NULL,
            level INTEGER NOT NULL,
            role_id INTEGER NOT NULL,
            PRIMARY KEY (community_id, role_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS legacy_snapshot (
            community_id INTEGER NOT NULL,
            name_key TEXT NOT NULL,
            name TEXT NOT NULL,
            xp INTEGER NOT NULL,
            level INTEGER NOT NULL,
            claimed_by INTEGER,
            PRIMARY KEY (community_id, name_key)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;

    debug!("Ledger schema v{} ready", SCHEMA_VERSION);
    Ok(())
}

fn curve_signature(curve: &LevelCurve) -> String {
    format!("{}/{}/{}", curve.base(), curve.quad(), curve.linear())
}

/// Cached levels are only valid for the curve that wrote them. When the
/// configured curve differs from the recorded one, re-derive every level
/// from its total before anything reads them.
fn sync_curve(conn: &mut Connection, curve: &LevelCurve) -> rusqlite::Result<()> {
    let signature = curve_signature(curve);
    let recorded: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'curve'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if recorded.as_deref() == Some(signature.as_str()) {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let mut changed = 0usize;
    {
        let mut select = tx.prepare("SELECT rowid, total_xp, level FROM xp_accounts")?;
        let rows = select
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut update = tx.prepare("UPDATE xp_accounts SET level = ?2 WHERE rowid = ?1")?;
        for (rowid, total, stored) in rows {
            let level = curve.level_from_total(xp_from_sql(total));
            if i64::from(level) != stored {
                update.execute(params![rowid, i64::from(level)])?;
                changed += 1;
            }
        }
    }
    tx.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('curve', ?1)",
        params![signature],
    )?;
    tx.commit()?;

    match recorded {
        Some(previous) => info!(
            "Level curve changed from {} to {}, re-derived {} account levels",
            previous, signature, changed
        ),
        None => debug!("Recorded level curve {} ({} levels adjusted)", signature, changed),
    }
    Ok(())
}

/// XP totals are u64 in memory; SQLite integers are i64. Clamp on the way in.
pub(crate) fn xp_to_sql(xp: u64) -> i64 {
    i64::try_from(xp).unwrap_or(i64::MAX)
}

pub(crate) fn xp_from_sql(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

pub(crate) fn level_from_sql(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}
