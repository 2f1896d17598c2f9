//! Rank common library - leveling core shared by rankd and rankctl.
//!
//! Holds the level curve, typed community settings, the SQLite ledger and the
//! award / level-up / claim pipeline the daemon drives. The request and
//! response types of the daemon's HTTP API live in [`api`].

pub mod api;
pub mod award;
pub mod claim;
pub mod curve;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod settings;

pub use award::{ActivitySource, AwardOutcome, AwardPolicy, LevelChange, LevelUp};
pub use claim::{ClaimReceipt, SnapshotClaimReconciler};
pub use curve::{LevelCurve, LevelProgress};
pub use dispatch::{AnnouncementSink, DispatchReport, LevelUpDispatcher, RoleGrantExecutor};
pub use engine::{Activity, LevelingEngine};
pub use error::{LevelingError, Result, SideEffectError};
pub use ids::{ChannelId, CommunityId, MemberId, RoleId};
pub use ledger::{DbLocation, Ledger};
pub use settings::{CommunitySettings, SettingsOverride, SettingsRegistry};

/// Crate version, reported by the daemon health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
