//! Error types for the leveling core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LevelingError {
    #[error("No legacy leaderboard entry matches that name. Check the spelling and try again.")]
    NotFound,

    #[error("That legacy leaderboard entry has already been claimed by another member.")]
    AlreadyClaimed,

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid level curve: {0}")]
    InvalidCurve(String),

    #[error("Database location unavailable: {0}")]
    Location(String),
}

impl LevelingError {
    /// Persistence failures. The triggering activity event counts as not
    /// awarded; redelivery upstream is the retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LevelingError::Store(_) | LevelingError::Worker(_) | LevelingError::Io(_)
        )
    }

    /// Failures the member can fix themselves (claim target typos etc).
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, LevelingError::NotFound | LevelingError::AlreadyClaimed)
    }

    pub fn code(&self) -> &'static str {
        match self {
            LevelingError::NotFound => "not_found",
            LevelingError::AlreadyClaimed => "already_claimed",
            LevelingError::Store(_) | LevelingError::Worker(_) | LevelingError::Io(_) => {
                "store_unavailable"
            }
            LevelingError::InvalidCurve(_) => "invalid_curve",
            LevelingError::Location(_) => "location_unavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, LevelingError>;

/// Failure of a best-effort side effect (role grant, announcement).
///
/// Never unwinds the XP write that triggered it.
#[derive(Error, Debug)]
pub enum SideEffectError {
    #[error("Bridge request failed: {0}")]
    Request(String),

    #[error("Bridge answered with status {0}")]
    Status(u16),

    #[error("Side effect unavailable: {0}")]
    Unavailable(String),
}

impl SideEffectError {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffectError::Request(_) => "request",
            SideEffectError::Status(_) => "status",
            SideEffectError::Unavailable(_) => "unavailable",
        }
    }
}
