//! Snowflake identifiers.
//!
//! Every id the chat platform hands us is a 64-bit snowflake. Each kind gets
//! its own newtype so a role id can never be passed where a member id is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }

            /// SQLite integers are signed; snowflakes are stored bit-for-bit.
            pub(crate) fn to_sql(self) -> i64 {
                self.0 as i64
            }

            pub(crate) fn from_sql(raw: i64) -> Self {
                Self(raw as u64)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake!(
    /// A community (guild) the bot is installed in.
    CommunityId
);
snowflake!(
    /// A member of a community.
    MemberId
);
snowflake!(
    /// A role that can be granted to members.
    RoleId
);
snowflake!(
    /// A text or voice channel, or a channel category.
    ChannelId
);
