//! Command-line argument parsing

use clap::{Parser, Subcommand};
use rank_common::{CommunityId, MemberId, RoleId};
use std::path::PathBuf;

/// Rank daemon control
#[derive(Parser, Debug)]
#[command(name = "rankctl")]
#[command(about = "Query and administer the rank daemon", long_about = None)]
#[command(version)]
pub struct Cli {
    /// rankd base URL
    #[arg(long, global = true, env = "RANKD_URL", default_value = "http://127.0.0.1:7866")]
    pub url: String,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a member's level, progress and rank
    Rank {
        community: CommunityId,
        member: MemberId,
    },

    /// Show the leaderboard
    Top {
        community: CommunityId,
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },

    /// Claim a legacy leaderboard entry for a member
    Claim {
        community: CommunityId,
        member: MemberId,
        /// Candidate names, tried in order
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Import a legacy leaderboard JSON file
    Import {
        community: CommunityId,
        file: PathBuf,
    },

    /// Manage level roles
    Roles {
        #[command(subcommand)]
        action: RolesCommands,
    },

    /// Check that the daemon is up
    Health,
}

#[derive(Subcommand, Debug)]
pub enum RolesCommands {
    /// List level role bindings
    List { community: CommunityId },

    /// Bind a role to a level
    Add {
        community: CommunityId,
        level: u32,
        role: RoleId,
    },

    /// Remove a role binding
    Remove {
        community: CommunityId,
        role: RoleId,
    },
}
