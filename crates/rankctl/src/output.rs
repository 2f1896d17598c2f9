//! Human-readable output

use owo_colors::OwoColorize;
use rank_common::api::{LeaderboardResponse, MemberRankResponse};
use rank_common::ledger::LevelRoleBinding;
use rank_common::ClaimReceipt;

const BAR_WIDTH: usize = 20;

/// Progress bar for `into` out of `needed`.
pub fn progress_bar(into: u64, needed: u64) -> String {
    let filled = if needed == 0 {
        BAR_WIDTH
    } else {
        ((into.min(needed) as u128 * BAR_WIDTH as u128) / needed as u128) as usize
    };
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

pub fn format_rank(rank: &MemberRankResponse) -> String {
    let progress = &rank.progress;
    format!(
        "{} {}\n  Level {}  ·  {} XP total  ·  rank #{}\n  {} {}/{} XP to level {}",
        "Member".bold(),
        rank.account.member.to_string().cyan(),
        progress.level.to_string().green().bold(),
        rank.account.total_xp,
        rank.rank,
        progress_bar(progress.xp_into_level, progress.xp_needed_for_level),
        progress.xp_into_level,
        progress.xp_needed_for_level,
        progress.level.saturating_add(1),
    )
}

pub fn format_leaderboard(board: &LeaderboardResponse) -> String {
    if board.entries.is_empty() {
        return format!("No ranked members in {}", board.community);
    }
    let mut lines = vec![format!("{} {}", "Leaderboard".bold(), board.community.to_string().cyan())];
    for entry in &board.entries {
        let rank = format!("#{:<4}", entry.rank);
        let rank = if entry.rank <= 3 {
            rank.yellow().bold().to_string()
        } else {
            rank.dimmed().to_string()
        };
        lines.push(format!(
            "  {} {:<20} level {:>3}  {:>10} XP",
            rank,
            entry.member.to_string(),
            entry.level,
            entry.total_xp
        ));
    }
    lines.join("\n")
}

pub fn format_claim(receipt: &ClaimReceipt) -> String {
    format!(
        "{} Claimed '{}': {} XP, level {} (was {} XP)",
        "✓".green(),
        receipt.entry_name,
        receipt.total_xp,
        receipt.level,
        receipt.previous_total
    )
}

pub fn format_roles(bindings: &[LevelRoleBinding]) -> String {
    if bindings.is_empty() {
        return "No level roles configured".to_string();
    }
    bindings
        .iter()
        .map(|b| format!("  level {:>3}  →  role {}", b.level, b.role.to_string().cyan()))
        .collect::<Vec<_>>()
        .join("\n")
}
