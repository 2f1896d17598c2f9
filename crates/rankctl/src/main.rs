//! rankctl - control client for rankd

mod cli;
mod client;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, RolesCommands};
use client::RankdClient;
use owo_colors::OwoColorize;
use rank_common::api::SnapshotFile;
use serde::Serialize;
use std::fs;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = RankdClient::new(&cli.url)?;
    let json = cli.json;

    match cli.command {
        Commands::Rank { community, member } => {
            let rank = client.member(community, member).await?;
            emit(json, &rank, output::format_rank)?;
        }
        Commands::Top { community, limit } => {
            let board = client.leaderboard(community, limit).await?;
            emit(json, &board, output::format_leaderboard)?;
        }
        Commands::Claim {
            community,
            member,
            names,
        } => {
            let receipt = client.claim(community, member, names).await?;
            emit(json, &receipt, output::format_claim)?;
        }
        Commands::Import { community, file } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let snapshot: SnapshotFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let result = client.import(community, snapshot.into_entries()).await?;
            emit(json, &result, |r| {
                format!("{} Imported {} legacy entries", "✓".green(), r.imported)
            })?;
        }
        Commands::Roles { action } => match action {
            RolesCommands::List { community } => {
                let bindings = client.roles(community).await?;
                emit(json, &bindings, |b| output::format_roles(b))?;
            }
            RolesCommands::Add {
                community,
                level,
                role,
            } => {
                let bindings = client.bind_role(community, level, role).await?;
                emit(json, &bindings, |b| output::format_roles(b))?;
            }
            RolesCommands::Remove { community, role } => {
                client.unbind_role(community, role).await?;
                if !json {
                    println!("{} Removed role {}", "✓".green(), role);
                }
            }
        },
        Commands::Health => {
            let health = client.health().await?;
            emit(json, &health, |h| {
                format!(
                    "{} rankd v{} up {}s, {} in voice",
                    "●".green(),
                    h.version,
                    h.uptime_seconds,
                    h.voice_members
                )
            })?;
        }
    }

    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl Fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human(value));
    }
    Ok(())
}
