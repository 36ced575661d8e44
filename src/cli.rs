use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "companion",
    version,
    about = "Chat with a roleplay character over a streaming LLM endpoint"
)]
struct Cli {
    /// Render the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one message, or chat interactively over stdin.
    Chat {
        #[arg(short, long)]
        message: Option<String>,
        /// Stream a recorded reply from this file instead of calling the model.
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    /// List the persisted transcript.
    History {
        /// Print the full snapshot document.
        #[arg(long)]
        export: bool,
    },
    /// Show session statistics.
    Stats,
    /// Clear the persisted transcript, keeping the session id.
    Clear,
    /// Print the character system prompt.
    Character,
    /// Show resolved paths and configuration.
    Status,
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    let mut lines = Vec::new();
    if json {
        lines.push(serde_json::to_string_pretty(report)?);
    } else {
        lines.extend(report.details.iter().cloned());
    }
    for line in lines {
        if report.stdout_claimed {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
    if !json {
        for issue in &report.issues {
            eprintln!("issue: {issue}");
        }
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = match cli.command {
        Command::Chat { message, replay } => commands::chat::run(&commands::chat::ChatOptions {
            message,
            replay,
            json: cli.json,
        })?,
        Command::History { export } => {
            commands::history::run(&commands::history::HistoryOptions { export })?
        }
        Command::Stats => commands::stats::run()?,
        Command::Clear => commands::clear::run()?,
        Command::Character => commands::character::run()?,
        Command::Status => commands::status::run()?,
    };

    render(&report, cli.json)?;
    if !report.ok {
        bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
