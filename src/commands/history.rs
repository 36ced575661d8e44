use anyhow::Result;

use crate::commands::{CommandReport, Workspace};
use crate::companion::ledger::Turn;
use crate::companion::util::truncate_with_ellipsis;

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    /// Print the whole snapshot document instead of a listing.
    pub export: bool,
}

pub fn history_line(position: usize, turn: &Turn) -> String {
    let mut line = format!(
        "{}. [{}] {}: {}",
        position,
        turn.timestamp.format("%H:%M:%S"),
        turn.role.as_str(),
        truncate_with_ellipsis(&turn.content, PREVIEW_CHARS)
    );
    if let Some(emotion) = turn.emotion {
        line.push_str(&format!(
            " (emotion: {} {:.2})",
            emotion.kind(),
            emotion.intensity()
        ));
    }
    if let Some(state) = turn.state {
        line.push_str(&format!(" (state: {})", state.kind()));
    }
    line
}

pub fn run(opts: &HistoryOptions) -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("history");
    let (ledger, _lock) = ws.open_ledger()?;

    if opts.export {
        // The snapshot is the whole output; nothing else may share stdout.
        println!("{}", serde_json::to_string_pretty(&ledger.snapshot())?);
        report.stdout_claimed = true;
        return Ok(report);
    }
    if ledger.turns().is_empty() {
        report.detail("no messages in current session");
    } else {
        for (idx, turn) in ledger.turns().iter().enumerate() {
            report.detail(history_line(idx + 1, turn));
        }
    }
    report.detail(format!("session_id={}", ledger.session_id()));
    Ok(report)
}
