use anyhow::Result;

use crate::commands::{CommandReport, Workspace};
use crate::companion::audit;
use crate::companion::ledger::ConversationLedger;

/// Clear the transcript and record it in the audit log.
pub fn clear_ledger(ws: &Workspace, ledger: &mut ConversationLedger) -> usize {
    let removed = ledger.clear();
    audit::record(
        &ws.paths,
        ledger.session_id(),
        "ledger",
        "cleared",
        &format!("cleared {removed} messages"),
    );
    removed
}

pub fn run() -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("clear");
    let (mut ledger, _lock) = ws.open_ledger()?;

    let removed = clear_ledger(&ws, &mut ledger);
    report.detail(format!("session_id={}", ledger.session_id()));
    report.detail(format!("cleared={removed}"));
    if !ws.config.history.persist {
        report.detail("persistence disabled; nothing stored to clear");
    }
    Ok(report)
}
