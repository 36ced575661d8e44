use anyhow::Result;

use crate::commands::{CommandReport, Workspace};
use crate::companion::ledger::LedgerStats;

/// `duration_minutes` is only known inside a live chat session.
pub fn stats_lines(stats: &LedgerStats, duration_minutes: Option<i64>) -> Vec<String> {
    let mut lines = vec![
        format!("session_id={}", stats.session_id),
        format!("rounds={}/{}", stats.user_count, stats.max_rounds),
        format!(
            "total_messages={} user={} assistant={}",
            stats.total, stats.user_count, stats.assistant_count
        ),
    ];
    if let Some(minutes) = duration_minutes {
        lines.push(format!("duration_minutes={minutes}"));
    }
    lines
}

pub fn run() -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("stats");
    let (ledger, _lock) = ws.open_ledger()?;
    for line in stats_lines(&ledger.stats(), None) {
        report.detail(line);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_lines_show_round_budget() {
        let stats = LedgerStats {
            session_id: "0badc0de".to_string(),
            total: 5,
            user_count: 2,
            assistant_count: 3,
            max_rounds: 30,
        };
        let lines = stats_lines(&stats, None);
        assert_eq!(lines[0], "session_id=0badc0de");
        assert_eq!(lines[1], "rounds=2/30");
        assert_eq!(lines[2], "total_messages=5 user=2 assistant=3");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn stats_lines_include_session_duration_when_known() {
        let stats = LedgerStats {
            session_id: "0badc0de".to_string(),
            total: 0,
            user_count: 0,
            assistant_count: 0,
            max_rounds: 30,
        };
        let lines = stats_lines(&stats, Some(12));
        assert_eq!(lines.last().map(String::as_str), Some("duration_minutes=12"));
    }
}
