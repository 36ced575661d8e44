use crate::companion::paths::CompanionPaths;
use crate::companion::util::now_epoch_secs;
use crate::companion::warn::{self, Diagnostic};
use crate::error::DiagCode;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub session_id: String,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(
    paths: &CompanionPaths,
    session_id: &str,
    phase: &str,
    status: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        session_id: session_id.to_string(),
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.audit_log();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Like [`append_event`], but a failed write is only warned about.
pub fn record(paths: &CompanionPaths, session_id: &str, phase: &str, status: &str, message: &str) {
    if let Err(err) = append_event(paths, session_id, phase, status, message) {
        warn::emit(Diagnostic {
            code: DiagCode::E203AuditFailed,
            stage: phase,
            action: "skip-audit",
            session: session_id,
            reason: status,
            err: &format!("{err:#}"),
        });
    }
}
