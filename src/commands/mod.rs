pub mod character;
pub mod chat;
pub mod clear;
pub mod history;
pub mod stats;
pub mod status;

use anyhow::Result;
use serde::Serialize;

use crate::companion::audit;
use crate::companion::config::{CompanionConfig, load_config};
use crate::companion::ledger::{ConversationLedger, JsonFileStore};
use crate::companion::lock::SessionLock;
use crate::companion::paths::{CompanionPaths, resolve_paths};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    /// Set when the command wrote its own document to stdout; the report
    /// is then rendered on stderr.
    #[serde(skip)]
    pub stdout_claimed: bool,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            stdout_claimed: false,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Resolved paths and effective configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub paths: CompanionPaths,
    pub config: CompanionConfig,
}

impl Workspace {
    pub fn load() -> Result<Self> {
        let paths = resolve_paths()?;
        let config = load_config(&paths.config_file)?;
        Ok(Self { paths, config })
    }

    /// Open the session ledger. With persistence on, the transcript file is
    /// locked for as long as the returned guard lives.
    pub fn open_ledger(&self) -> Result<(ConversationLedger, Option<SessionLock>)> {
        let max_rounds = self.config.history.max_rounds;
        if !self.config.history.persist {
            return Ok((ConversationLedger::new(max_rounds), None));
        }

        let history_file = self.paths.history_file(&self.config.history.file);
        let lock = SessionLock::acquire(&history_file)?;
        let (ledger, load) =
            ConversationLedger::with_store(max_rounds, Box::new(JsonFileStore::new(&history_file)));

        if load.fell_back {
            audit::record(
                &self.paths,
                ledger.session_id(),
                "ledger",
                "load-fallback",
                &format!("started empty; could not load {}", history_file.display()),
            );
        }
        if load.trimmed > 0 {
            audit::record(
                &self.paths,
                ledger.session_id(),
                "ledger",
                "trimmed-on-load",
                &format!(
                    "removed {} old messages to fit max_rounds={max_rounds}",
                    load.trimmed
                ),
            );
        }
        Ok((ledger, Some(lock)))
    }
}
