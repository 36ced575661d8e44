//! Size-bounded conversation transcript with best-effort persistence.
//!
//! Retention is measured in rounds: every user turn opens a round, and the
//! assistant turns that follow it belong to that round until the next user
//! turn. When the number of rounds exceeds `max_rounds`, whole leading rounds
//! are evicted together.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::companion::chunk::{ChunkRecord, Emotion, State};
use crate::companion::util::new_session_id;
use crate::companion::warn::{self, Diagnostic};
use crate::error::DiagCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub emotion: Option<Emotion>,
    #[serde(default)]
    pub state: Option<State>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Local::now(),
            emotion: None,
            state: None,
        }
    }

    pub fn assistant(chunk: &ChunkRecord) -> Self {
        Self {
            role: Role::Assistant,
            content: chunk.text.clone(),
            timestamp: Local::now(),
            emotion: chunk.emotion,
            state: chunk.state,
        }
    }
}

/// Role/content pair handed to the upstream model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub session_id: String,
    pub total: usize,
    pub user_count: usize,
    pub assistant_count: usize,
    pub max_rounds: usize,
}

/// On-disk document: `{"messages": [...], "max_rounds": n, "session_id": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub messages: Vec<Turn>,
    pub max_rounds: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

pub trait TranscriptStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<LedgerSnapshot>>;
    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()>;
    fn describe(&self) -> String;
}

/// Whole-document JSON file, rewritten atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TranscriptStore for JsonFileStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let parsed: LedgerSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(parsed))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let data = serde_json::to_string_pretty(snapshot)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to stage write in {}", parent.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())
            .with_context(|| format!("failed to write {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct ConversationLedger {
    session_id: String,
    max_rounds: usize,
    turns: Vec<Turn>,
    store: Option<Box<dyn TranscriptStore>>,
}

impl std::fmt::Debug for ConversationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLedger")
            .field("session_id", &self.session_id)
            .field("max_rounds", &self.max_rounds)
            .field("turns", &self.turns.len())
            .field("store", &self.store.as_ref().map(|s| s.describe()))
            .finish()
    }
}

/// Result of constructing a ledger from a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub restored: usize,
    pub trimmed: usize,
    pub fell_back: bool,
}

impl ConversationLedger {
    /// In-memory ledger with a fresh session id.
    pub fn new(max_rounds: usize) -> Self {
        Self {
            session_id: new_session_id(),
            max_rounds,
            turns: Vec::new(),
            store: None,
        }
    }

    /// Ledger backed by `store`. Any load failure leaves an empty, usable
    /// transcript; a snapshot saved under a larger window is trimmed at once.
    pub fn with_store(max_rounds: usize, store: Box<dyn TranscriptStore>) -> (Self, LoadReport) {
        let mut ledger = Self::new(max_rounds);
        let mut report = LoadReport::default();

        match store.load() {
            Ok(Some(snapshot)) => {
                if let Some(id) = snapshot.session_id.filter(|id| !id.trim().is_empty()) {
                    ledger.session_id = id;
                }
                report.restored = snapshot.messages.len();
                ledger.turns = snapshot.messages;
            }
            Ok(None) => {}
            Err(err) => {
                report.fell_back = true;
                warn::emit(Diagnostic {
                    code: DiagCode::E201LoadFailed,
                    stage: "ledger",
                    action: "start-empty",
                    session: &ledger.session_id,
                    reason: &store.describe(),
                    err: &format!("{err:#}"),
                });
            }
        }

        ledger.store = Some(store);
        report.trimmed = ledger.enforce_window();
        if report.trimmed > 0 {
            ledger.persist();
        }
        (ledger, report)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append a turn, evicting leading rounds when a user turn overflows the
    /// window. Returns the number of turns evicted.
    pub fn append(&mut self, turn: Turn) -> usize {
        let is_user = turn.role == Role::User;
        self.turns.push(turn);
        let evicted = if is_user { self.enforce_window() } else { 0 };
        self.persist();
        evicted
    }

    pub fn context(&self) -> Vec<ContextMessage> {
        self.turns
            .iter()
            .map(|turn| ContextMessage {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }

    /// Drop every turn, keeping the session id. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.turns.len();
        self.turns.clear();
        self.persist();
        removed
    }

    pub fn stats(&self) -> LedgerStats {
        let user_count = self.count_role(Role::User);
        LedgerStats {
            session_id: self.session_id.clone(),
            total: self.turns.len(),
            user_count,
            assistant_count: self.turns.len() - user_count,
            max_rounds: self.max_rounds,
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            messages: self.turns.clone(),
            max_rounds: self.max_rounds,
            session_id: Some(self.session_id.clone()),
        }
    }

    fn count_role(&self, role: Role) -> usize {
        self.turns.iter().filter(|turn| turn.role == role).count()
    }

    /// Cut the transcript at the first user turn that is allowed to stay.
    fn enforce_window(&mut self) -> usize {
        let user_count = self.count_role(Role::User);
        if user_count <= self.max_rounds {
            return 0;
        }
        let excess = user_count - self.max_rounds;
        let cut = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| turn.role == Role::User)
            .nth(excess)
            .map(|(idx, _)| idx)
            .unwrap_or(self.turns.len());
        self.turns.drain(..cut);
        cut
    }

    fn persist(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(err) = store.save(&self.snapshot()) {
            warn::emit(Diagnostic {
                code: DiagCode::E202SaveFailed,
                stage: "ledger",
                action: "keep-in-memory",
                session: &self.session_id,
                reason: &store.describe(),
                err: &format!("{err:#}"),
            });
        }
    }
}
