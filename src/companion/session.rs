//! One conversation session: the ledger, the extractor and the character,
//! owned together and driven sequentially by [`ChatSession::submit`].

use anyhow::{Result, bail};
use chrono::{DateTime, Local};

use crate::companion::character::Character;
use crate::companion::chunk::ChunkRecord;
use crate::companion::extractor::StreamExtractor;
use crate::companion::ledger::{ConversationLedger, Turn};
use crate::companion::upstream::Upstream;
use crate::companion::warn::{self, Diagnostic};
use crate::error::DiagCode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub records: usize,
    pub dropped: usize,
    pub evicted: usize,
}

#[derive(Debug)]
pub struct ChatSession {
    ledger: ConversationLedger,
    extractor: StreamExtractor,
    character: Character,
    started_at: DateTime<Local>,
}

impl ChatSession {
    pub fn new(ledger: ConversationLedger, character: Character, max_span_bytes: usize) -> Self {
        let extractor = StreamExtractor::new(ledger.session_id(), max_span_bytes);
        Self {
            ledger,
            extractor,
            character,
            started_at: Local::now(),
        }
    }

    pub fn ledger(&self) -> &ConversationLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut ConversationLedger {
        &mut self.ledger
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    /// Whole minutes since this session was opened.
    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes_at(Local::now())
    }

    fn duration_minutes_at(&self, now: DateTime<Local>) -> i64 {
        (now - self.started_at).num_minutes().max(0)
    }

    /// Relay one user utterance and drain the reply stream to completion.
    ///
    /// Every record is appended to the ledger before `on_chunk` sees it. If
    /// the stream aborts, buffered output is still flushed and kept, then the
    /// stream error is returned.
    pub fn submit<U, F>(
        &mut self,
        upstream: &U,
        utterance: &str,
        mut on_chunk: F,
    ) -> Result<SubmitOutcome>
    where
        U: Upstream + ?Sized,
        F: FnMut(&ChunkRecord),
    {
        if utterance.trim().is_empty() {
            bail!("utterance cannot be empty");
        }

        let mut outcome = SubmitOutcome {
            evicted: self.ledger.append(Turn::user(utterance)),
            ..SubmitOutcome::default()
        };
        let dropped_before = self.extractor.dropped();

        let context = self.ledger.context();
        let system_prompt = self.character.system_prompt();
        let fragments = upstream.open(&system_prompt, &context)?;

        let mut aborted = None;
        for fragment in fragments {
            match fragment {
                Ok(fragment) => {
                    let records = self.extractor.feed(&fragment);
                    self.deliver(records, &mut outcome, &mut on_chunk);
                }
                Err(err) => {
                    aborted = Some(err);
                    break;
                }
            }
        }

        let records = self.extractor.finish();
        self.deliver(records, &mut outcome, &mut on_chunk);
        outcome.dropped = self.extractor.dropped() - dropped_before;

        if let Some(err) = aborted {
            warn::emit(Diagnostic {
                code: DiagCode::E301UpstreamAbort,
                stage: "stream",
                action: "flush-and-keep",
                session: self.ledger.session_id(),
                reason: &upstream.label(),
                err: &format!("{err:#}"),
            });
            return Err(err.context(format!(
                "reply stream aborted after {} chunk(s)",
                outcome.records
            )));
        }
        Ok(outcome)
    }

    fn deliver<F>(&mut self, records: Vec<ChunkRecord>, outcome: &mut SubmitOutcome, on_chunk: &mut F)
    where
        F: FnMut(&ChunkRecord),
    {
        for record in records {
            outcome.evicted += self.ledger.append(Turn::assistant(&record));
            outcome.records += 1;
            on_chunk(&record);
        }
    }
}
