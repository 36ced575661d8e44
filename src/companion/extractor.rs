//! Incremental recovery of chunk records from a fragmented model stream.
//!
//! The model is asked to answer with JSON, either one `{"conversation": [...]}`
//! document or a series of bare chunk objects. Fragments arrive with arbitrary
//! boundaries, so the extractor keeps a buffer plus the lexical state of the
//! scan (brace depth, string and escape flags) between calls and decodes each
//! top-level `{ ... }` span the moment its closing brace arrives.

use serde_json::Value;

use crate::companion::chunk::{ChunkRecord, WireChunk};
use crate::companion::warn::{self, Diagnostic};
use crate::error::{CompanionError, DiagCode};

pub const DEFAULT_MAX_SPAN_BYTES: usize = 256 * 1024;

#[derive(Debug)]
pub struct StreamExtractor {
    session_id: String,
    max_span_bytes: usize,
    buffer: String,
    /// Byte offset in `buffer` up to which the lexical state is current.
    cursor: usize,
    depth: usize,
    span_start: Option<usize>,
    in_string: bool,
    escaped: bool,
    next_index: u64,
    dropped: usize,
}

impl Default for StreamExtractor {
    fn default() -> Self {
        Self::new("", DEFAULT_MAX_SPAN_BYTES)
    }
}

impl StreamExtractor {
    pub fn new(session_id: impl Into<String>, max_span_bytes: usize) -> Self {
        Self {
            session_id: session_id.into(),
            max_span_bytes,
            buffer: String::new(),
            cursor: 0,
            depth: 0,
            span_start: None,
            in_string: false,
            escaped: false,
            next_index: 0,
            dropped: 0,
        }
    }

    /// Spans and records discarded over the lifetime of this extractor.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Append `fragment` and return every record whose span closed because of it.
    pub fn feed(&mut self, fragment: &str) -> Vec<ChunkRecord> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(fragment);
        self.scan()
    }

    /// Flush the stream: decode whatever the final fragment closed, drop any
    /// unterminated remainder and reset for the next model turn.
    pub fn finish(&mut self) -> Vec<ChunkRecord> {
        self.buffer.push('\n');
        let records = self.scan();

        if let Some(start) = self.span_start {
            let residual = self.buffer[start..].trim();
            if !residual.is_empty() {
                self.dropped += 1;
                self.warn(
                    DiagCode::E104UnterminatedSpan,
                    "discard",
                    "stream ended inside an object",
                    &format!("{} bytes buffered", residual.len()),
                );
            }
        }

        self.buffer.clear();
        self.reset_lexer();
        self.next_index = 0;
        records
    }

    fn reset_lexer(&mut self) {
        self.cursor = 0;
        self.depth = 0;
        self.span_start = None;
        self.in_string = false;
        self.escaped = false;
    }

    fn scan(&mut self) -> Vec<ChunkRecord> {
        let mut closed: Vec<(usize, usize)> = Vec::new();
        let bytes = self.buffer.as_bytes();

        // Structural characters are all ASCII, so a byte scan never lands
        // inside a multi-byte code point.
        for (offset, &byte) in bytes.iter().enumerate().skip(self.cursor) {
            if self.depth == 0 {
                if byte == b'{' {
                    self.span_start = Some(offset);
                    self.depth = 1;
                }
                continue;
            }
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0
                        && let Some(start) = self.span_start.take()
                    {
                        closed.push((start, offset + 1));
                    }
                }
                _ => {}
            }
        }

        let mut records = Vec::new();
        for (start, end) in closed {
            let outcome = decode_span(&self.buffer[start..end], &mut self.next_index);
            self.collect(outcome, &mut records);
        }

        // Everything before the open span, or the whole buffer when no span
        // is open, has been fully consumed.
        let keep_from = self.span_start.unwrap_or(self.buffer.len());
        self.buffer.drain(..keep_from);
        self.cursor = self.buffer.len();
        if self.span_start.is_some() {
            self.span_start = Some(0);
        }

        if self.span_start.is_some() && self.buffer.len() > self.max_span_bytes {
            self.dropped += 1;
            self.warn(
                DiagCode::E103SpanOverflow,
                "discard",
                "open object exceeded max_span_bytes",
                &format!("{} > {}", self.buffer.len(), self.max_span_bytes),
            );
            // Stop buffering but keep the lexical state, so the rest of the
            // abandoned object is skipped rather than rescanned from depth 0.
            self.buffer.clear();
            self.cursor = 0;
            self.span_start = None;
        }

        records
    }

    fn collect(
        &mut self,
        outcome: Result<Vec<Result<ChunkRecord, CompanionError>>, CompanionError>,
        records: &mut Vec<ChunkRecord>,
    ) {
        let items = match outcome {
            Ok(items) => items,
            Err(err) => {
                self.dropped += 1;
                self.warn(
                    DiagCode::E101MalformedSpan,
                    "drop",
                    "closed span is not a chunk document",
                    &err.to_string(),
                );
                return;
            }
        };
        for item in items {
            match item {
                Ok(record) => records.push(record),
                Err(err) => {
                    self.dropped += 1;
                    self.warn(
                        DiagCode::E102InvalidRecord,
                        "drop",
                        "chunk failed validation",
                        &err.to_string(),
                    );
                }
            }
        }
    }

    fn warn(&self, code: DiagCode, action: &str, reason: &str, err: &str) {
        warn::emit(Diagnostic {
            code,
            stage: "extract",
            action,
            session: &self.session_id,
            reason,
            err,
        });
    }
}

/// Decode one closed span. The outer error rejects the whole span; inner
/// errors reject single records of a `conversation` array.
fn decode_span(
    span: &str,
    next_index: &mut u64,
) -> Result<Vec<Result<ChunkRecord, CompanionError>>, CompanionError> {
    let mut value: Value =
        serde_json::from_str(span).map_err(|err| CompanionError::MalformedSpan(err.to_string()))?;

    let items = match value
        .as_object_mut()
        .and_then(|fields| fields.remove("conversation"))
    {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(CompanionError::MalformedSpan(format!(
                "`conversation` must be an array, got {other}"
            )));
        }
        None => vec![value],
    };

    Ok(items
        .into_iter()
        .map(|item| {
            let wire: WireChunk = serde_json::from_value(item)
                .map_err(|err| CompanionError::InvalidRecord(err.to_string()))?;
            let record = wire.into_record(*next_index);
            *next_index += 1;
            Ok(record)
        })
        .collect())
}
