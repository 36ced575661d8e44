use anyhow::Result;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::commands::clear::clear_ledger;
use crate::commands::stats::stats_lines;
use crate::commands::{CommandReport, Workspace};
use crate::companion::audit;
use crate::companion::character::Character;
use crate::companion::chunk::ChunkRecord;
use crate::companion::config::resolve_api_key;
use crate::companion::session::ChatSession;
use crate::companion::upstream::{OpenAiCompatUpstream, ReplayUpstream, Upstream};

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub message: Option<String>,
    pub replay: Option<PathBuf>,
    /// The report goes to stdout as JSON, so chunks are shown on stderr.
    pub json: bool,
}

fn show(json: bool, line: &str) {
    if json {
        eprintln!("{line}");
    } else {
        println!("{line}");
        let _ = io::stdout().flush();
    }
}

pub fn render_chunk(record: &ChunkRecord) -> String {
    let mut line = record.text.clone();
    if let Some(emotion) = record.emotion {
        line.push_str(&format!(
            "  [emotion: {} ({:.2})]",
            emotion.kind(),
            emotion.intensity()
        ));
    }
    if let Some(state) = record.state {
        line.push_str(&format!("  [state: {}]", state.kind()));
    }
    line
}

fn build_upstream(ws: &Workspace, opts: &ChatOptions) -> Result<Box<dyn Upstream>, String> {
    let replay = opts.replay.clone().or_else(|| match env::var("COMPANION_REPLAY_FILE") {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    });
    if let Some(path) = replay {
        return Ok(Box::new(ReplayUpstream {
            path,
            fragment_chars: ws.config.stream.replay_fragment_chars,
        }));
    }

    let Some(api_key) = resolve_api_key() else {
        return Err("missing API key; set COMPANION_API_KEY or GEMINI_API_KEY".to_string());
    };
    Ok(Box::new(OpenAiCompatUpstream::from_config(
        &ws.config.upstream,
        api_key,
    )))
}

fn submit_one(
    ws: &Workspace,
    session: &mut ChatSession,
    upstream: &dyn Upstream,
    message: &str,
    json: bool,
    report: &mut CommandReport,
) {
    let result = session.submit(upstream, message, |record| {
        show(json, &render_chunk(record));
    });

    match result {
        Ok(outcome) => {
            if outcome.evicted > 0 {
                audit::record(
                    &ws.paths,
                    session.ledger().session_id(),
                    "ledger",
                    "evicted",
                    &format!(
                        "removed {} old messages to maintain window size",
                        outcome.evicted
                    ),
                );
            }
            report.detail(format!(
                "records={} dropped={} evicted={}",
                outcome.records, outcome.dropped, outcome.evicted
            ));
        }
        Err(err) => report.issue(format!("submit failed: {err:#}")),
    }
}

fn interactive(
    ws: &Workspace,
    session: &mut ChatSession,
    upstream: &dyn Upstream,
    json: bool,
    report: &mut CommandReport,
) -> Result<()> {
    let stdin = io::stdin();
    let name = session.character().name.clone();
    eprintln!("chatting with {name}; /stats, /clear, /quit");

    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/stats" => {
                let minutes = session.duration_minutes();
                for row in stats_lines(&session.ledger().stats(), Some(minutes)) {
                    show(json, &row);
                }
            }
            "/clear" => {
                let removed = clear_ledger(ws, session.ledger_mut());
                show(json, &format!("cleared {removed} messages"));
            }
            message => submit_one(ws, session, upstream, message, json, report),
        }
    }
    Ok(())
}

pub fn run(opts: &ChatOptions) -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("chat");

    let upstream = match build_upstream(&ws, opts) {
        Ok(upstream) => upstream,
        Err(issue) => {
            report.issue(issue);
            return Ok(report);
        }
    };
    let character = Character::load_or_default(&ws.paths.character_file)?;
    let (ledger, _lock) = ws.open_ledger()?;
    let mut session = ChatSession::new(ledger, character, ws.config.stream.max_span_bytes);

    report.detail(format!("session_id={}", session.ledger().session_id()));
    report.detail(format!("upstream={}", upstream.label()));

    match opts.message.as_deref() {
        Some(message) => submit_one(
            &ws,
            &mut session,
            upstream.as_ref(),
            message,
            opts.json,
            &mut report,
        ),
        None => interactive(&ws, &mut session, upstream.as_ref(), opts.json, &mut report)?,
    }

    let stats = session.ledger().stats();
    report.detail(format!(
        "rounds={}/{} total_messages={} duration_minutes={}",
        stats.user_count,
        stats.max_rounds,
        stats.total,
        session.duration_minutes()
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::render_chunk;
    use crate::companion::chunk::{ChunkRecord, Emotion, EmotionKind, State, StateKind};

    #[test]
    fn render_chunk_annotates_emotion_and_state() {
        let record = ChunkRecord {
            index: 0,
            text: "hi".to_string(),
            emotion: Some(Emotion::new(EmotionKind::Joy, 0.8).expect("emotion")),
            state: Some(State::new(StateKind::Serenity)),
        };
        assert_eq!(
            render_chunk(&record),
            "hi  [emotion: Joy (0.80)]  [state: Serenity]"
        );
    }

    #[test]
    fn render_chunk_plain_text() {
        let record = ChunkRecord {
            index: 3,
            text: "plain".to_string(),
            emotion: None,
            state: None,
        };
        assert_eq!(render_chunk(&record), "plain");
    }
}
