//! Upstream model boundary. An upstream turns a role/content transcript plus
//! a system prompt into a stream of raw text fragments whose boundaries carry
//! no meaning.

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use crate::companion::config::UpstreamConfig;
use crate::companion::ledger::ContextMessage;
use crate::companion::warn::{self, Diagnostic};
use crate::error::{CompanionError, DiagCode};

/// Fragments in arrival order; an `Err` item means the stream was cut short.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String>>>;

pub trait Upstream {
    fn label(&self) -> String;
    fn open(&self, system_prompt: &str, messages: &[ContextMessage]) -> Result<FragmentStream>;
}

pub struct OpenAiCompatUpstream {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout: Duration,
}

impl OpenAiCompatUpstream {
    pub fn from_config(cfg: &UpstreamConfig, api_key: String) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            timeout: Duration::from_secs(cfg.request_timeout_secs),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn build_payload(
    model: &str,
    temperature: f64,
    top_p: f64,
    system_prompt: &str,
    messages: &[ContextMessage],
) -> Value {
    let mut api_messages = vec![json!({"role": "system", "content": system_prompt})];
    api_messages.extend(
        messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content})),
    );
    json!({
        "model": model,
        "messages": api_messages,
        "temperature": temperature,
        "top_p": top_p,
        "stream": true
    })
}

impl Upstream for OpenAiCompatUpstream {
    fn label(&self) -> String {
        format!("openai-compatible:{}", self.model)
    }

    fn open(&self, system_prompt: &str, messages: &[ContextMessage]) -> Result<FragmentStream> {
        let payload = build_payload(
            &self.model,
            self.temperature,
            self.top_p,
            system_prompt,
            messages,
        );
        let url = self.endpoint();

        let client = Client::builder().timeout(self.timeout).build()?;
        let response = client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .with_context(|| format!("failed to reach {url}"))?;
        if !response.status().is_success() {
            return Err(CompanionError::UpstreamStatus(response.status().as_u16()).into());
        }

        Ok(Box::new(SseFragments::new(BufReader::new(response))))
    }
}

/// `data:` payload of one server-sent-event line, if it has one.
fn extract_sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();
    if data.is_empty() { None } else { Some(data) }
}

fn delta_content(event: &Value) -> Option<String> {
    event
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Chat-completions event stream decoded into content fragments.
pub struct SseFragments<R> {
    reader: R,
    line: String,
    done: bool,
}

impl<R: BufRead> SseFragments<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(anyhow!(err).context("upstream stream read failed")));
                }
            }
            let Some(data) = extract_sse_data(&self.line) else {
                continue;
            };
            if data == "[DONE]" {
                self.done = true;
                break;
            }

            let event: Value = match serde_json::from_str(data) {
                Ok(event) => event,
                Err(err) => {
                    warn::emit(Diagnostic {
                        code: DiagCode::E302UpstreamEvent,
                        stage: "upstream",
                        action: "skip-event",
                        session: "",
                        reason: "event payload is not json",
                        err: &err.to_string(),
                    });
                    continue;
                }
            };
            if let Some(error) = event.get("error") {
                self.done = true;
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| error.to_string());
                return Some(Err(anyhow!("upstream reported error: {message}")));
            }
            if let Some(content) = delta_content(&event) {
                return Some(Ok(content));
            }
        }
        None
    }
}

/// Re-streams a recorded reply in fixed-size character fragments.
pub struct ReplayUpstream {
    pub path: PathBuf,
    pub fragment_chars: usize,
}

fn split_fragments(text: &str, fragment_chars: usize) -> Vec<String> {
    let size = fragment_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

impl Upstream for ReplayUpstream {
    fn label(&self) -> String {
        format!("replay:{}", self.path.display())
    }

    fn open(&self, _system_prompt: &str, _messages: &[ContextMessage]) -> Result<FragmentStream> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read replay {}", self.path.display()))?;
        let fragments = split_fragments(&text, self.fragment_chars);
        Ok(Box::new(fragments.into_iter().map(Ok::<String, anyhow::Error>)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::ledger::Role;
    use std::io::{Cursor, Read};
    use tempfile::tempdir;

    fn collect_ok(body: &str) -> Vec<String> {
        SseFragments::new(Cursor::new(body.to_string()))
            .map(|item| item.expect("fragment"))
            .collect()
    }

    #[test]
    fn sse_yields_delta_content_until_done() {
        let body = concat!(
            ": keep-alive\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"text\\\":\"}}]}\n\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"\\\"hi\\\"}\"}}]}\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            "data: not json\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n",
        );
        assert_eq!(collect_ok(body), vec!["{\"text\":", "\"hi\"}", ""]);
    }

    #[test]
    fn sse_without_done_ends_at_eof() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}";
        assert_eq!(collect_ok(body), vec!["a"]);
    }

    #[test]
    fn sse_error_event_aborts() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"error\":{\"message\":\"quota exceeded\"}}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        );
        let items: Vec<Result<String>> = SseFragments::new(Cursor::new(body)).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().expect("first"), "a");
        let err = items[1].as_ref().expect_err("abort");
        assert!(err.to_string().contains("quota exceeded"));
    }

    struct BrokenReader {
        served: bool,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                ));
            }
            self.served = true;
            let line = b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        }
    }

    #[test]
    fn read_error_surfaces_as_err_item() {
        let reader = BufReader::new(BrokenReader { served: false });
        let items: Vec<Result<String>> = SseFragments::new(reader).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn payload_prepends_system_prompt() {
        let payload = build_payload(
            "m",
            0.9,
            0.8,
            "be nice",
            &[ContextMessage {
                role: Role::User,
                content: "hello".to_string(),
            }],
        );
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], "be nice");
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["messages"][1]["content"], "hello");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let upstream = OpenAiCompatUpstream::from_config(&UpstreamConfig::default(), "k".into());
        assert_eq!(
            upstream.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn replay_splits_on_char_boundaries() {
        assert_eq!(split_fragments("あいうえお", 2), vec!["あい", "うえ", "お"]);
        assert!(split_fragments("", 3).is_empty());

        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("reply.txt");
        fs::write(&path, "{\"text\":\"hi\"}").expect("write");
        let upstream = ReplayUpstream {
            path,
            fragment_chars: 4,
        };
        let joined: String = upstream
            .open("", &[])
            .expect("open")
            .map(|f| f.expect("fragment"))
            .collect();
        assert_eq!(joined, "{\"text\":\"hi\"}");
    }
}
