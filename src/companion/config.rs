use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::companion::extractor::DEFAULT_MAX_SPAN_BYTES;
use crate::error::CompanionError;

include!(concat!(env!("OUT_DIR"), "/companion_env_allowlist.rs"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai/".to_string(),
            model: "gemini-1.5-pro".to_string(),
            temperature: 0.9,
            top_p: 0.8,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_rounds: usize,
    pub persist: bool,
    pub file: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_rounds: 30,
            persist: true,
            file: "conversation_history.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub replay_fragment_chars: usize,
    pub max_span_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            replay_fragment_chars: 50,
            max_span_bytes: DEFAULT_MAX_SPAN_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompanionConfig {
    pub upstream: UpstreamConfig,
    pub history: HistoryConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCompanionConfig {
    upstream: Option<UpstreamConfig>,
    history: Option<HistoryConfig>,
    stream: Option<StreamConfig>,
}

fn env_first(vars: &[&str]) -> Option<String> {
    vars.iter().find_map(|var| match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    })
}

fn env_or_f64(var: &str, fallback: f64) -> f64 {
    env_first(&[var])
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(fallback)
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    env_first(&[var])
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn env_or_usize_first(vars: &[&str], fallback: usize) -> usize {
    vars.iter()
        .find_map(|var| env_first(&[*var]).and_then(|v| v.parse::<usize>().ok()))
        .unwrap_or(fallback)
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env_first(&[var]).as_deref() {
        Some("1" | "true" | "TRUE" | "yes" | "on") => true,
        Some("0" | "false" | "FALSE" | "no" | "off") => false,
        _ => fallback,
    }
}

fn env_or_string_first(vars: &[&str], fallback: &str) -> String {
    env_first(vars).unwrap_or_else(|| fallback.to_string())
}

fn invalid(msg: &str) -> Result<()> {
    Err(CompanionError::InvalidConfig(msg.to_string()).into())
}

pub fn validate(cfg: &CompanionConfig) -> Result<()> {
    if cfg.upstream.base_url.trim().is_empty() {
        return invalid("upstream base_url cannot be empty");
    }
    if cfg.upstream.model.trim().is_empty() {
        return invalid("upstream model cannot be empty");
    }
    if !(0.0..=2.0).contains(&cfg.upstream.temperature) {
        return invalid("temperature must lie in [0, 2]");
    }
    if !(cfg.upstream.top_p > 0.0 && cfg.upstream.top_p <= 1.0) {
        return invalid("top_p must lie in (0, 1]");
    }
    if cfg.upstream.request_timeout_secs == 0 {
        return invalid("request timeout must be >= 1 second");
    }
    if cfg.history.max_rounds == 0 {
        return invalid("history max_rounds must be >= 1");
    }
    if cfg.history.file.trim().is_empty() {
        return invalid("history file cannot be empty");
    }
    if cfg.stream.replay_fragment_chars == 0 {
        return invalid("replay fragment size must be >= 1 char");
    }
    if cfg.stream.max_span_bytes < 1024 {
        return invalid("max_span_bytes must be >= 1024");
    }
    Ok(())
}

fn merge_file_config(base: &mut CompanionConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialCompanionConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse companion config {}: {err}", path.display()))?;
    if let Some(upstream) = parsed.upstream {
        base.upstream = upstream;
    }
    if let Some(history) = parsed.history {
        base.history = history;
    }
    if let Some(stream) = parsed.stream {
        base.stream = stream;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut CompanionConfig) {
    cfg.upstream.base_url = env_or_string_first(
        &["COMPANION_BASE_URL", "GEMINI_OPENAI_BASE_URL"],
        &cfg.upstream.base_url,
    );
    cfg.upstream.model =
        env_or_string_first(&["COMPANION_MODEL", "GEMINI_MODEL"], &cfg.upstream.model);
    cfg.upstream.temperature = env_or_f64("COMPANION_TEMPERATURE", cfg.upstream.temperature);
    cfg.upstream.top_p = env_or_f64("COMPANION_TOP_P", cfg.upstream.top_p);
    cfg.upstream.request_timeout_secs = env_or_u64(
        "COMPANION_REQUEST_TIMEOUT_SECS",
        cfg.upstream.request_timeout_secs,
    );
    cfg.history.max_rounds = env_or_usize_first(
        &["COMPANION_MAX_ROUNDS", "MAX_CONVERSATION_ROUNDS"],
        cfg.history.max_rounds,
    );
    cfg.history.persist = env_or_bool("COMPANION_PERSIST", cfg.history.persist);
    cfg.history.file = env_or_string_first(
        &["COMPANION_HISTORY_FILE", "CONVERSATION_HISTORY_FILE"],
        &cfg.history.file,
    );
    cfg.stream.replay_fragment_chars = env_or_usize_first(
        &["COMPANION_STREAM_CHUNK_SIZE", "STREAM_CHUNK_SIZE"],
        cfg.stream.replay_fragment_chars,
    );
    cfg.stream.max_span_bytes =
        env_or_usize_first(&["COMPANION_MAX_SPAN_BYTES"], cfg.stream.max_span_bytes);
}

pub fn load_config(config_file: &Path) -> Result<CompanionConfig> {
    let mut cfg = CompanionConfig::default();
    merge_file_config(&mut cfg, config_file)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

pub fn resolve_api_key() -> Option<String> {
    env_first(&["COMPANION_API_KEY", "GEMINI_API_KEY"])
}

/// `COMPANION_*` variables present in the environment that nothing reads.
pub fn unknown_env_keys() -> Vec<String> {
    let mut unknown: Vec<String> = env::vars_os()
        .filter_map(|(key, _)| key.into_string().ok())
        .filter(|key| key.starts_with("COMPANION_"))
        .filter(|key| !GENERATED_COMPANION_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect();
    unknown.sort();
    unknown
}
