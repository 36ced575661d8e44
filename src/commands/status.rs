use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::companion::config::{load_config, resolve_api_key, unknown_env_keys};
use crate::companion::lock::lock_path_for;
use crate::companion::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("config_file={}", paths.config_file.display()));
    report.detail(format!("character_file={}", paths.character_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));

    match load_config(&paths.config_file) {
        Ok(cfg) => {
            let history_file = paths.history_file(&cfg.history.file);
            report.detail(format!("history_file={}", history_file.display()));
            report.detail(format!("history.persist={}", cfg.history.persist));
            report.detail(format!("history.max_rounds={}", cfg.history.max_rounds));
            report.detail(format!("upstream.base_url={}", cfg.upstream.base_url));
            report.detail(format!("upstream.model={}", cfg.upstream.model));
            report.detail(format!(
                "upstream.sampling=temperature:{} top_p:{}",
                cfg.upstream.temperature, cfg.upstream.top_p
            ));
            report.detail(format!(
                "stream.replay_fragment_chars={}",
                cfg.stream.replay_fragment_chars
            ));
            report.detail(format!("stream.max_span_bytes={}", cfg.stream.max_span_bytes));
            if lock_path_for(&history_file).exists() {
                report.detail("history_lock=present");
            }
        }
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }

    let replay_set = env::var("COMPANION_REPLAY_FILE").is_ok_and(|v| !v.trim().is_empty());
    if resolve_api_key().is_some() {
        report.detail("api_key=set");
    } else if replay_set {
        report.detail("api_key=unset (replay mode)");
    } else {
        report.issue("missing API key; set COMPANION_API_KEY or GEMINI_API_KEY");
    }

    for key in unknown_env_keys() {
        report.issue(format!("unknown environment variable {key}"));
    }

    Ok(report)
}
