use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const REPLY: &str = concat!(
    "Sure thing!\n",
    "{\"conversation\": [\n",
    "  {\"text\": \"Hi, {friend}!\", \"emotion\": {\"type\": \"Joy\", \"intensity\": 0.8}},\n",
    "  {\"text\": \"Shall we \\\"talk\\\"?\", \"state\": {\"type\": \"Interest\"}}\n",
    "]}\n",
);

fn companion(home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("companion");
    cmd.current_dir(home)
        .env("COMPANION_HOME", home)
        .env_remove("COMPANION_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("COMPANION_REPLAY_FILE")
        .env_remove("COMPANION_MAX_ROUNDS")
        .env_remove("MAX_CONVERSATION_ROUNDS")
        .env_remove("COMPANION_HISTORY_FILE")
        .env_remove("CONVERSATION_HISTORY_FILE")
        .env_remove("COMPANION_PERSIST");
    cmd
}

fn write_reply(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("reply.txt");
    fs::write(&path, REPLY).expect("write reply");
    path
}

fn read_snapshot(home: &Path) -> Value {
    let raw = fs::read_to_string(home.join("conversation_history.json")).expect("read history");
    serde_json::from_str(&raw).expect("history json")
}

#[test]
fn chat_message_streams_chunks_and_persists_transcript() {
    let tmp = tempdir().expect("tempdir");
    let reply = write_reply(tmp.path());

    companion(tmp.path())
        .env("COMPANION_STREAM_CHUNK_SIZE", "7")
        .args(["chat", "--message", "hello there", "--replay"])
        .arg(&reply)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hi, {friend}!  [emotion: Joy (0.80)]"))
        .stdout(predicate::str::contains("Shall we \"talk\"?  [state: Interest]"))
        .stdout(predicate::str::contains("records=2 dropped=0 evicted=0"));

    let snapshot = read_snapshot(tmp.path());
    assert_eq!(snapshot["max_rounds"], 30);
    let messages = snapshot["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hello there");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["emotion"]["type"], "Joy");
    assert_eq!(messages[2]["state"]["type"], "Interest");
    assert!(messages[0]["timestamp"].is_string());
}

#[test]
fn chat_without_key_or_replay_reports_issue() {
    let tmp = tempdir().expect("tempdir");

    companion(tmp.path())
        .args(["chat", "--message", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing API key"));

    assert!(!tmp.path().join("conversation_history.json").exists());
}

#[test]
fn stats_history_and_clear_follow_the_transcript() {
    let tmp = tempdir().expect("tempdir");
    let reply = write_reply(tmp.path());

    companion(tmp.path())
        .args(["chat", "--message", "first", "--replay"])
        .arg(&reply)
        .assert()
        .success();

    companion(tmp.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("rounds=1/30"))
        .stdout(predicate::str::contains("total_messages=3 user=1 assistant=2"));

    companion(tmp.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("] user: first"))
        .stdout(predicate::str::contains("assistant: Hi, {friend}! (emotion: Joy 0.80)"));

    let session_before = read_snapshot(tmp.path())["session_id"].clone();
    companion(tmp.path())
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared=3"));

    let snapshot = read_snapshot(tmp.path());
    assert_eq!(snapshot["messages"].as_array().map(Vec::len), Some(0));
    assert_eq!(snapshot["session_id"], session_before);

    let audit = fs::read_to_string(tmp.path().join("logs/audit.log")).expect("audit log");
    assert!(audit.contains("\"status\":\"cleared\""));
}

#[test]
fn window_evicts_whole_rounds_across_runs() {
    let tmp = tempdir().expect("tempdir");
    let reply = write_reply(tmp.path());

    for message in ["one", "two"] {
        companion(tmp.path())
            .env("COMPANION_MAX_ROUNDS", "1")
            .args(["chat", "--message", message, "--replay"])
            .arg(&reply)
            .assert()
            .success();
    }

    let snapshot = read_snapshot(tmp.path());
    let messages = snapshot["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["content"], "two");
    assert_eq!(snapshot["max_rounds"], 1);
}

#[test]
fn corrupt_history_falls_back_to_empty() {
    let tmp = tempdir().expect("tempdir");
    fs::write(tmp.path().join("conversation_history.json"), "{ not json").expect("write");

    companion(tmp.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("total_messages=0"))
        .stderr(predicate::str::contains("COMPANION_WARN code=E201"));
}

#[test]
fn json_flag_renders_report() {
    let tmp = tempdir().expect("tempdir");

    let output = companion(tmp.path())
        .args(["--json", "stats"])
        .output()
        .expect("run stats");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(report["command"], "stats");
    assert_eq!(report["ok"], true);
}

#[test]
fn json_output_stays_a_single_document() {
    let tmp = tempdir().expect("tempdir");
    let reply = write_reply(tmp.path());

    let chat = companion(tmp.path())
        .args(["--json", "chat", "--message", "hello", "--replay"])
        .arg(&reply)
        .output()
        .expect("run chat");
    assert!(chat.status.success());
    let report: Value = serde_json::from_slice(&chat.stdout).expect("chat report json");
    assert_eq!(report["command"], "chat");
    let stderr = String::from_utf8_lossy(&chat.stderr);
    assert!(stderr.contains("Hi, {friend}!  [emotion: Joy (0.80)]"));

    let export = companion(tmp.path())
        .args(["--json", "history", "--export"])
        .output()
        .expect("run history export");
    assert!(export.status.success());
    let snapshot: Value = serde_json::from_slice(&export.stdout).expect("snapshot json");
    assert_eq!(snapshot["messages"].as_array().map(Vec::len), Some(3));
    assert!(snapshot.get("command").is_none());
}
