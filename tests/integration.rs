use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn vault_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vault");
    path
}

/// A vault with three supported documents, one unsupported file, and both
/// AI backends disabled.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(docs_dir.join("nested")).unwrap();
    fs::write(
        docs_dir.join("alpha.md"),
        "# Alpha\n\nNotes about the apartment lease and the deposit.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("nested/beta.txt"),
        "Beta plain text file about the garden.",
    )
    .unwrap();
    fs::write(docs_dir.join("gamma.csv"), "name,qty\nflour,2\nyeast,1\n").unwrap();
    fs::write(docs_dir.join("image.png"), b"\x89PNG").unwrap();

    let config_content = format!(
        r#"[paths]
docs = "{root}/docs"
index = "{root}/index/documents.sqlite"
memory = "{root}/memory/conversation_memory.json"

[embedding]
provider = "disabled"

[generation]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = root.join("vault.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vault(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vault_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vault binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn run_json(config_path: &Path, args: &[&str]) -> (Value, bool) {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    let (stdout, stderr, success) = run_vault(config_path, &full);
    let value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("not JSON ({}): stdout={} stderr={}", e, stdout, stderr));
    (value, success)
}

#[test]
fn test_scan_lists_supported_files() {
    let (_tmp, config_path) = setup_test_env();

    let (scan, success) = run_json(&config_path, &["scan"]);
    assert!(success);
    assert_eq!(scan["success"], true);
    assert_eq!(scan["total_files"], 3);

    let mut paths: Vec<&str> = scan["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["relative_path"].as_str().unwrap())
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["alpha.md", "gamma.csv", "nested/beta.txt"]);
}

#[test]
fn test_scan_text_output() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vault(&config_path, &["scan"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("3 files"));
    assert!(!stdout.contains("image.png"));
}

#[test]
fn test_status_without_backends() {
    let (_tmp, config_path) = setup_test_env();

    let (status, success) = run_json(&config_path, &["status"]);
    assert!(success);
    assert_eq!(status["ai_available"], false);
    assert_eq!(status["index_available"], false);
    assert_eq!(status["query_ready"], false);
    assert_eq!(status["total_files"], 3);
    assert!(status["supported_types"]
        .as_array()
        .unwrap()
        .contains(&Value::from("pdf")));
}

#[test]
fn test_ingest_fails_when_embeddings_unavailable() {
    let (tmp, config_path) = setup_test_env();

    let (out, success) = run_json(&config_path, &["ingest"]);
    assert!(!success);
    assert_eq!(out["success"], false);
    assert_eq!(out["kind"], "unavailable");
    assert!(out["error"].as_str().unwrap().contains("not available"));
    assert!(!tmp.path().join("index/documents.sqlite").exists());
}

#[test]
fn test_query_before_ingest_is_not_ready() {
    let (_tmp, config_path) = setup_test_env();

    let (out, success) = run_json(&config_path, &["query", "What about the deposit?"]);
    assert!(!success);
    assert_eq!(out["kind"], "not_ready");
}

#[test]
fn test_clear_index_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vault(&config_path, &["clear-index"]);
    assert!(success, "clear-index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Index cleared"));

    let (_, _, success) = run_vault(&config_path, &["clear-index"]);
    assert!(success, "second clear-index failed");

    let (cleared, success) = run_json(&config_path, &["clear-index"]);
    assert!(success);
    assert_eq!(cleared["success"], true);
    assert_eq!(cleared["removed"], false);
}

#[test]
fn test_status_with_unreachable_ollama_is_quick() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("ollama.toml");
    fs::write(
        &config_path,
        format!(
            r#"[paths]
docs = "{root}/docs"
index = "{root}/index/documents.sqlite"
memory = "{root}/memory/conversation_memory.json"

[embedding]
provider = "ollama"
url = "http://127.0.0.1:9"
max_retries = 5

[generation]
provider = "ollama"
url = "http://127.0.0.1:9"
max_retries = 2
"#,
            root = tmp.path().display()
        ),
    )
    .unwrap();

    let started = Instant::now();
    let (status, success) = run_json(&config_path, &["status"]);
    assert!(success);
    assert_eq!(status["embeddings_available"], false);
    assert_eq!(status["generation_available"], false);
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "status took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_memory_sessions_persist_between_runs() {
    let (tmp, config_path) = setup_test_env();

    let (stats, success) = run_json(&config_path, &["memory", "stats"]);
    assert!(success);
    assert_eq!(stats["total_sessions"], 1);
    assert_eq!(stats["total_messages"], 0);
    assert!(tmp.path().join("memory/conversation_memory.json").exists());

    let (created, success) = run_json(&config_path, &["memory", "new-session"]);
    assert!(success);
    let new_id = created["session_id"].as_str().unwrap().to_string();

    let (stats, _) = run_json(&config_path, &["memory", "stats"]);
    assert_eq!(stats["total_sessions"], 2);
    assert_eq!(stats["current_session"], new_id.as_str());

    let (stdout, _, success) = run_vault(&config_path, &["memory", "clear"]);
    assert!(success);
    assert!(stdout.contains("Memory cleared"));

    let (stats, _) = run_json(&config_path, &["memory", "stats"]);
    assert_eq!(stats["total_sessions"], 1);
}

#[test]
fn test_memory_search_reads_existing_file() {
    let (tmp, config_path) = setup_test_env();
    let memory_dir = tmp.path().join("memory");
    fs::create_dir_all(&memory_dir).unwrap();
    fs::write(
        memory_dir.join("conversation_memory.json"),
        r#"{
  "sessions": [
    {
      "id": "session_20240301_180000",
      "created": "2024-03-01T18:00:00",
      "messages": [
        { "role": "user", "content": "I love pizza", "timestamp": "2024-03-01T18:00:01", "metadata": {} },
        { "role": "assistant", "content": "Noted.", "timestamp": "2024-03-01T18:00:02", "metadata": {} }
      ],
      "context": {}
    }
  ],
  "metadata": { "created": "2024-03-01T18:00:00", "version": "1.0" }
}"#,
    )
    .unwrap();

    let (found, success) = run_json(&config_path, &["memory", "search", "Pizza"]);
    assert!(success);
    let matches = found["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["session_id"], "session_20240301_180000");
    assert_eq!(matches[0]["message"]["role"], "user");

    let (recent, _) = run_json(&config_path, &["memory", "recent", "--count", "1"]);
    let recent = recent["matches"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["content"], "Noted.");
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("vault.toml");
    fs::write(&config_path, "[chunking]\nchunk_chars = 100\noverlap_chars = 100\n").unwrap();

    let (_, stderr, success) = run_vault(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("overlap_chars"));
}
