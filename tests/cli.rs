use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn folio_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("folio");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("archive")).unwrap();
    fs::write(
        files_dir.join("q3_report.txt"),
        "Quarterly revenue growth was strong this year.\n\nOperating margin improved as revenue rose.\x0cOutlook for next quarter remains positive.",
    )
    .unwrap();
    fs::write(
        files_dir.join("lease.md"),
        "# Office Lease\n\nThe tenant shall maintain the premises and pay rent monthly.",
    )
    .unwrap();
    fs::write(
        files_dir.join("archive").join("invoice_114.txt"),
        "Invoice 114 for consulting services rendered in March.",
    )
    .unwrap();
    fs::write(files_dir.join("notes.csv"), "not,ingested").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/folio.sqlite"

[index]
dir = "{root}/data/vectordb"

[chunking]
chunk_size = 500
chunk_overlap = 50

[embedding]
provider = "hash"
dims = 256
"#,
        root = root.display()
    );

    let config_path = config_dir.join("folio.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

fn run_folio(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = folio_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run folio binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn add_all(config_path: &Path) {
    let dir = files_dir(config_path);
    let (stdout, stderr, success) =
        run_folio(config_path, &["add-dir", dir.to_str().unwrap(), "--type", "other"]);
    assert!(success, "add-dir failed: {}", stderr);
    assert!(stdout.contains("Added 3 documents, 0 failed."), "stdout: {}", stdout);
}

fn search_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["search"];
    full.extend_from_slice(args);
    full.push("--json");
    let (stdout, stderr, success) = run_folio(config_path, &full);
    assert!(success, "search failed: {}", stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

fn result_filenames(response: &serde_json::Value) -> Vec<String> {
    response["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["filename"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_init_creates_database_and_index() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_folio(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));

    let data = tmp.path().join("data");
    assert!(data.join("folio.sqlite").exists());
    assert!(data.join("vectordb").join("index.bin").exists());
    assert!(data.join("vectordb").join("metadata.json").exists());

    let (_, _, again) = run_folio(&config_path, &["init"]);
    assert!(again, "init should be idempotent");
}

#[test]
fn test_missing_config_fails() {
    let (stdout, stderr, success) = run_folio(Path::new("/nonexistent/folio.toml"), &["list"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("/nonexistent/folio.toml"));
}

#[test]
fn test_add_dir_then_list() {
    let (_tmp, config_path) = setup_test_env();
    add_all(&config_path);

    let (stdout, _, success) = run_folio(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("q3_report.txt"));
    assert!(stdout.contains("lease.md"));
    assert!(stdout.contains("invoice_114.txt"));
    assert!(!stdout.contains("notes.csv"));
}

#[test]
fn test_add_duplicate_fails() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("lease.md");
    let file = file.to_str().unwrap();

    let (_, stderr, success) = run_folio(&config_path, &["add", file, "--type", "contract"]);
    assert!(success, "add failed: {}", stderr);
    let (_, stderr, success) = run_folio(&config_path, &["add", file]);
    assert!(!success);
    assert!(stderr.contains("already exists"), "stderr: {}", stderr);
}

#[test]
fn test_add_rejects_unknown_type() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("lease.md");
    let (_, stderr, success) =
        run_folio(&config_path, &["add", file.to_str().unwrap(), "--type", "memo"]);
    assert!(!success);
    assert!(stderr.contains("Unknown document type"));
}

#[test]
fn test_search_ranks_matching_document_first() {
    let (_tmp, config_path) = setup_test_env();
    add_all(&config_path);

    let response = search_json(&config_path, &["quarterly revenue growth"]);
    let names = result_filenames(&response);
    assert_eq!(names.first().map(String::as_str), Some("q3_report.txt"));
    assert_eq!(response["query"], "quarterly revenue growth");

    let top = &response["results"][0];
    assert!(top["relevance_score"].as_f64().unwrap() >= 0.5);
    assert_eq!(top["matched_pages"], serde_json::json!([1, 2]));
    assert_eq!(top["document_type"], "other");
}

#[test]
fn test_search_respects_top_k_and_type_filter() {
    let (_tmp, config_path) = setup_test_env();
    add_all(&config_path);

    let response = search_json(&config_path, &["revenue", "--top-k", "1"]);
    assert!(result_filenames(&response).len() <= 1);

    let response = search_json(&config_path, &["revenue", "--type", "invoice"]);
    assert!(result_filenames(&response).is_empty());
    assert_eq!(response["total_results"], 0);
}

#[test]
fn test_search_empty_index() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_folio(&config_path, &["search", "anything"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_remove_document_excludes_it_from_search() {
    let (_tmp, config_path) = setup_test_env();
    add_all(&config_path);

    let response = search_json(&config_path, &["quarterly revenue growth"]);
    let id = response["results"][0]["document_id"].as_i64().unwrap();

    let (stdout, stderr, success) = run_folio(&config_path, &["remove", &id.to_string()]);
    assert!(success, "remove failed: {}", stderr);
    assert!(stdout.contains("Removed document"));

    let response = search_json(&config_path, &["quarterly revenue growth"]);
    assert!(!result_filenames(&response).contains(&"q3_report.txt".to_string()));

    let (_, _, success) = run_folio(&config_path, &["remove", &id.to_string()]);
    assert!(!success, "removing twice should fail");
}

#[test]
fn test_get_shows_chunks() {
    let (_tmp, config_path) = setup_test_env();
    add_all(&config_path);

    let (stdout, _, success) = run_folio(&config_path, &["list", "--json"]);
    assert!(success);
    let docs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let lease = docs
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["filename"] == "lease.md")
        .unwrap();
    let id = lease["id"].as_i64().unwrap().to_string();

    let (stdout, _, success) = run_folio(&config_path, &["get", &id, "--chunks"]);
    assert!(success);
    assert!(stdout.contains("filename:      lease.md"));
    assert!(stdout.contains("[chunk 0]"));
    assert!(stdout.contains("pay rent monthly"));

    let (_, stderr, success) = run_folio(&config_path, &["get", "9999"]);
    assert!(!success);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_stats_and_reset_index() {
    let (_tmp, config_path) = setup_test_env();
    add_all(&config_path);

    let (stdout, _, success) = run_folio(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("Vectors:     3 (256 dims, hash)"));

    let (stdout, _, success) = run_folio(&config_path, &["reset-index"]);
    assert!(success);
    assert!(stdout.contains("Vector index reset."));

    let (stdout, _, success) = run_folio(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("Vectors:     0"));

    let response = search_json(&config_path, &["revenue"]);
    assert_eq!(response["total_results"], 0);
}

#[test]
fn test_index_survives_restart() {
    let (_tmp, config_path) = setup_test_env();
    add_all(&config_path);

    // Every command is a fresh process that reloads the snapshot.
    let first = search_json(&config_path, &["consulting services invoice"]);
    let second = search_json(&config_path, &["consulting services invoice"]);
    assert_eq!(result_filenames(&first), result_filenames(&second));
    assert_eq!(
        result_filenames(&first).first().map(String::as_str),
        Some("invoice_114.txt")
    );
}
