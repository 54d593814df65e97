//! End-to-end tests for the keyfabric binary against a dotenv file.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keyfabric.toml"), "host_tag = \"e2e\"\n").unwrap();
        Self { dir }
    }

    fn env_file(&self) -> PathBuf {
        self.dir.path().join(".env")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_keyfabric"))
            .arg("--config")
            .arg(self.dir.path().join("keyfabric.toml"))
            .arg("--env-file")
            .arg(self.env_file())
            .args(args)
            .env("RUST_LOG", "warn")
            .output()
            .unwrap()
    }

    fn env_contents(&self) -> String {
        std::fs::read_to_string(self.env_file()).unwrap_or_default()
    }
}

fn value_of(contents: &str, name: &str) -> Option<String> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{}=", name)))
        .map(|v| v.trim_matches('"').to_string())
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_refresh_writes_unset_slots() {
    let ws = Workspace::new();

    let output = ws.run(&["refresh", "infolinks", "groq"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let contents = ws.env_contents();
    assert!(value_of(&contents, "VITE_INFOLINKS_API_KEY").unwrap().starts_with("il_"));
    assert!(value_of(&contents, "VITE_GROQ_API_KEY").unwrap().starts_with("gsk-"));
    assert!(value_of(&contents, "VITE_VIGLINK_API_KEY").is_none());
}

#[test]
fn test_refresh_keeps_existing_values() {
    let ws = Workspace::new();
    std::fs::write(ws.env_file(), "# local overrides\nVITE_GROQ_API_KEY=mine\n").unwrap();

    let output = ws.run(&["refresh", "groq", "viglink"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("already set"));

    let contents = ws.env_contents();
    assert!(contents.starts_with("# local overrides\n"));
    assert_eq!(value_of(&contents, "VITE_GROQ_API_KEY").as_deref(), Some("mine"));
    assert!(value_of(&contents, "VITE_VIGLINK_API_KEY").unwrap().starts_with("vg_"));
}

#[test]
fn test_generated_tokens_match_applied_values() {
    let ws = Workspace::new();

    let generated = ws.run(&["--format", "json", "generate", "private_key"]);
    assert!(generated.status.success());
    let json: serde_json::Value = serde_json::from_slice(&generated.stdout).unwrap();
    let token = json["private_key"]["token"].as_str().unwrap().to_string();
    assert_eq!(json["private_key"]["config_name"], "VITE_BSC_PRIVATE_KEY");
    assert_eq!(token.len(), 66);

    assert!(ws.run(&["refresh", "private_key"]).status.success());
    assert_eq!(
        value_of(&ws.env_contents(), "VITE_BSC_PRIVATE_KEY").as_deref(),
        Some(token.as_str())
    );
}

#[test]
fn test_repair_fills_required_names_then_does_nothing() {
    let ws = Workspace::new();

    let first = ws.run(&["--format", "json", "repair"]);
    assert!(first.status.success());
    let report: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    let mut services: Vec<&str> = report["results"]
        .as_object()
        .unwrap()
        .keys()
        .map(|k| k.as_str())
        .collect();
    services.sort();
    assert_eq!(services, vec!["infolinks", "private_key", "viglink"]);

    let second = ws.run(&["repair"]);
    assert!(second.status.success());
    assert!(stdout(&second).contains("Nothing to refresh"));
}

#[test]
fn test_repair_writes_required_name_verbatim() {
    let ws = Workspace::new();

    let output = ws.run(&["repair", "--require", "CUSTOM_TOKEN"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let contents = ws.env_contents();
    assert!(value_of(&contents, "CUSTOM_TOKEN").unwrap().starts_with("custom_token_"));
    assert!(value_of(&contents, "VITE_CUSTOM_TOKEN_API_KEY").is_none());
}

#[test]
fn test_missing_explicit_config_fails() {
    let ws = Workspace::new();
    let output = Command::new(env!("CARGO_BIN_EXE_keyfabric"))
        .arg("--config")
        .arg(Path::new("/nonexistent/keyfabric.toml"))
        .arg("services")
        .current_dir(ws.dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
}
