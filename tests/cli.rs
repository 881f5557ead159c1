//! End-to-end tests for the `rune` binary.
//!
//! Each test writes an offline config (heuristic gateway, no frame decoder)
//! into a temp directory and runs the real binary against it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn rune_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rune"))
}

/// Temp dir holding `config/rune.toml` and `note.txt`; the workspace root
/// is whatever the caller passes.
fn setup(workspace_root: &Path) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_path = config_dir.join("rune.toml");
    fs::write(
        &config_path,
        format!(
            r#"[gateway]
provider = "heuristic"

[frames]
extractor = "disabled"

[workspace]
backend = "filesystem"
root = "{}"
"#,
            workspace_root.display()
        ),
    )
    .unwrap();

    fs::write(
        tmp.path().join("note.txt"),
        "Lanterns over the harbour at night.",
    )
    .unwrap();
    (tmp, config_path)
}

fn run_generate(tmp: &TempDir, config: &Path) -> Output {
    Command::new(rune_binary())
        .arg("--config")
        .arg(config)
        .arg("generate")
        .arg(tmp.path().join("note.txt"))
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

#[test]
fn generate_saves_and_exits_cleanly() {
    let workspace = TempDir::new().unwrap();
    let (tmp, config) = setup(workspace.path());

    let output = run_generate(&tmp, &config);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert!(stderr.contains("Saved to"));

    let saved: Vec<_> = fs::read_dir(workspace.path().join("rune"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
        .collect();
    assert_eq!(saved.len(), 1);
}

#[test]
fn failed_save_exits_nonzero() {
    let blocker_dir = TempDir::new().unwrap();
    let blocker = blocker_dir.path().join("not-a-dir");
    fs::write(&blocker, "occupied").unwrap();
    let (tmp, config) = setup(&blocker);

    let output = run_generate(&tmp, &config);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Save failed"), "stderr: {}", stderr);
    // the summary is still printed before the failure
    assert!(stderr.contains("fallback:"));
}

#[test]
fn missing_input_exits_nonzero() {
    let workspace = TempDir::new().unwrap();
    let (tmp, config) = setup(workspace.path());

    let output = Command::new(rune_binary())
        .arg("--config")
        .arg(&config)
        .arg("generate")
        .arg(tmp.path().join("absent.txt"))
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!workspace.path().join("rune").exists());
}
