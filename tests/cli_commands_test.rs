// Integration tests for CLI commands
// Run with: cargo test --test cli_commands_test

use std::process::Command;
use tempfile::TempDir;

const KEY_HEX: &str = "41791102999c339c844880b23950704cc43aa840f3739e365323cda4dfa89e7a";

fn relay_tunnel(config_dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_relay-tunnel"));
    command
        .env("RELAY_TUNNEL_CONFIG_DIR", config_dir.path())
        .env_remove("RELAY_TUNNEL_CONTEXT_FILE")
        .env_remove("RELAY_TUNNEL_MAX_CONTROL_FRAMES");
    command
}

/// `inspect` prints routing fields and never the key
#[test]
fn test_inspect_command() {
    let config_dir = TempDir::new().unwrap();
    let uri = format!("wc:topic1@1?bridge=https%3A%2F%2Fb.example&key={KEY_HEX}");

    let output = relay_tunnel(&config_dir)
        .args(["inspect", &uri])
        .output()
        .expect("Failed to execute inspect command");

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("topic1"));
    assert!(stdout.contains("https://b.example"));
    assert!(!stdout.contains(KEY_HEX), "Key must not be printed");
}

/// `inspect` fails on a URI without a key
#[test]
fn test_inspect_rejects_missing_key() {
    let config_dir = TempDir::new().unwrap();

    let output = relay_tunnel(&config_dir)
        .args(["inspect", "wc:topic1@1?bridge=https%3A%2F%2Fb.example"])
        .output()
        .expect("Failed to execute inspect command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("key"), "stderr: {stderr}");
}

/// `forget` removes a saved session and is harmless without one
#[test]
fn test_forget_command() {
    let config_dir = TempDir::new().unwrap();
    let context_file = config_dir.path().join("session.json");
    std::fs::write(&context_file, r#"{"provider":"wc","context":{}}"#).unwrap();

    let output = relay_tunnel(&config_dir)
        .arg("forget")
        .output()
        .expect("Failed to execute forget command");
    assert!(output.status.success());
    assert!(!context_file.exists());

    let output = relay_tunnel(&config_dir)
        .arg("forget")
        .output()
        .expect("Failed to execute forget command");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No saved session"));
}

/// `resume` without a saved session fails cleanly
#[test]
fn test_resume_without_session() {
    let config_dir = TempDir::new().unwrap();

    let output = relay_tunnel(&config_dir)
        .arg("resume")
        .output()
        .expect("Failed to execute resume command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No saved session"));
}
