use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Test context that sets up a temporary hubup home environment
struct TestContext {
    temp_dir: TempDir,
    hubup_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let hubup_home = temp_dir.path().join(".hubup");
        std::fs::create_dir_all(&hubup_home).expect("failed to create hubup home");
        Self { temp_dir, hubup_home }
    }

    fn write_config(&self, contents: &str) {
        std::fs::write(self.hubup_home.join("config.toml"), contents)
            .expect("failed to write config");
    }

    fn hubup_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_hubup");
        let mut cmd = Command::new(bin_path);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("HUBUP_HOME", &self.hubup_home);
        cmd
    }
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx
        .hubup_cmd()
        .arg("--help")
        .output()
        .expect("failed to run hubup");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx
        .hubup_cmd()
        .arg("--version")
        .output()
        .expect("failed to run hubup");
    assert!(output.status.success());
}

#[test]
fn test_status_on_fresh_home() {
    let ctx = TestContext::new();
    let output = ctx
        .hubup_cmd()
        .arg("status")
        .output()
        .expect("failed to run hubup status");

    assert!(output.status.success(), "status should always succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("No update operation in progress"),
        "fresh home should report idle, got: {stdout}"
    );

    let db_path = ctx.hubup_home.join("state.db");
    assert!(
        db_path.exists(),
        "state.db should be created after running status"
    );
}

#[test]
fn test_history_on_fresh_home() {
    let ctx = TestContext::new();
    let output = ctx
        .hubup_cmd()
        .arg("history")
        .output()
        .expect("failed to run hubup history");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No update history"));
}

#[test]
fn test_history_rejects_conflicting_filters() {
    let ctx = TestContext::new();
    let output = ctx
        .hubup_cmd()
        .args(["history", "--failed", "--ok"])
        .output()
        .expect("failed to run hubup history");

    assert!(!output.status.success(), "--failed and --ok are exclusive");
}

#[test]
fn test_check_without_tracked_libraries() {
    let ctx = TestContext::new();
    let output = ctx
        .hubup_cmd()
        .arg("check")
        .output()
        .expect("failed to run hubup check");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("No libraries tracked"),
        "empty config should be explained, got: {stdout}"
    );
}

#[test]
fn test_check_with_unreachable_source_degrades_per_library() {
    let ctx = TestContext::new();
    // port 9 (discard) is not listening; the lookup fails per entry
    ctx.write_config(
        r#"
        source_url = "http://127.0.0.1:9"

        [[library]]
        name = "zigbee-herdsman"
        installed_version = "0.14.0"
        "#,
    );

    let output = ctx
        .hubup_cmd()
        .arg("check")
        .output()
        .expect("failed to run hubup check");

    // a dead source is reported in the table, not a fatal error
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("zigbee-herdsman"), "got: {stdout}");
    assert!(stdout.contains("check failed"), "got: {stdout}");
}

#[test]
fn test_check_unknown_library_fails() {
    let ctx = TestContext::new();
    ctx.write_config(
        r#"
        [[library]]
        name = "mqtt-lib"
        installed_version = "2.0.0"
        "#,
    );

    let output = ctx
        .hubup_cmd()
        .args(["check", "ghost"])
        .output()
        .expect("failed to run hubup check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown library"), "got: {stderr}");
}

#[test]
fn test_completions_command() {
    let ctx = TestContext::new();
    let output = ctx
        .hubup_cmd()
        .args(["completions", "bash"])
        .output()
        .expect("failed to run hubup completions");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hubup"));
}
