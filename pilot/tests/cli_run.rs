//! CLI tests for the pilot binary.
//!
//! Each test runs the compiled binary in a scratch working directory with a
//! hand-written `pilot.toml` and asserts the stable exit codes and product
//! output, the way an operator's cron job or shell would see them.

use std::fs;
use std::path::Path;
use std::process::Command;

use pilot::exit_codes;

fn pilot_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pilot"));
    cmd.current_dir(dir);
    cmd
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(dir)
        .args(args)
        .status()
        .expect("run git");
    assert!(status.success(), "git {args:?} failed");
}

/// No plan file means an empty plan: the run idles through to terminal
/// success without ever spawning the adapter, and still leaves a heartbeat
/// and a checkpoint log behind.
#[test]
fn idle_run_once_exits_ok() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("repos")).expect("mkdir repos");
    fs::write(
        dir.path().join("pilot.toml"),
        r#"
repos_root = "repos"

[adapter]
transport = "oneshot"
command = ["/bin/true"]
"#,
    )
    .expect("write settings");

    let status = pilot_cmd(dir.path())
        .arg("run-once")
        .status()
        .expect("run pilot");

    assert_eq!(status.code(), Some(exit_codes::OK));
    assert!(dir.path().join(".pilot/heartbeat.json").exists());
    let checkpoints = fs::read_dir(dir.path().join(".pilot/checkpoints"))
        .expect("read checkpoints dir")
        .count();
    assert_eq!(checkpoints, 1, "one run file");
}

/// Settings that fail validation are rejected before any run starts.
#[test]
fn invalid_settings_exit_invalid() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("pilot.toml"),
        "run_deadline_secs = 0\n",
    )
    .expect("write settings");

    let output = pilot_cmd(dir.path())
        .arg("run-once")
        .output()
        .expect("run pilot");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("run_deadline_secs"),
        "stderr names the bad field: {stderr}"
    );
}

/// `scan` prints the repository map as JSON on stdout; directories without
/// a `.git` are not repositories.
#[test]
fn scan_prints_repo_map() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("repos/not-a-repo")).expect("mkdir");
    fs::write(
        dir.path().join("pilot.toml"),
        r#"
repos_root = "repos"

[adapter]
transport = "oneshot"
command = ["/bin/true"]
"#,
    )
    .expect("write settings");

    let output = pilot_cmd(dir.path()).arg("scan").output().expect("run pilot");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "{}\n");

    // Now add a real repository and scan again.
    let repo = dir.path().join("repos/demo");
    fs::create_dir(&repo).expect("mkdir demo");
    git(&repo, &["init", "-q"]);

    let output = pilot_cmd(dir.path()).arg("scan").output().expect("run pilot");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"demo\""), "repo listed: {stdout}");
}

/// An adapter that always fails exhausts the recovery budget and the run
/// lands in terminal failure: exit code 2, with the failed report persisted.
#[test]
fn dead_adapter_exhausts_recovery_and_exits_failed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = dir.path().join("repos/demo");
    fs::create_dir_all(&repo).expect("mkdir demo");
    git(&repo, &["init", "-q"]);
    fs::write(
        dir.path().join("pilot.toml"),
        r#"
repos_root = "repos"
max_retries = 1

[adapter]
transport = "oneshot"
command = ["/bin/false"]
call_timeout_secs = 5
max_attempts = 1
backoff_base_ms = 1
backoff_cap_ms = 1
"#,
    )
    .expect("write settings");
    fs::write(
        dir.path().join("plan.toml"),
        r#"
[[tasks]]
id = "nudge"
action = "post_status"
message = "status: hello"
"#,
    )
    .expect("write plan");

    let status = pilot_cmd(dir.path())
        .arg("run-once")
        .status()
        .expect("run pilot");

    assert_eq!(status.code(), Some(exit_codes::FAILED));

    // The run file tail records the terminal failure.
    let checkpoints_dir = dir.path().join(".pilot/checkpoints");
    let run_file = fs::read_dir(&checkpoints_dir)
        .expect("read checkpoints dir")
        .next()
        .expect("one run file")
        .expect("dir entry")
        .path();
    let raw = fs::read_to_string(run_file).expect("read run file");
    let tail = raw.lines().last().expect("at least one checkpoint");
    assert!(tail.contains("terminal_failure"), "tail: {tail}");
}

/// The second concurrent instance refuses to run instead of racing the
/// first over the same state directory.
#[test]
fn held_lock_refuses_a_second_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("repos")).expect("mkdir repos");
    fs::write(
        dir.path().join("pilot.toml"),
        r#"
repos_root = "repos"

[adapter]
transport = "oneshot"
command = ["/bin/true"]
"#,
    )
    .expect("write settings");

    // Plant a foreign lock the way a live process would have.
    fs::create_dir_all(dir.path().join(".pilot")).expect("mkdir state");
    fs::write(
        dir.path().join(".pilot/watchdog.lock"),
        "pid = 999999\nacquired_at = 1767000000\n",
    )
    .expect("write lock");

    let output = pilot_cmd(dir.path())
        .arg("run-once")
        .output()
        .expect("run pilot");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("lock"), "stderr mentions the lock: {stderr}");
}
