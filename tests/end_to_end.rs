//! Literal end-to-end scenarios exercised against real child processes.

use std::time::Duration;

use procly::{Command, OpenMode, Pipeline, Stdio, WaitOptions};

fn fill_streams() -> &'static str {
    env!("CARGO_BIN_EXE_fill_streams")
}

fn sleep_exit() -> &'static str {
    env!("CARGO_BIN_EXE_sleep_exit")
}

fn spawn_grandchild() -> &'static str {
    env!("CARGO_BIN_EXE_spawn_grandchild")
}

fn ignore_term() -> &'static str {
    env!("CARGO_BIN_EXE_ignore_term")
}

fn list_open_fds() -> &'static str {
    env!("CARGO_BIN_EXE_list_open_fds")
}

#[test]
fn capture_small_stderr_stdout() {
    let out = Command::new(fill_streams())
        .args(["5", "97", "3", "98"])
        .output()
        .unwrap();
    assert_eq!(out.stdout.len(), 5);
    assert_eq!(out.stderr.len(), 3);
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn merge_stderr_into_stdout() {
    let out = Command::new(fill_streams())
        .args(["5", "97", "3", "98"])
        .merge_stderr_into_stdout()
        .output()
        .unwrap();
    assert!(out.stderr.is_empty());
    assert_eq!(out.stdout.len(), 8);
    assert_eq!(out.stdout.iter().filter(|&&b| b == b'a').count(), 5);
    assert_eq!(out.stdout.iter().filter(|&&b| b == b'b').count(), 3);
}

#[test]
fn large_payloads_do_not_deadlock() {
    let eight_mib = 8 * 1024 * 1024;
    let four_mib = 4 * 1024 * 1024;
    let out = Command::new(fill_streams())
        .args([eight_mib.to_string(), "97".into(), four_mib.to_string(), "98".into()])
        .output()
        .unwrap();
    assert_eq!(out.stdout.len(), eight_mib);
    assert_eq!(out.stderr.len(), four_mib);
    assert!(out.status.success());
}

#[test]
fn timeout_escalates_to_kill() {
    let mut child = Command::new(ignore_term()).arg("2000").spawn().unwrap();
    let err = child
        .wait(WaitOptions { timeout: Some(Duration::from_millis(10)), kill_grace: Duration::from_millis(50) })
        .unwrap_err();
    assert_eq!(err.kind(), procly::ErrorKind::Timeout);
}

#[test]
fn pipefail_reports_first_failure() {
    let status = (Command::new(sleep_exit()).args(["0", "5"]) | Command::new(sleep_exit()).args(["0", "0"]))
        .pipefail()
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(5));
}

#[test]
fn pipefail_off_reports_last_stage() {
    let status = (Command::new(sleep_exit()).args(["0", "5"]) | Command::new(sleep_exit()).args(["0", "0"]))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
}

#[test]
fn pipe_round_trip_through_cat() {
    let mut child = Command::new("cat").stdin(Stdio::piped()).stdout(Stdio::piped()).spawn().unwrap();
    let mut stdin = child.take_stdin().unwrap();
    let mut stdout = child.take_stdout().unwrap();
    stdin.write_all(b"stdin_payload").unwrap();
    drop(stdin);
    let mut out = Vec::new();
    stdout.read_all(&mut out).unwrap();
    assert_eq!(out, b"stdin_payload");
    assert!(child.wait(WaitOptions::default()).unwrap().success());
}

#[test]
fn fd_count_stable_across_many_runs() {
    let before = open_fd_count();
    for _ in 0..50 {
        Command::new("true").status().unwrap();
    }
    for _ in 0..50 {
        Command::new("true").output().unwrap();
    }
    let after = open_fd_count();
    assert_eq!(before, after);
}

fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
fn process_group_terminate_reaches_grandchild() {
    let mut pipeline = Pipeline::from(Command::new(spawn_grandchild()).arg("5000"))
        .new_process_group()
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));
    pipeline.terminate().unwrap();
    let result = pipeline.wait(WaitOptions { timeout: Some(Duration::from_secs(1)), ..WaitOptions::default() });
    assert!(result.is_err() || result.unwrap().aggregate.is_killed_by(libc::SIGTERM));
}

#[test]
fn fallback_path_hygiene() {
    // SAFETY: this test does not spawn threads that read the environment
    // concurrently with this mutation.
    unsafe {
        std::env::set_var("PROCLY_FORCE_FALLBACK", "1");
    }
    let out = Command::new(list_open_fds()).output().unwrap();
    unsafe {
        std::env::remove_var("PROCLY_FORCE_FALLBACK");
    }
    assert!(out.stdout.is_empty(), "child observed unexpected open fds: {:?}", out.stdout);
}

#[test]
fn empty_argv_is_rejected_before_any_syscall() {
    let err = Command::new("").status().unwrap_err();
    assert_eq!(err.kind(), procly::ErrorKind::EmptyArgv);
}

#[test]
fn stdin_file_must_be_readable() {
    let err = Command::new("cat")
        .stdin(Stdio::file_with_mode("/dev/null", OpenMode::WriteTruncate))
        .status()
        .unwrap_err();
    assert_eq!(err.kind(), procly::ErrorKind::InvalidStdio);
}
