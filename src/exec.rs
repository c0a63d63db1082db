// src/exec.rs
//
// Synchronous external command execution with output capture and a hard
// timeout. Requests are processed one at a time, so blocking here is fine;
// the only threads are short-lived pipe drains.

use serde::Serialize;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Captured result of one external command.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    pub command: Vec<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `argv` in `cwd`, capturing stdout and stderr, killing the child if it
/// outlives `timeout_secs`. A timeout is an `Err`, never a hang.
pub fn run_command(argv: &[String], cwd: &std::path::Path, timeout_secs: u64) -> Result<ExecResult, String> {
    if argv.is_empty() {
        return Err("Empty command".to_string());
    }

    tlog!("[exec] Running: {} (timeout {}s)", argv.join(" "), timeout_secs);
    let start = Instant::now();

    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn {}: {}", argv[0], e))?;

    // Drain both pipes on threads so a chatty child can't fill a pipe and stall.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_handle = std::thread::spawn(move || drain_pipe(stdout_pipe));
    let stderr_handle = std::thread::spawn(move || drain_pipe(stderr_pipe));

    // Bounded polling instead of a blocking wait, so the deadline always wins.
    let deadline = start + Duration::from_secs(timeout_secs);
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(format!("Failed to wait for {}: {}", argv[0], e));
            }
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    let duration_ms = start.elapsed().as_millis() as u64;

    match exit_status {
        Some(status) => {
            tlog!(
                "[exec] {} finished with {:?} in {}ms",
                argv[0],
                status.code(),
                duration_ms
            );
            Ok(ExecResult {
                command: argv.to_vec(),
                exit_code: status.code(),
                stdout,
                stderr,
                duration_ms,
                timed_out: false,
            })
        }
        None => Err(format!(
            "Command '{}' timed out after {}s",
            argv.join(" "),
            timeout_secs
        )),
    }
}

fn drain_pipe(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut p) = pipe {
        let _ = p.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Validate a caller-supplied timeout, falling back to `default_secs`.
pub fn validate_timeout(value: Option<u64>, default_secs: u64) -> Result<u64, String> {
    let t = value.unwrap_or(default_secs);
    if !(10..=3600).contains(&t) {
        return Err(format!("timeout must be between 10 and 3600 seconds, got {}", t));
    }
    Ok(t)
}

// ============================================================================
// Tests
// ============================================================================
