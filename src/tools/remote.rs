// src/tools/remote.rs
//
// Remote inspection over ssh. Hosts are resolved through the config
// allowlist; a name outside the allowlist is refused with the known list so
// the caller can correct it. Every tool runs exactly one remote command and
// returns the raw captured output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::audit::append_audit;
use crate::config::Config;
use crate::exec::{run_command, validate_timeout, ExecResult};

use super::{arg_str, arg_u64, require_str};

// ============================================================================
// Host resolution
// ============================================================================

/// Resolve an allowlisted host name to its ssh target.
pub fn resolve_host<'a>(config: &'a Config, host: &str) -> Result<&'a str, String> {
    config.hosts.get(host).map(|s| s.as_str()).ok_or_else(|| {
        let known: Vec<&String> = config.hosts.keys().collect();
        format!("Unknown host '{}'. Allowlisted hosts: {:?}", host, known)
    })
}

/// Run one command line on an allowlisted host.
fn ssh_exec(config: &Config, host: &str, command: &str, timeout_secs: u64) -> Result<ExecResult, String> {
    let target = resolve_host(config, host)?;
    let mut argv: Vec<String> = vec!["ssh".to_string()];
    argv.extend(config.ssh_opts.iter().cloned());
    argv.push(target.to_string());
    argv.push(command.to_string());
    run_command(&argv, &config.flake_root, timeout_secs)
}

fn ssh_result(host: &str, result: &ExecResult) -> Value {
    json!({
        "host": host,
        "command": result.command.join(" "),
        "exitCode": result.exit_code,
        "success": result.success(),
        "durationMs": result.duration_ms,
        "stdout": result.stdout,
        "stderr": result.stderr,
    })
}

// ============================================================================
// Tool handlers
// ============================================================================

pub fn tool_list_hosts(_args: &Value, config: &Config) -> Result<Value, String> {
    let hosts: Vec<Value> = config
        .hosts
        .iter()
        .map(|(name, target)| json!({ "name": name, "target": target }))
        .collect();
    Ok(json!({ "hosts": hosts, "count": hosts.len() }))
}

pub fn tool_remote_exec(args: &Value, config: &Config) -> Result<Value, String> {
    let host = require_str(args, "host")?;
    let command = require_str(args, "command")?;
    let timeout = validate_timeout(arg_u64(args, "timeout")?, 60)?;
    resolve_host(config, host)?;

    append_audit(
        &config.audit_log_path(),
        "remote_exec",
        json!({ "host": host, "command": command }),
    );
    let result = ssh_exec(config, host, command, timeout)?;
    Ok(ssh_result(host, &result))
}

pub fn tool_remote_system_info(args: &Value, config: &Config) -> Result<Value, String> {
    let host = require_str(args, "host")?;
    resolve_host(config, host)?;

    append_audit(&config.audit_log_path(), "remote_system_info", json!({ "host": host }));
    let result = ssh_exec(
        config,
        host,
        "uname -a; uptime; readlink /run/current-system",
        60,
    )?;
    Ok(ssh_result(host, &result))
}

/// Systemd unit names: alphanumerics plus `@ . _ -`. Anything else is
/// rejected before it reaches a remote shell.
static UNIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9@._-]+$").unwrap());

pub fn tool_remote_journal(args: &Value, config: &Config) -> Result<Value, String> {
    let host = require_str(args, "host")?;
    let lines = arg_u64(args, "lines")?.unwrap_or(100);
    if !(1..=1000).contains(&lines) {
        return Err(format!("lines must be between 1 and 1000, got {}", lines));
    }

    let command = match arg_str(args, "unit")? {
        Some(unit) => {
            if !UNIT_RE.is_match(unit) {
                return Err(format!("Invalid unit name: '{}'", unit));
            }
            format!("journalctl -u {} -n {} --no-pager", unit, lines)
        }
        None => format!("journalctl -n {} --no-pager", lines),
    };
    resolve_host(config, host)?;

    append_audit(
        &config.audit_log_path(),
        "remote_journal",
        json!({ "host": host, "unit": arg_str(args, "unit")?, "lines": lines }),
    );
    let result = ssh_exec(config, host, &command, 60)?;
    Ok(ssh_result(host, &result))
}

pub fn tool_remote_disk_free(args: &Value, config: &Config) -> Result<Value, String> {
    let host = require_str(args, "host")?;
    resolve_host(config, host)?;

    append_audit(&config.audit_log_path(), "remote_disk_free", json!({ "host": host }));
    let result = ssh_exec(config, host, "df -h", 60)?;
    Ok(ssh_result(host, &result))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config
            .hosts
            .insert("router".to_string(), "admin@10.0.0.1".to_string());
        config
    }

    #[test]
    fn test_resolve_allowlisted_host() {
        let config = test_config();
        assert_eq!(resolve_host(&config, "router").unwrap(), "admin@10.0.0.1");
    }

    #[test]
    fn test_resolve_unknown_host_lists_allowlist() {
        let config = test_config();
        let err = resolve_host(&config, "toaster").unwrap_err();
        assert!(err.contains("toaster"));
        assert!(err.contains("router"));
    }

    #[test]
    fn test_list_hosts() {
        let config = test_config();
        let result = tool_list_hosts(&json!({}), &config).unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["hosts"][0]["name"], "router");
    }

    #[test]
    fn test_remote_exec_requires_host_and_command() {
        let config = test_config();
        assert!(tool_remote_exec(&json!({"command": "ls"}), &config)
            .unwrap_err()
            .contains("host"));
        assert!(tool_remote_exec(&json!({"host": "router"}), &config)
            .unwrap_err()
            .contains("command"));
    }

    #[test]
    fn test_remote_exec_unknown_host_refused_without_spawn() {
        let config = test_config();
        let err = tool_remote_exec(&json!({"host": "toaster", "command": "ls"}), &config).unwrap_err();
        assert!(err.contains("Unknown host"));
    }

    #[test]
    fn test_journal_validates_lines_and_unit() {
        let config = test_config();
        let err = tool_remote_journal(&json!({"host": "router", "lines": 0}), &config).unwrap_err();
        assert!(err.contains("lines"));
        let err = tool_remote_journal(&json!({"host": "router", "lines": 1001}), &config).unwrap_err();
        assert!(err.contains("lines"));
        let err =
            tool_remote_journal(&json!({"host": "router", "unit": "sshd; rm -rf /"}), &config).unwrap_err();
        assert!(err.contains("Invalid unit"));
    }

    #[test]
    fn test_inspection_calls_are_audited() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.flake_root = dir.path().to_path_buf();
        // A target that cannot resolve: the ssh attempt fails fast, but the
        // audit record is written for the attempt either way.
        config
            .hosts
            .insert("lab".to_string(), "nobody@nixtap.invalid".to_string());

        let _ = tool_remote_exec(&json!({"host": "lab", "command": "true"}), &config);
        let _ = tool_remote_system_info(&json!({"host": "lab"}), &config);
        let _ = tool_remote_journal(&json!({"host": "lab", "unit": "sshd", "lines": 5}), &config);
        let _ = tool_remote_disk_free(&json!({"host": "lab"}), &config);

        let text = std::fs::read_to_string(config.audit_log_path()).unwrap();
        let records: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["tool"], "remote_exec");
        assert_eq!(records[0]["host"], "lab");
        assert_eq!(records[0]["command"], "true");
        assert_eq!(records[1]["tool"], "remote_system_info");
        assert_eq!(records[2]["tool"], "remote_journal");
        assert_eq!(records[2]["unit"], "sshd");
        assert_eq!(records[2]["lines"], 5);
        assert_eq!(records[3]["tool"], "remote_disk_free");
        assert!(records.iter().all(|r| r["ts"].is_string()));
    }

    #[test]
    fn test_unknown_host_is_not_audited() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.flake_root = dir.path().to_path_buf();

        let _ = tool_remote_disk_free(&json!({"host": "toaster"}), &config);
        assert!(!config.audit_log_path().exists());
    }

    #[test]
    fn test_unit_name_pattern() {
        assert!(UNIT_RE.is_match("sshd.service"));
        assert!(UNIT_RE.is_match("getty@tty1"));
        assert!(!UNIT_RE.is_match("a b"));
        assert!(!UNIT_RE.is_match(""));
    }
}
