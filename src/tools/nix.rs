// src/tools/nix.rs
//
// Wrappers around the local nix toolchain: build, flake check, fmt, eval,
// flake metadata. Output is scraped for `error:` diagnostics with a
// path:line:column location so callers get structured failures instead of a
// wall of text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::exec::{run_command, validate_timeout, ExecResult};

use super::{arg_str, arg_u64, require_str};

// ============================================================================
// Diagnostics scraping
// ============================================================================

/// `path:line:column` as nix prints it under an error header.
static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<path>[^\s:]+):(?P<line>\d+):(?P<col>\d+)").unwrap());

/// How many lines below an `error:` marker may carry the location.
const LOCATION_WINDOW: usize = 4;

/// One scraped diagnostic.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u64>,
}

/// Scan tool output for `error:` marker lines; for each, search the next few
/// lines for a source location.
pub fn scrape_diagnostics(output: &str) -> Vec<Diagnostic> {
    let lines: Vec<&str> = output.lines().collect();
    let mut diagnostics = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.contains("error:") {
            continue;
        }
        let mut diag = Diagnostic {
            message: line.trim().to_string(),
            file: None,
            line: None,
            column: None,
        };
        for follow in lines.iter().skip(i + 1).take(LOCATION_WINDOW) {
            if let Some(caps) = LOCATION_RE.captures(follow) {
                diag.file = Some(caps["path"].to_string());
                diag.line = caps["line"].parse().ok();
                diag.column = caps["col"].parse().ok();
                break;
            }
        }
        diagnostics.push(diag);
    }

    diagnostics
}

// ============================================================================
// Helpers
// ============================================================================

/// Keep only the last `max` chars of tool output so responses stay bounded.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let start = s.len() - max;
    // Don't split a UTF-8 sequence
    let start = (start..s.len()).find(|i| s.is_char_boundary(*i)).unwrap_or(start);
    format!("...{}", &s[start..])
}

const OUTPUT_TAIL: usize = 4000;

fn run_nix(argv: Vec<String>, config: &Config, timeout_secs: u64) -> Result<ExecResult, String> {
    run_command(&argv, &config.flake_root, timeout_secs)
}

fn command_result(result: &ExecResult, diagnostics: Option<Vec<Diagnostic>>) -> Value {
    // Diagnostics are scraped from the full output before tailing, so a
    // truncated response still carries every error location.
    let truncated = result.stdout.len() > OUTPUT_TAIL || result.stderr.len() > OUTPUT_TAIL;
    let mut out = json!({
        "command": result.command.join(" "),
        "exitCode": result.exit_code,
        "success": result.success(),
        "durationMs": result.duration_ms,
        "stdout": tail(&result.stdout, OUTPUT_TAIL),
        "stderr": tail(&result.stderr, OUTPUT_TAIL),
        "truncated": truncated,
    });
    if let Some(diags) = diagnostics {
        out["diagnostics"] = json!(diags);
    }
    out
}

/// Turn an optional attribute into a flake installable.
fn installable(attr: Option<&str>) -> String {
    match attr {
        Some(a) if a.starts_with('.') || a.contains('#') => a.to_string(),
        Some(a) => format!(".#{}", a),
        None => ".".to_string(),
    }
}

// ============================================================================
// Tool handlers
// ============================================================================

pub fn tool_nix_build(args: &Value, config: &Config) -> Result<Value, String> {
    let timeout = validate_timeout(arg_u64(args, "timeout")?, 600)?;
    let target = installable(arg_str(args, "attr")?);
    let argv: Vec<String> = ["nix", "build", "--no-link", &target]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let result = run_nix(argv, config, timeout)?;
    let diagnostics = scrape_diagnostics(&format!("{}\n{}", result.stdout, result.stderr));
    Ok(command_result(&result, Some(diagnostics)))
}

pub fn tool_nix_flake_check(args: &Value, config: &Config) -> Result<Value, String> {
    let timeout = validate_timeout(arg_u64(args, "timeout")?, 600)?;
    let argv: Vec<String> = ["nix", "flake", "check"].iter().map(|s| s.to_string()).collect();

    let result = run_nix(argv, config, timeout)?;
    let diagnostics = scrape_diagnostics(&format!("{}\n{}", result.stdout, result.stderr));
    Ok(command_result(&result, Some(diagnostics)))
}

pub fn tool_nix_fmt(args: &Value, config: &Config) -> Result<Value, String> {
    let timeout = validate_timeout(arg_u64(args, "timeout")?, 120)?;
    let argv: Vec<String> = ["nix", "fmt"].iter().map(|s| s.to_string()).collect();

    let result = run_nix(argv, config, timeout)?;
    Ok(command_result(&result, None))
}

pub fn tool_nix_eval(args: &Value, config: &Config) -> Result<Value, String> {
    let timeout = validate_timeout(arg_u64(args, "timeout")?, 120)?;
    let expr = require_str(args, "expr")?;
    let target = installable(Some(expr));
    let argv: Vec<String> = ["nix", "eval", "--json", &target]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let result = run_nix(argv, config, timeout)?;
    let mut out = command_result(&result, Some(scrape_diagnostics(&result.stderr)));
    if result.success() {
        if let Ok(value) = serde_json::from_str::<Value>(result.stdout.trim()) {
            out["value"] = value;
        }
    }
    Ok(out)
}

pub fn tool_nix_flake_metadata(args: &Value, config: &Config) -> Result<Value, String> {
    let timeout = validate_timeout(arg_u64(args, "timeout")?, 120)?;
    let argv: Vec<String> = ["nix", "flake", "metadata", "--json"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let result = run_nix(argv, config, timeout)?;
    let mut out = command_result(&result, None);
    if result.success() {
        if let Ok(metadata) = serde_json::from_str::<Value>(result.stdout.trim()) {
            out["metadata"] = metadata;
        }
    }
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_error_with_location() {
        let output = "\
evaluating file 'x'
error: undefined variable 'foo'
       at /etc/nixos/hosts/router.nix:42:13:
           41|   services.foo = {
";
        let diags = scrape_diagnostics(output);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "error: undefined variable 'foo'");
        assert_eq!(diags[0].file.as_deref(), Some("/etc/nixos/hosts/router.nix"));
        assert_eq!(diags[0].line, Some(42));
        assert_eq!(diags[0].column, Some(13));
    }

    #[test]
    fn test_scrape_error_without_location() {
        let diags = scrape_diagnostics("error: build of '/nix/store/x.drv' failed\nsome context\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].file.is_none());
    }

    #[test]
    fn test_scrape_location_outside_window_ignored() {
        let output = "error: something\n.\n.\n.\n.\n/etc/nixos/a.nix:1:1\n";
        let diags = scrape_diagnostics(output);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].file.is_none());
    }

    #[test]
    fn test_scrape_multiple_errors() {
        let output = "error: first\n  at a.nix:1:2:\nok line\nerror: second\n  at b.nix:3:4:\n";
        let diags = scrape_diagnostics(output);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].file.as_deref(), Some("a.nix"));
        assert_eq!(diags[1].line, Some(3));
    }

    #[test]
    fn test_scrape_clean_output() {
        assert!(scrape_diagnostics("all good\nwarning: meh\n").is_empty());
    }

    #[test]
    fn test_installable_forms() {
        assert_eq!(installable(None), ".");
        assert_eq!(installable(Some("router")), ".#router");
        assert_eq!(installable(Some(".#router")), ".#router");
        assert_eq!(installable(Some("nixpkgs#hello")), "nixpkgs#hello");
    }

    #[test]
    fn test_tail_bounds_output() {
        assert_eq!(tail("short", 4000), "short");
        let long = "x".repeat(5000);
        let t = tail(&long, 4000);
        assert!(t.starts_with("..."));
        assert_eq!(t.len(), 4003);
    }

    #[test]
    fn test_command_result_flags_truncation() {
        let long = ExecResult {
            command: vec!["nix".to_string(), "build".to_string()],
            exit_code: Some(1),
            stdout: "x".repeat(OUTPUT_TAIL + 100),
            stderr: "error: boom\n  at a.nix:1:2:\n".to_string(),
            duration_ms: 7,
            timed_out: false,
        };
        let out = command_result(&long, Some(scrape_diagnostics(&long.stderr)));
        assert_eq!(out["truncated"], true);
        assert!(out["stdout"].as_str().unwrap().starts_with("..."));
        // Scraping ran on the full text, independent of the tail
        assert_eq!(out["diagnostics"][0]["file"], "a.nix");

        let short = ExecResult {
            stdout: "ok".to_string(),
            stderr: String::new(),
            ..long
        };
        let out = command_result(&short, None);
        assert_eq!(out["truncated"], false);
        assert_eq!(out["stdout"], "ok");
    }

    #[test]
    fn test_eval_requires_expr() {
        let config = Config::default();
        let err = tool_nix_eval(&json!({}), &config).unwrap_err();
        assert!(err.contains("expr"));
    }

    #[test]
    fn test_timeout_validated_before_run() {
        let config = Config::default();
        let err = tool_nix_build(&json!({"timeout": 1}), &config).unwrap_err();
        assert!(err.contains("timeout"));
    }
}
