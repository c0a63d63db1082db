// src/audit.rs
//
// Append-only audit sink. One JSON object per line: timestamp, tool name,
// and tool-specific context. Written, never read back.

use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

/// Append one audit record. Failures are logged and swallowed so a broken
/// audit path never fails the request that triggered it.
pub fn append_audit(path: &Path, tool: &str, context: Value) {
    let mut record = json!({
        "ts": chrono::Local::now().to_rfc3339(),
        "tool": tool,
    });
    if let (Some(obj), Some(ctx)) = (record.as_object_mut(), context.as_object()) {
        for (k, v) in ctx {
            obj.insert(k.clone(), v.clone());
        }
    }

    let line = record.to_string();
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{}", line));

    if let Err(e) = result {
        tlog!("[audit] Failed to append to {}: {}", path.display(), e);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        append_audit(&path, "deploy_execute", json!({"host": "router", "mode": "switch"}));
        append_audit(&path, "nix_build", json!({"exit_code": 0}));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["tool"], "deploy_execute");
        assert_eq!(first["host"], "router");
        assert!(first["ts"].is_string());
    }

    #[test]
    fn test_bad_path_does_not_panic() {
        append_audit(Path::new("/nonexistent-dir-xyz/audit.jsonl"), "ping", json!({}));
    }
}
