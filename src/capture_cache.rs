// src/capture_cache.rs
//
// Durable cache of captured serial lines. One JSON record per physical line,
// append-only; line number is append order (1-indexed). Supports regex
// queries and inclusive line-range retrieval. The file is opened, appended,
// and closed per operation so external readers always see a consistent
// append-only view.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

// ============================================================================
// Types
// ============================================================================

/// One cached line of a prior capture, with session metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    /// Capture timestamp (RFC 3339, local time)
    pub ts: String,
    /// Device path the line was captured from
    pub device: String,
    /// Baud rate of the capture session
    pub baud: u32,
    /// Requested capture duration in seconds
    pub seconds: u64,
    /// Requested byte budget
    pub max_bytes: usize,
    /// Bytes actually read by the whole session
    pub bytes_read: usize,
    /// Line content (no trailing newline)
    pub content: String,
    /// Set on the sentinel record of a session that read zero bytes
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty_capture: bool,
}

/// A query hit with its cache position.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMatch {
    pub line_number: usize,
    pub ts: String,
    pub device: String,
    pub baud: u32,
    pub content: String,
}

// ============================================================================
// Append
// ============================================================================

/// Append one capture session to the cache: one record per line of content,
/// or a single `emptyCapture` sentinel when the session read nothing, so a
/// zero-byte capture still occupies a line number.
pub fn append_capture(
    path: &Path,
    device: &str,
    baud: u32,
    seconds: u64,
    max_bytes: usize,
    bytes_read: usize,
    content: &str,
) -> Result<usize, String> {
    let ts = chrono::Local::now().to_rfc3339();
    let make = |content: String, empty_capture: bool| CacheRecord {
        ts: ts.clone(),
        device: device.to_string(),
        baud,
        seconds,
        max_bytes,
        bytes_read,
        content,
        empty_capture,
    };

    let records: Vec<CacheRecord> = if content.is_empty() {
        vec![make(String::new(), true)]
    } else {
        content.lines().map(|l| make(l.to_string(), false)).collect()
    };

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open capture cache {}: {}", path.display(), e))?;

    for record in &records {
        let line = serde_json::to_string(record)
            .map_err(|e| format!("Failed to serialize cache record: {}", e))?;
        writeln!(file, "{}", line)
            .map_err(|e| format!("Failed to append to capture cache: {}", e))?;
    }

    tlog!(
        "[cache] Appended {} record(s) for {} ({} bytes)",
        records.len(),
        device,
        bytes_read
    );
    Ok(records.len())
}

// ============================================================================
// Read
// ============================================================================

/// Parse the whole cache in file order. Blank physical lines and lines that
/// fail to parse are skipped; a missing file is an empty cache.
pub fn read_all(path: &Path) -> Result<Vec<CacheRecord>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read capture cache {}: {}", path.display(), e))?;

    Ok(text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<CacheRecord>(l).ok())
        .collect())
}

// ============================================================================
// Query
// ============================================================================

/// Regex search over the cache, oldest first, stopping at `limit` matches.
/// The pattern is compiled before any file read, so invalid regex syntax is
/// reported without touching the cache.
pub fn query(
    path: &Path,
    pattern: &str,
    case_sensitive: bool,
    device: Option<&str>,
    limit: Option<u64>,
) -> Result<Value, String> {
    let limit = limit.unwrap_or(100);
    if !(1..=2000).contains(&limit) {
        return Err(format!("limit must be between 1 and 2000, got {}", limit));
    }

    let re = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| format!("Invalid regex '{}': {}", pattern, e))?;

    let records = read_all(path)?;
    let mut matches: Vec<CacheMatch> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        if let Some(d) = device {
            if record.device != d {
                continue;
            }
        }
        if re.is_match(&record.content) {
            matches.push(CacheMatch {
                line_number: idx + 1,
                ts: record.ts.clone(),
                device: record.device.clone(),
                baud: record.baud,
                content: record.content.clone(),
            });
            if matches.len() as u64 >= limit {
                break;
            }
        }
    }

    tlog!(
        "[cache] Query '{}' matched {} of {} record(s)",
        pattern,
        matches.len(),
        records.len()
    );
    Ok(json!({
        "pattern": pattern,
        "caseSensitive": case_sensitive,
        "matchCount": matches.len(),
        "totalCacheLines": records.len(),
        "matches": matches,
    }))
}

// ============================================================================
// Range retrieval
// ============================================================================

/// Return the inclusive 1-indexed [start, end] slice of the cache, with both
/// ends clamped to the current record count. An empty cache yields an empty,
/// well-formed result.
pub fn range(path: &Path, start: u64, end: u64) -> Result<Value, String> {
    if start < 1 {
        return Err(format!("start must be >= 1, got {}", start));
    }
    if end < start {
        return Err(format!("end ({}) must be >= start ({})", end, start));
    }
    if end - start + 1 > 5000 {
        return Err(format!(
            "range width must be <= 5000 lines, got {}",
            end - start + 1
        ));
    }

    let records = read_all(path)?;
    let total = records.len();
    if total == 0 {
        return Ok(json!({
            "start": start,
            "end": end,
            "totalCacheLines": 0,
            "lines": [],
        }));
    }

    let clamped_start = (start as usize).min(total);
    let clamped_end = (end as usize).min(total);
    let lines: Vec<Value> = records[clamped_start - 1..clamped_end]
        .iter()
        .enumerate()
        .map(|(i, record)| {
            json!({
                "lineNumber": clamped_start + i,
                "ts": record.ts,
                "device": record.device,
                "baud": record.baud,
                "content": record.content,
                "emptyCapture": record.empty_capture,
            })
        })
        .collect();

    Ok(json!({
        "start": clamped_start,
        "end": clamped_end,
        "totalCacheLines": total,
        "lines": lines,
    }))
}

// ============================================================================
// Tests
// ============================================================================
