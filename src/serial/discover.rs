// src/serial/discover.rs
//
// Candidate serial device discovery. USB serial adapters show up as
// /dev/ttyUSB* (FTDI, CP210x, ...) or /dev/ttyACM* (CDC-ACM); the console
// capture tools only ever talk to those.

use serde_json::{json, Value};
use std::path::Path;

/// Device name prefixes considered console candidates.
const DEVICE_PATTERNS: [&str; 2] = ["ttyUSB", "ttyACM"];

/// Enumerate candidate devices under `/dev`, de-duplicated and sorted.
pub fn discover_devices() -> Vec<String> {
    discover_devices_in(Path::new("/dev"))
}

/// Enumerate candidate devices under an arbitrary directory.
pub fn discover_devices_in(dev_dir: &Path) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dev_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if DEVICE_PATTERNS.iter().any(|p| name.starts_with(p)) {
                found.push(dev_dir.join(name.as_ref()).to_string_lossy().into_owned());
            }
        }
    }

    found.sort();
    found.dedup();
    found
}

/// Pick the capture device: the caller's choice when it is discovered, the
/// first discovered device when no choice was made.
pub fn resolve_device(requested: Option<&str>, discovered: &[String]) -> Result<String, String> {
    match requested {
        Some(dev) => {
            if discovered.iter().any(|d| d == dev) {
                Ok(dev.to_string())
            } else {
                Err(format!(
                    "Device '{}' not found. Discovered devices: {:?}",
                    dev, discovered
                ))
            }
        }
        None => discovered
            .first()
            .cloned()
            .ok_or_else(|| "No serial devices discovered (looked for /dev/ttyUSB*, /dev/ttyACM*)".to_string()),
    }
}

/// `serial_devices` tool: list every discovered candidate device.
pub fn tool_serial_devices(_args: &Value) -> Result<Value, String> {
    let devices = discover_devices();
    tlog!("[serial] Discovered {} device(s)", devices.len());
    Ok(json!({
        "devices": devices,
        "count": devices.len(),
    }))
}

// ============================================================================
// Tests
// ============================================================================
