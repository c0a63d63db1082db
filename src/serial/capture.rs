// src/serial/capture.rs
//
// Timed, byte-bounded raw capture against a serial console. One capture call
// owns the port exclusively; the handle is dropped on every exit path,
// including read errors. There is no cancellation: a capture always runs to
// its own deadline or byte budget.

use serde_json::{json, Value};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::audit::append_audit;
use crate::capture_cache;
use crate::config::Config;
use crate::tools::{arg_str, arg_u64};

use super::discover::{discover_devices, resolve_device};

// ============================================================================
// Limits
// ============================================================================

/// Baud rates the capture tool accepts. Matches the classic UART rate table;
/// consoles in the field run at 115200 or, on old gear, 9600.
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

const MIN_SECONDS: u64 = 1;
const MAX_SECONDS: u64 = 120;
const MIN_BYTES: u64 = 256;
const MAX_BYTES: u64 = 262_144;

/// Poll ceiling for one read; shortened near the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Read chunk size.
const CHUNK_SIZE: usize = 4096;
/// Bytes shown in the hex preview.
const PREVIEW_BYTES: usize = 256;

// ============================================================================
// Validation
// ============================================================================

fn validate_baud(baud: u64) -> Result<u32, String> {
    let baud = u32::try_from(baud).map_err(|_| format!("Unsupported baud rate: {}", baud))?;
    if SUPPORTED_BAUD_RATES.contains(&baud) {
        Ok(baud)
    } else {
        Err(format!(
            "Unsupported baud rate {} (supported: {:?})",
            baud, SUPPORTED_BAUD_RATES
        ))
    }
}

fn validate_seconds(seconds: u64) -> Result<u64, String> {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(format!(
            "seconds must be between {} and {}, got {}",
            MIN_SECONDS, MAX_SECONDS, seconds
        ))
    }
}

fn validate_max_bytes(max_bytes: u64) -> Result<usize, String> {
    if (MIN_BYTES..=MAX_BYTES).contains(&max_bytes) {
        Ok(max_bytes as usize)
    } else {
        Err(format!(
            "max_bytes must be between {} and {}, got {}",
            MIN_BYTES, MAX_BYTES, max_bytes
        ))
    }
}

// ============================================================================
// Capture session
// ============================================================================

/// Open `device`, flush stale input, optionally transmit `send`, then read
/// until the deadline or the byte budget. The port handle never escapes this
/// function, so it is closed on every return. Note that closing does not
/// reinstate whatever line settings the device had before the session; the
/// port is always configured from scratch (8N1, no flow control) on open.
fn run_session(
    device: &str,
    baud: u32,
    seconds: u64,
    max_bytes: usize,
    send: Option<&str>,
) -> Result<Vec<u8>, String> {
    let mut port = serialport::new(device, baud)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .timeout(POLL_INTERVAL)
        .open()
        .map_err(|e| format!("Failed to open {}: {}", device, e))?;

    // Drop anything buffered before this session started.
    port.clear(ClearBuffer::Input)
        .map_err(|e| format!("Failed to flush {}: {}", device, e))?;

    if let Some(data) = send {
        port.write_all(data.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| format!("Failed to write to {}: {}", device, e))?;
        tlog!("[serial] Sent {} byte(s) to {}", data.len(), device);
    }

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut accumulated: Vec<u8> = Vec::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        if accumulated.len() >= max_bytes {
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        // Never block past the deadline.
        let poll = (deadline - now).min(POLL_INTERVAL);
        let _ = port.set_timeout(poll);

        let budget = (max_bytes - accumulated.len()).min(CHUNK_SIZE);
        match port.read(&mut buf[..budget]) {
            Ok(0) => {}
            Ok(n) => accumulated.extend_from_slice(&buf[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // No data within the poll interval
            }
            Err(e) => return Err(format!("Read error on {}: {}", device, e)),
        }
    }

    Ok(accumulated)
}

/// Hex preview of the first `PREVIEW_BYTES` bytes, for binary inspection.
pub(crate) fn hex_preview(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(PREVIEW_BYTES)])
}

// ============================================================================
// Tool handler
// ============================================================================

/// `serial_capture` tool: validate, pick a device, run one capture session,
/// persist the decoded lines to the capture cache, and return the content.
pub fn tool_serial_capture(args: &Value, config: &Config) -> Result<Value, String> {
    let baud = validate_baud(arg_u64(args, "baud")?.unwrap_or(115_200))?;
    let seconds = validate_seconds(arg_u64(args, "seconds")?.unwrap_or(10))?;
    let max_bytes = validate_max_bytes(arg_u64(args, "max_bytes")?.unwrap_or(65_536))?;
    let send = arg_str(args, "send")?;

    let discovered = discover_devices();
    let device = resolve_device(arg_str(args, "device")?, &discovered)?;

    tlog!(
        "[serial] Capturing from {} at {} baud ({}s, {} byte budget)",
        device,
        baud,
        seconds,
        max_bytes
    );

    let bytes = run_session(&device, baud, seconds, max_bytes, send)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let preview = hex_preview(&bytes);

    let cached = capture_cache::append_capture(
        &config.capture_cache_path(),
        &device,
        baud,
        seconds,
        max_bytes,
        bytes.len(),
        &content,
    )?;

    append_audit(
        &config.audit_log_path(),
        "serial_capture",
        json!({
            "device": device,
            "baud": baud,
            "seconds": seconds,
            "bytesRead": bytes.len(),
        }),
    );

    tlog!("[serial] Captured {} byte(s) from {}", bytes.len(), device);
    Ok(json!({
        "device": device,
        "baud": baud,
        "seconds": seconds,
        "maxBytes": max_bytes,
        "bytesRead": bytes.len(),
        "content": content,
        "previewHex": preview,
        "cacheRecordsAppended": cached,
    }))
}

// ============================================================================
// Tests
// ============================================================================
