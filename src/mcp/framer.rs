// src/mcp/framer.rs
//
// Byte-stream framing. Clients speak either LSP-style Content-Length framing
// or bare newline-delimited JSON, sometimes both in the same stream; the
// framer accepts either and resynchronizes on malformed input rather than
// failing the transport. Responses are always bare single-line JSON.

use serde_json::Value;
use std::io::{BufRead, Write};

// ============================================================================
// Decode
// ============================================================================

/// Outcome of one decode step. A `Skip` is consumed garbage; the caller just
/// tries again. `Eof` is terminal and never an error.
#[derive(Debug)]
pub enum Decode {
    Message(Value),
    Skip,
    Eof,
}

/// Consume one line (plus, for header framing, the rest of the envelope) and
/// classify it.
fn decode_step(reader: &mut impl BufRead) -> Decode {
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) | Err(_) => return Decode::Eof,
        Ok(_) => {}
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Decode::Skip;
    }

    if trimmed.to_ascii_lowercase().starts_with("content-length:") {
        // Header framing. An unparsable length discards just this line; the
        // next step resynchronizes on whatever follows.
        let length = match trimmed
            .splitn(2, ':')
            .nth(1)
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            Some(n) => n,
            None => return Decode::Skip,
        };

        // Consume remaining header lines up to the blank separator.
        loop {
            let mut header = String::new();
            match reader.read_line(&mut header) {
                Ok(0) | Err(_) => return Decode::Eof,
                Ok(_) => {}
            }
            if header.trim().is_empty() {
                break;
            }
        }

        let mut body = vec![0u8; length];
        if reader.read_exact(&mut body).is_err() {
            // Truncated body: the stream ended mid-message.
            return Decode::Eof;
        }
        match serde_json::from_slice(&body) {
            Ok(value) => Decode::Message(value),
            Err(_) => Decode::Skip,
        }
    } else if trimmed.starts_with('{') {
        match serde_json::from_str(trimmed) {
            Ok(value) => Decode::Message(value),
            Err(_) => Decode::Skip,
        }
    } else {
        // Foreign header (Content-Type etc.) or stray text
        Decode::Skip
    }
}

/// Read the next message, skipping garbage. `None` means end of stream.
pub fn read_message(reader: &mut impl BufRead) -> Option<Value> {
    loop {
        match decode_step(reader) {
            Decode::Message(value) => return Some(value),
            Decode::Skip => continue,
            Decode::Eof => return None,
        }
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Write one response as compact single-line JSON and flush.
pub fn write_response(writer: &mut impl Write, value: &Value) -> Result<(), String> {
    let line = value.to_string();
    writeln!(writer, "{}", line).map_err(|e| format!("Failed to write response: {}", e))?;
    writer.flush().map_err(|e| format!("Failed to flush response: {}", e))
}

// ============================================================================
// Tests
// ============================================================================
