// src/mcp/dispatch.rs
//
// Request dispatcher. Maps one decoded message to at most one response:
// initialize, tools/list, tools/call, ping, method-not-found; anything under
// the notification prefix gets no response at all. A handler failure becomes
// a per-request protocol error and never takes the serve loop down.

use serde_json::{json, Value};
use std::io::{BufRead, Write};

use crate::config::Config;
use crate::tools;

use super::framer::{read_message, write_response};

// ============================================================================
// Constants
// ============================================================================

const PROTOCOL_VERSION: &str = "2024-11-05";
const NOTIFICATION_PREFIX: &str = "notifications/";

/// JSON-RPC error codes
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const TOOL_ERROR: i64 = -32000;

// ============================================================================
// Dispatch
// ============================================================================

fn result_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

/// Handle one decoded message. `None` means "send nothing" (notifications);
/// everything else produces exactly one response.
pub fn handle_message(msg: &Value, config: &Config) -> Option<Value> {
    let id = msg.get("id").cloned().unwrap_or(Value::Null);
    let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = msg.get("params").cloned().unwrap_or_else(|| json!({}));

    if method.starts_with(NOTIFICATION_PREFIX) {
        return None;
    }

    let response = match method {
        "initialize" => result_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "nixtap",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "tools/list" => result_response(id, json!({ "tools": tools::tool_specs() })),
        "tools/call" => {
            let name = match params.get("name").and_then(|n| n.as_str()) {
                Some(n) => n,
                None => return Some(error_response(id, INVALID_PARAMS, "tools/call requires a tool name")),
            };
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

            tlog!("[mcp] tools/call {}", name);
            match tools::invoke(name, &arguments, config) {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result)
                        .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
                    result_response(
                        id,
                        json!({ "content": [{ "type": "text", "text": text }] }),
                    )
                }
                Err(message) => {
                    tlog!("[mcp] {} failed: {}", name, message);
                    error_response(id, TOOL_ERROR, &message)
                }
            }
        }
        "ping" => result_response(id, json!({})),
        other => error_response(id, METHOD_NOT_FOUND, &format!("method not found: {}", other)),
    };

    Some(response)
}

/// Serve until end of stream: read one message, dispatch, respond, repeat.
pub fn serve(
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    config: &Config,
) -> Result<(), String> {
    tlog!("[mcp] Serving (protocol {})", PROTOCOL_VERSION);
    while let Some(msg) = read_message(reader) {
        if let Some(response) = handle_message(&msg, config) {
            write_response(writer, &response)?;
        }
    }
    tlog!("[mcp] Client closed the stream, shutting down");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn test_initialize_shape() {
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        let response = handle_message(&msg, &config()).unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], "nixtap");
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[test]
    fn test_notification_gets_no_response() {
        let msg = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(handle_message(&msg, &config()).is_none());
    }

    #[test]
    fn test_tools_list_names_all_sixteen() {
        let msg = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
        let response = handle_message(&msg, &config()).unwrap();
        let list = response["result"]["tools"].as_array().unwrap();
        assert_eq!(list.len(), 16);
        assert!(list.iter().any(|t| t["name"] == "serial_capture"));
        assert!(list.iter().any(|t| t["name"] == "deploy_plan"));
    }

    #[test]
    fn test_ping() {
        let msg = json!({"jsonrpc": "2.0", "id": 3, "method": "ping"});
        let response = handle_message(&msg, &config()).unwrap();
        assert_eq!(response["result"], json!({}));
    }

    #[test]
    fn test_unknown_method() {
        let msg = json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"});
        let response = handle_message(&msg, &config()).unwrap();
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn test_unknown_tool_is_error_not_crash() {
        let msg = json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "frobnicate", "arguments": {}}
        });
        let response = handle_message(&msg, &config()).unwrap();
        assert_eq!(response["error"]["code"], TOOL_ERROR);
        assert!(response["error"]["message"].as_str().unwrap().contains("unknown tool"));
    }

    #[test]
    fn test_tools_call_missing_name() {
        let msg = json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {}});
        let response = handle_message(&msg, &config()).unwrap();
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_tool_result_wrapped_as_pretty_text_content() {
        let msg = json!({
            "jsonrpc": "2.0", "id": 7, "method": "tools/call",
            "params": {"name": "list_hosts", "arguments": {}}
        });
        let response = handle_message(&msg, &config()).unwrap();
        let content = &response["result"]["content"][0];
        assert_eq!(content["type"], "text");
        let inner: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        assert_eq!(inner["count"], 0);
    }

    #[test]
    fn test_serve_one_response_per_request() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\
{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\
junk line\n\
{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"nope\"}\n";
        let mut reader = Cursor::new(input.to_vec());
        let mut out: Vec<u8> = Vec::new();
        serve(&mut reader, &mut out, &config()).unwrap();

        let text = String::from_utf8(out).unwrap();
        let responses: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0].get("result").is_some());
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn test_serve_header_framed_request() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let input = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut reader = Cursor::new(input.into_bytes());
        let mut out: Vec<u8> = Vec::new();
        serve(&mut reader, &mut out, &config()).unwrap();

        let text = String::from_utf8(out).unwrap();
        let response: Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(response["id"], 1);
    }
}
