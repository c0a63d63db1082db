// src/mcp/mod.rs
//
// MCP protocol plumbing: byte-stream framing and the request dispatcher.
// Requests are processed strictly one at a time — a message is fully read,
// dispatched, and answered before the next is read.

pub mod dispatch;
pub mod framer;

pub use dispatch::{handle_message, serve};
pub use framer::{read_message, write_response, Decode};
