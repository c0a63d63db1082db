// src/tools/mod.rs
//
// Fixed tool surface. Every tool the server exposes is a variant of `Tool`;
// `tool_specs` describes the surface for tools/list and `invoke` routes a
// tools/call to its handler. There is no runtime registration.

pub mod deploy;
pub mod nix;
pub mod remote;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;

// ============================================================================
// Registry
// ============================================================================

/// Closed enumeration of the 16 exposed tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    NixBuild,
    NixFlakeCheck,
    NixFmt,
    NixEval,
    NixFlakeMetadata,
    DeployPlan,
    DeployExecute,
    ListHosts,
    RemoteExec,
    RemoteSystemInfo,
    RemoteJournal,
    RemoteDiskFree,
    SerialDevices,
    SerialCapture,
    SerialCacheQuery,
    SerialCacheRange,
}

impl Tool {
    pub const ALL: [Tool; 16] = [
        Tool::NixBuild,
        Tool::NixFlakeCheck,
        Tool::NixFmt,
        Tool::NixEval,
        Tool::NixFlakeMetadata,
        Tool::DeployPlan,
        Tool::DeployExecute,
        Tool::ListHosts,
        Tool::RemoteExec,
        Tool::RemoteSystemInfo,
        Tool::RemoteJournal,
        Tool::RemoteDiskFree,
        Tool::SerialDevices,
        Tool::SerialCapture,
        Tool::SerialCacheQuery,
        Tool::SerialCacheRange,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::NixBuild => "nix_build",
            Tool::NixFlakeCheck => "nix_flake_check",
            Tool::NixFmt => "nix_fmt",
            Tool::NixEval => "nix_eval",
            Tool::NixFlakeMetadata => "nix_flake_metadata",
            Tool::DeployPlan => "deploy_plan",
            Tool::DeployExecute => "deploy_execute",
            Tool::ListHosts => "list_hosts",
            Tool::RemoteExec => "remote_exec",
            Tool::RemoteSystemInfo => "remote_system_info",
            Tool::RemoteJournal => "remote_journal",
            Tool::RemoteDiskFree => "remote_disk_free",
            Tool::SerialDevices => "serial_devices",
            Tool::SerialCapture => "serial_capture",
            Tool::SerialCacheQuery => "serial_cache_query",
            Tool::SerialCacheRange => "serial_cache_range",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.iter().copied().find(|t| t.name() == name)
    }
}

/// Static tool descriptor, as presented by tools/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Invoke `name` with `arguments`. Unknown names and handler failures come
/// back as `Err`; the dispatcher turns those into protocol errors.
pub fn invoke(name: &str, args: &Value, config: &Config) -> Result<Value, String> {
    let tool = Tool::from_name(name).ok_or_else(|| format!("unknown tool: {}", name))?;
    match tool {
        Tool::NixBuild => nix::tool_nix_build(args, config),
        Tool::NixFlakeCheck => nix::tool_nix_flake_check(args, config),
        Tool::NixFmt => nix::tool_nix_fmt(args, config),
        Tool::NixEval => nix::tool_nix_eval(args, config),
        Tool::NixFlakeMetadata => nix::tool_nix_flake_metadata(args, config),
        Tool::DeployPlan => deploy::tool_deploy_plan(args, config),
        Tool::DeployExecute => deploy::tool_deploy_execute(args, config),
        Tool::ListHosts => remote::tool_list_hosts(args, config),
        Tool::RemoteExec => remote::tool_remote_exec(args, config),
        Tool::RemoteSystemInfo => remote::tool_remote_system_info(args, config),
        Tool::RemoteJournal => remote::tool_remote_journal(args, config),
        Tool::RemoteDiskFree => remote::tool_remote_disk_free(args, config),
        Tool::SerialDevices => crate::serial::tool_serial_devices(args),
        Tool::SerialCapture => crate::serial::tool_serial_capture(args, config),
        Tool::SerialCacheQuery => tool_serial_cache_query(args, config),
        Tool::SerialCacheRange => tool_serial_cache_range(args, config),
    }
}

// ============================================================================
// Cache tool handlers
// ============================================================================

fn tool_serial_cache_query(args: &Value, config: &Config) -> Result<Value, String> {
    let pattern = require_str(args, "pattern")?;
    let case_sensitive = arg_bool_default(args, "case_sensitive", true)?;
    let device = arg_str(args, "device")?;
    let limit = arg_u64(args, "limit")?;
    crate::capture_cache::query(
        &config.capture_cache_path(),
        pattern,
        case_sensitive,
        device,
        limit,
    )
}

fn tool_serial_cache_range(args: &Value, config: &Config) -> Result<Value, String> {
    let start = arg_u64(args, "start")?.ok_or("Missing required argument: start")?;
    let end = arg_u64(args, "end")?.ok_or("Missing required argument: end")?;
    crate::capture_cache::range(&config.capture_cache_path(), start, end)
}

// ============================================================================
// Tool specs
// ============================================================================

/// The static tool list, one spec per `Tool` variant, in `Tool::ALL` order.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "nix_build",
            "Build a flake attribute with `nix build` and report diagnostics",
            json!({
                "type": "object",
                "properties": {
                    "attr": { "type": "string", "description": "Flake attribute (default: the default package)" },
                    "timeout": { "type": "number", "description": "Timeout in seconds (10-3600, default 600)" }
                }
            }),
        ),
        ToolSpec::new(
            "nix_flake_check",
            "Run `nix flake check` and report diagnostics",
            json!({
                "type": "object",
                "properties": {
                    "timeout": { "type": "number", "description": "Timeout in seconds (10-3600, default 600)" }
                }
            }),
        ),
        ToolSpec::new(
            "nix_fmt",
            "Format the flake tree with `nix fmt`",
            json!({
                "type": "object",
                "properties": {
                    "timeout": { "type": "number", "description": "Timeout in seconds (10-3600, default 120)" }
                }
            }),
        ),
        ToolSpec::new(
            "nix_eval",
            "Evaluate a Nix expression against the flake",
            json!({
                "type": "object",
                "properties": {
                    "expr": { "type": "string", "description": "Expression or attribute to evaluate" },
                    "timeout": { "type": "number", "description": "Timeout in seconds (10-3600, default 120)" }
                },
                "required": ["expr"]
            }),
        ),
        ToolSpec::new(
            "nix_flake_metadata",
            "Show flake metadata (inputs, locked revisions) as JSON",
            json!({
                "type": "object",
                "properties": {
                    "timeout": { "type": "number", "description": "Timeout in seconds (10-3600, default 120)" }
                }
            }),
        ),
        ToolSpec::new(
            "deploy_plan",
            "Plan a nixos-rebuild deployment: shows the command and the confirmation token, executes nothing",
            json!({
                "type": "object",
                "properties": {
                    "host": { "type": "string", "description": "Allowlisted host name" },
                    "mode": { "type": "string", "enum": ["switch", "boot", "test"], "description": "nixos-rebuild mode" }
                },
                "required": ["host", "mode"]
            }),
        ),
        ToolSpec::new(
            "deploy_execute",
            "Execute a planned deployment. Requires the confirmation token from deploy_plan; switch/boot also require allow_mutation",
            json!({
                "type": "object",
                "properties": {
                    "host": { "type": "string", "description": "Allowlisted host name" },
                    "mode": { "type": "string", "enum": ["switch", "boot", "test"], "description": "nixos-rebuild mode" },
                    "confirmation": { "type": "string", "description": "Token returned by deploy_plan" },
                    "timeout": { "type": "number", "description": "Timeout in seconds (10-3600, default 1800)" }
                },
                "required": ["host", "mode", "confirmation"]
            }),
        ),
        ToolSpec::new(
            "list_hosts",
            "List allowlisted remote hosts",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolSpec::new(
            "remote_exec",
            "Run one command on an allowlisted host over ssh and return its output",
            json!({
                "type": "object",
                "properties": {
                    "host": { "type": "string", "description": "Allowlisted host name" },
                    "command": { "type": "string", "description": "Remote command line" },
                    "timeout": { "type": "number", "description": "Timeout in seconds (10-3600, default 60)" }
                },
                "required": ["host", "command"]
            }),
        ),
        ToolSpec::new(
            "remote_system_info",
            "Kernel, uptime, and current system generation of an allowlisted host",
            json!({
                "type": "object",
                "properties": {
                    "host": { "type": "string", "description": "Allowlisted host name" }
                },
                "required": ["host"]
            }),
        ),
        ToolSpec::new(
            "remote_journal",
            "Tail the journal of an allowlisted host",
            json!({
                "type": "object",
                "properties": {
                    "host": { "type": "string", "description": "Allowlisted host name" },
                    "unit": { "type": "string", "description": "Systemd unit (optional, whole journal when omitted)" },
                    "lines": { "type": "number", "description": "Lines to tail (1-1000, default 100)" }
                },
                "required": ["host"]
            }),
        ),
        ToolSpec::new(
            "remote_disk_free",
            "Filesystem usage (`df -h`) of an allowlisted host",
            json!({
                "type": "object",
                "properties": {
                    "host": { "type": "string", "description": "Allowlisted host name" }
                },
                "required": ["host"]
            }),
        ),
        ToolSpec::new(
            "serial_devices",
            "List discovered serial console devices (/dev/ttyUSB*, /dev/ttyACM*)",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolSpec::new(
            "serial_capture",
            "Capture raw output from a serial console for a bounded time and byte budget; lines land in the capture cache",
            json!({
                "type": "object",
                "properties": {
                    "device": { "type": "string", "description": "Device path (default: first discovered)" },
                    "baud": { "type": "number", "enum": [9600, 19200, 38400, 57600, 115200], "description": "Baud rate (default 115200)" },
                    "seconds": { "type": "number", "description": "Capture duration in seconds (1-120, default 10)" },
                    "max_bytes": { "type": "number", "description": "Byte budget (256-262144, default 65536)" },
                    "send": { "type": "string", "description": "Bytes to write to the device before reading" }
                }
            }),
        ),
        ToolSpec::new(
            "serial_cache_query",
            "Regex search over previously captured serial lines",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regular expression" },
                    "case_sensitive": { "type": "boolean", "description": "Default true" },
                    "device": { "type": "string", "description": "Restrict to one device" },
                    "limit": { "type": "number", "description": "Max matches (1-2000, default 100)" }
                },
                "required": ["pattern"]
            }),
        ),
        ToolSpec::new(
            "serial_cache_range",
            "Retrieve an inclusive 1-indexed line range from the capture cache",
            json!({
                "type": "object",
                "properties": {
                    "start": { "type": "number", "description": "First line (>= 1)" },
                    "end": { "type": "number", "description": "Last line (>= start, window <= 5000)" }
                },
                "required": ["start", "end"]
            }),
        ),
    ]
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Optional string argument; present-but-wrong-type is an error.
pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(format!("Argument '{}' must be a string, got: {}", key, other)),
    }
}

/// Required string argument.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    arg_str(args, key)?.ok_or_else(|| format!("Missing required argument: {}", key))
}

/// Optional non-negative integer argument.
pub(crate) fn arg_u64(args: &Value, key: &str) -> Result<Option<u64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("Argument '{}' must be a non-negative integer, got: {}", key, v)),
    }
}

/// Optional boolean argument with a default.
pub(crate) fn arg_bool_default(args: &Value, key: &str, default: bool) -> Result<bool, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(format!("Argument '{}' must be a boolean, got: {}", key, other)),
    }
}

// ============================================================================
// Tests
// ============================================================================
