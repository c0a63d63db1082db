// src/config.rs
//
// Process-wide configuration, loaded once at startup from a TOML file and
// passed by reference to every component. No hot reload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Root of the flake the build/deploy tools operate on.
    #[serde(default = "default_flake_root")]
    pub flake_root: PathBuf,
    /// Allowlist: host name -> ssh target (e.g. "router" -> "admin@10.0.0.1").
    /// Only hosts listed here are reachable by the remote tools.
    #[serde(default)]
    pub hosts: BTreeMap<String, String>,
    /// Options passed to every ssh invocation.
    #[serde(default = "default_ssh_opts")]
    pub ssh_opts: Vec<String>,
    /// Master switch for mutating deploy modes. Off by default.
    #[serde(default)]
    pub allow_mutation: bool,
    /// Salt mixed into deploy confirmation tokens.
    #[serde(default = "default_confirm_salt")]
    pub confirm_salt: String,
    /// Audit log path (JSON lines). Relative paths resolve under flake_root.
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
    /// Serial capture cache path (JSON lines). Relative paths resolve under flake_root.
    #[serde(default = "default_capture_cache")]
    pub capture_cache: PathBuf,
    /// Directory for file logging. None = stderr only.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_flake_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
fn default_ssh_opts() -> Vec<String> {
    vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ConnectTimeout=10".to_string(),
    ]
}
fn default_confirm_salt() -> String {
    "nixtap".to_string()
}
fn default_audit_log() -> PathBuf {
    PathBuf::from("nixtap-audit.jsonl")
}
fn default_capture_cache() -> PathBuf {
    PathBuf::from("serial-cache.jsonl")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flake_root: default_flake_root(),
            hosts: BTreeMap::new(),
            ssh_opts: default_ssh_opts(),
            allow_mutation: false,
            confirm_salt: default_confirm_salt(),
            audit_log: default_audit_log(),
            capture_cache: default_capture_cache(),
            log_dir: None,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Default config file location: `$XDG_CONFIG_HOME/nixtap/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nixtap")
        .join("config.toml")
}

/// Load configuration from `path`. A missing file yields full defaults;
/// an unreadable or malformed file is an error.
pub fn load_config(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        tlog!("[config] {} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let config: Config =
        toml::from_str(&text).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    tlog!(
        "[config] Loaded {} ({} hosts, allow_mutation: {})",
        path.display(),
        config.hosts.len(),
        config.allow_mutation
    );
    Ok(config)
}

impl Config {
    /// Resolve a configured path against the flake root when relative.
    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.flake_root.join(p)
        }
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.resolve(&self.audit_log)
    }

    pub fn capture_cache_path(&self) -> PathBuf {
        self.resolve(&self.capture_cache)
    }
}

// ============================================================================
// Tests
// ============================================================================
