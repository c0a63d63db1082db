// src/lib.rs
//
// nixtap: an MCP workbench server for NixOS machines. Exposes build,
// guarded deploy, remote inspection, and serial console capture tools to a
// single client over stdin/stdout.

#[macro_use]
mod logging;

pub mod audit;
pub mod capture_cache;
pub mod config;
pub mod exec;
pub mod mcp;
pub mod serial;
pub mod tools;

pub use config::{default_config_path, load_config, Config};

/// Serve MCP over stdin/stdout until the client closes the stream.
pub fn run(config: &Config) -> Result<(), String> {
    if let Some(dir) = &config.log_dir {
        logging::init_file_logging(&config.resolve(dir))?;
    }

    tlog!(
        "[nixtap] v{} starting (flake root: {}, {} host(s), allow_mutation: {})",
        env!("CARGO_PKG_VERSION"),
        config.flake_root.display(),
        config.hosts.len(),
        config.allow_mutation
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();
    mcp::serve(&mut reader, &mut writer, config)
}
