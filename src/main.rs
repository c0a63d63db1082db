// src/main.rs
//
// CLI entry point. Parses flags, loads the config, and hands off to the
// serve loop in the library crate.

use clap::Parser;
use std::path::PathBuf;

use nixtap_lib::{default_config_path, load_config};

#[derive(Parser)]
#[command(name = "nixtap", version, about = "MCP workbench server for NixOS")]
struct Cli {
    /// Config file path (default: $XDG_CONFIG_HOME/nixtap/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the flake root from the config
    #[arg(long)]
    flake_root: Option<PathBuf>,

    /// Allow mutating deploy modes (switch/boot) for this run
    #[arg(long)]
    allow_mutation: bool,

    /// Mirror logs into this directory in addition to stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("nixtap: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(root) = cli.flake_root {
        config.flake_root = root;
    }
    if cli.allow_mutation {
        config.allow_mutation = true;
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = Some(dir);
    }

    if let Err(e) = nixtap_lib::run(&config) {
        eprintln!("nixtap: {}", e);
        std::process::exit(1);
    }
}
