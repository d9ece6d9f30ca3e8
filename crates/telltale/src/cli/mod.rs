//! CLI subcommands: scenario replay, registry listing, validation, config.

mod check;
mod config_cmd;
mod registry;
mod run;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use telltale_lib::command::Script;
pub(super) use telltale_lib::config::Config;
pub(super) use telltale_lib::error::{Result, TelltaleError};
pub(super) use telltale_lib::registry::{ChimeDefinition, Registry};
pub(super) use telltale_lib::sim::{self, Summary};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Load the config from `custom` if given, else the platform default.
/// Parse problems are logged and fall back to defaults.
pub(super) fn load_config(custom: Option<&Path>) -> Config {
    match custom {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("[config] {w}");
            }
            config
        }
        None => Config::load(),
    }
}

/// Config file actually in effect.
pub(super) fn config_path(custom: Option<&Path>) -> Option<PathBuf> {
    custom.map(Path::to_path_buf).or_else(Config::path)
}

/// `"(built-in)"` for an empty path setting.
pub(super) fn or_builtin(path: &str) -> &str {
    if path.trim().is_empty() {
        "(built-in)"
    } else {
        path
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct RunSummaryJson {
    pub summary: Summary,
}

#[derive(Serialize)]
pub(super) struct IndicatorJson {
    pub deck: u32,
    pub card: u32,
    pub zone: u32,
    pub blink: bool,
    pub duty_cycle: f64,
    pub chime: Option<String>,
    pub duration: i64,
    pub image: String,
}

#[derive(Serialize)]
pub(super) struct RegistryOutput<'a> {
    pub source: String,
    pub indicators: Vec<IndicatorJson>,
    pub chimes: Vec<&'a ChimeDefinition>,
}

#[derive(Serialize)]
pub(super) struct CheckOutput {
    pub config_file: Option<String>,
    pub ok: bool,
    pub issues: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub files: ConfigFilesJson,
}

#[derive(Serialize)]
pub(super) struct ConfigFilesJson {
    pub registry: Option<String>,
    pub registry_exists: bool,
    pub chimes_dir: Option<String>,
    pub chimes_dir_exists: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a timed scenario script and print every emitted event
    Run {
        /// Script file: one `<at_ms> <command>` per line
        script: PathBuf,
        /// Stop the clock at this time (default: last command + 15 s)
        #[arg(long, value_name = "MS")]
        until: Option<u64>,
        /// Pace the virtual clock against the wall clock
        #[arg(long)]
        realtime: bool,
    },

    /// List indicator and chime definitions
    Registry {
        /// Print the registry in its TOML file format
        #[arg(long)]
        toml: bool,
    },

    /// Validate config, registry and chime assets
    Check,

    /// Show current configuration and file paths
    Config,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Run {
            script,
            until,
            realtime,
        } => run::cmd_run(&script, until, realtime, json, config),
        Command::Registry { toml } => {
            if toml && json {
                warn_json_unsupported("registry --toml");
            }
            registry::cmd_registry(toml, json, config)
        }
        Command::Check => check::cmd_check(json, config),
        Command::Config => config_cmd::cmd_config(json, config),
    }
}
