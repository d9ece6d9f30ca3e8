//! `config` subcommand: show current configuration and file paths.

use std::path::Path;

use super::{
    ConfigFilesJson, ConfigOutput, Result, TelltaleError, config_path, kv, kv_indent, kv_width,
    load_config, or_builtin,
};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = load_config(custom_path);
    let config_path = config_path(custom_path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());

    let registry = Some(config.registry_path.trim()).filter(|p| !p.is_empty());
    let registry_exists = registry.is_some_and(|p| Path::new(p).is_file());
    let chimes_dir = Some(config.chimes_dir.trim()).filter(|p| !p.is_empty());
    let chimes_dir_exists = chimes_dir.is_some_and(|p| Path::new(p).is_dir());

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            files: ConfigFilesJson {
                registry: registry.map(str::to_string),
                registry_exists,
                chimes_dir: chimes_dir.map(str::to_string),
                chimes_dir_exists,
            },
            settings: config,
        };
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| TelltaleError::Config(e.to_string()))?;
        println!("{text}");
        return Ok(());
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "clip_ms:",
            "min_cooldown_ms:",
            "zone_interval_ms:",
            "retrigger_ms:",
            "volume_scale:",
            "Registry:",
            "Chimes dir:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("clip_ms:", config.clip_ms, w);
    kv_indent("min_cooldown_ms:", config.min_cooldown_ms, w);
    kv_indent("zone_interval_ms:", config.zone_interval_ms, w);
    kv_indent("retrigger_ms:", config.retrigger_ms, w);
    kv_indent("volume_scale:", format_args!("{}%", config.volume_scale), w);
    println!();

    let status = |exists: bool| if exists { "present" } else { "not found" };
    println!("Files:");
    match registry {
        Some(p) => kv_indent("Registry:", format_args!("{p} ({})", status(registry_exists)), w),
        None => kv_indent("Registry:", or_builtin(""), w),
    }
    match chimes_dir {
        Some(p) => kv_indent(
            "Chimes dir:",
            format_args!("{p} ({})", status(chimes_dir_exists)),
            w,
        ),
        None => kv_indent("Chimes dir:", "(not set, assets not checked)", w),
    }
    Ok(())
}
