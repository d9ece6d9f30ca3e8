//! Application configuration: TOML file in the platform config directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::SimulatedAudio;
use crate::engine::Timing;
use crate::error::Result;
use crate::registry::Registry;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# Telltale configuration. Changes made outside the tool may be overwritten.\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Registry TOML file. Empty = built-in cluster table.
    #[serde(default)]
    pub registry_path: String,

    /// Directory chime assets are resolved against. Empty = every asset is
    /// treated as available.
    #[serde(default)]
    pub chimes_dir: String,

    /// Simulated clip length in milliseconds.
    #[serde(default = "default_clip_ms")]
    pub clip_ms: u64,

    /// Cooldown for indicators without an explicit duration.
    #[serde(default = "default_min_cooldown_ms")]
    pub min_cooldown_ms: u64,

    /// Zone cycle interval when no member blinks.
    #[serde(default = "default_zone_interval_ms")]
    pub zone_interval_ms: u64,

    /// Start-to-start interval of continuous chimes.
    #[serde(default = "default_retrigger_ms")]
    pub retrigger_ms: u64,

    /// Percentage applied to every chime volume (0-200).
    #[serde(default = "default_volume_scale")]
    pub volume_scale: u8,
}

fn default_clip_ms() -> u64 {
    1_000
}
fn default_min_cooldown_ms() -> u64 {
    1_000
}
fn default_zone_interval_ms() -> u64 {
    500
}
fn default_retrigger_ms() -> u64 {
    3_000
}
fn default_volume_scale() -> u8 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Config {
            registry_path: String::new(),
            chimes_dir: String::new(),
            clip_ms: default_clip_ms(),
            min_cooldown_ms: default_min_cooldown_ms(),
            zone_interval_ms: default_zone_interval_ms(),
            retrigger_ms: default_retrigger_ms(),
            volume_scale: default_volume_scale(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A millisecond field is zero (`field` names it).
    ZeroInterval(&'static str),
    /// `volume_scale` is above 200.
    VolumeScale(u8),
    /// `registry_path` is set but the file is missing or invalid.
    Registry(String),
    /// `chimes_dir` is set but is not a directory.
    ChimesDir(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroInterval(field) => write!(f, "{field} must be greater than 0"),
            ValidationError::VolumeScale(v) => {
                write!(f, "volume_scale {v} is out of range (0-200)")
            }
            ValidationError::Registry(e) => write!(f, "Invalid registry_path: {e}"),
            ValidationError::ChimesDir(d) => write!(f, "chimes_dir is not a directory: {d}"),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("telltale"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("[config] {w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment is prepended to warn that manual edits may be overwritten.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Engine timing parameters.
    pub fn timing(&self) -> Timing {
        Timing {
            zone_interval_ms: self.zone_interval_ms,
            retrigger_ms: self.retrigger_ms,
            min_cooldown_ms: self.min_cooldown_ms,
            volume_scale: self.volume_scale,
        }
    }

    /// The configured registry, or the built-in table.
    pub fn registry(&self) -> Result<Registry> {
        Registry::load_or_builtin(&self.registry_path)
    }

    /// Simulated audio backend honouring `chimes_dir` and `clip_ms`.
    pub fn audio(&self) -> SimulatedAudio {
        let audio = SimulatedAudio::new(self.clip_ms);
        match self.chimes_dir.trim() {
            "" => audio,
            dir => audio.with_assets_dir(dir),
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("clip_ms", self.clip_ms),
            ("min_cooldown_ms", self.min_cooldown_ms),
            ("zone_interval_ms", self.zone_interval_ms),
            ("retrigger_ms", self.retrigger_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::ZeroInterval(field));
            }
        }

        if self.volume_scale > 200 {
            errors.push(ValidationError::VolumeScale(self.volume_scale));
        }

        if !self.registry_path.trim().is_empty()
            && let Err(e) = self.registry()
        {
            errors.push(ValidationError::Registry(e.to_string()));
        }

        let dir = self.chimes_dir.trim();
        if !dir.is_empty() && !Path::new(dir).is_dir() {
            errors.push(ValidationError::ChimesDir(dir.to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
