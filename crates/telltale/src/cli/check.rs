//! `check` subcommand: validate config, registry and chime assets.

use std::path::Path;

use super::{CheckOutput, Config, Registry, Result, TelltaleError, config_path, load_config};

/// Chimes whose asset file is missing under `chimes_dir`.
fn missing_assets(config: &Config, registry: &Registry) -> Vec<String> {
    if config.chimes_dir.trim().is_empty() {
        return Vec::new();
    }
    let audio = config.audio();
    registry
        .chimes()
        .filter(|c| !audio.asset_exists(&c.asset))
        .map(|c| format!("chime \"{}\" asset not found: {}", c.id, c.asset))
        .collect()
}

/// Every problem with the effective setup, in a stable order.
fn collect_issues(config: &Config) -> Vec<String> {
    let mut issues: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    // validate() already reports a broken registry file
    let registry = match config.registry() {
        Ok(r) => r,
        Err(e) => {
            if config.registry_path.trim().is_empty() {
                issues.push(e.to_string());
            }
            return issues;
        }
    };
    if let Err(found) = registry.validate() {
        issues.extend(found.iter().map(|i| i.to_string()));
    }
    if config.chimes_dir.trim().is_empty() || Path::new(config.chimes_dir.trim()).is_dir() {
        issues.extend(missing_assets(config, &registry));
    }
    issues
}

pub(super) fn cmd_check(json: bool, custom_config: Option<&Path>) -> Result<()> {
    let config = load_config(custom_config);
    let issues = collect_issues(&config);
    let path = config_path(custom_config);

    if json {
        let output = CheckOutput {
            config_file: path.as_ref().map(|p| p.display().to_string()),
            ok: issues.is_empty(),
            issues: issues.clone(),
        };
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| TelltaleError::Config(e.to_string()))?;
        println!("{text}");
    } else if issues.is_empty() {
        println!("OK: configuration, registry and chime assets are valid");
    } else {
        for issue in &issues {
            println!("  - {issue}");
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(TelltaleError::Config(format!("{} issue(s) found", issues.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_issues() {
        assert!(collect_issues(&Config::default()).is_empty());
    }

    #[test]
    fn config_errors_are_collected() {
        let config = Config {
            retrigger_ms: 0,
            volume_scale: 201,
            ..Config::default()
        };
        let issues = collect_issues(&config);
        assert_eq!(issues.len(), 2, "got: {issues:?}");
        assert!(issues[0].contains("retrigger_ms"));
    }

    #[test]
    fn broken_registry_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(&path, "[[indicator]]\ndeck = 1\ncard = 1\nzone = 1\nchime = \"nope\"\n")
            .unwrap();
        let config = Config {
            registry_path: path.display().to_string(),
            ..Config::default()
        };
        let issues = collect_issues(&config);
        assert_eq!(issues.len(), 1, "got: {issues:?}");
        assert!(issues[0].contains("unknown chime"));
    }

    #[test]
    fn missing_assets_listed_when_dir_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("low_fuel.mp3"), b"x").unwrap();
        let config = Config {
            chimes_dir: dir.path().display().to_string(),
            ..Config::default()
        };
        let registry = Registry::builtin();
        let missing = missing_assets(&config, &registry);
        assert_eq!(missing.len(), registry.chimes().count() - 1);
        assert!(missing.iter().all(|m| !m.contains("low_fuel.mp3")));
    }

    #[test]
    fn no_asset_check_without_dir() {
        assert!(missing_assets(&Config::default(), &Registry::builtin()).is_empty());
    }
}
