//! `registry` subcommand: list the indicator and chime tables in effect.

use std::path::Path;

use super::{
    ChimeDefinition, IndicatorJson, Registry, RegistryOutput, Result, TelltaleError, kv, kv_width,
    load_config, or_builtin,
};

fn indicator_rows(registry: &Registry) -> Vec<IndicatorJson> {
    registry
        .indicators()
        .map(|d| IndicatorJson {
            deck: d.id.deck,
            card: d.id.card,
            zone: d.zone.0,
            blink: d.blink.enabled,
            duty_cycle: d.blink.duty_cycle,
            chime: d.chime.clone(),
            duration: d.lifetime.into(),
            image: d.image.clone(),
        })
        .collect()
}

fn chime_flags(chime: &ChimeDefinition) -> String {
    let mut flags = chime.repeat.to_string();
    if chime.parallel {
        flags.push_str(", parallel");
    }
    flags
}

pub(super) fn cmd_registry(toml: bool, json: bool, custom_config: Option<&Path>) -> Result<()> {
    let config = load_config(custom_config);
    let registry = config.registry()?;

    if toml {
        print!("{}", registry.to_toml_string()?);
        return Ok(());
    }

    if json {
        let chimes: Vec<&ChimeDefinition> = registry.chimes().map(|c| &**c).collect();
        let output = RegistryOutput {
            source: or_builtin(&config.registry_path).to_string(),
            indicators: indicator_rows(&registry),
            chimes,
        };
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| TelltaleError::Registry(e.to_string()))?;
        println!("{text}");
        return Ok(());
    }

    let w = kv_width(&["Source:", "Indicators:", "Chimes:"], &[]);
    kv("Source:", or_builtin(&config.registry_path), w);
    kv("Indicators:", registry.len(), w);
    kv("Chimes:", registry.chimes().count(), w);
    println!();

    println!("  {:<8} {:<5} {:<14} {:<18} Duration", "Id", "Zone", "Blink", "Chime");
    for row in indicator_rows(&registry) {
        let blink = if row.blink {
            format!("yes ({:.2})", row.duty_cycle)
        } else {
            "no".to_string()
        };
        let duration = match row.duration {
            d if d < 0 => "indefinite".to_string(),
            0 => "default".to_string(),
            d => format!("{d} s"),
        };
        println!(
            "  {:<8} {:<5} {:<14} {:<18} {duration}",
            format!("{}/{}", row.deck, row.card),
            row.zone,
            blink,
            row.chime.as_deref().unwrap_or("-"),
        );
    }
    println!();

    println!("  {:<18} {:<24} {:<22} Volume", "Chime", "File", "Repeat");
    for chime in registry.chimes() {
        println!(
            "  {:<18} {:<24} {:<22} {}",
            chime.id,
            chime.asset,
            chime_flags(chime),
            chime.volume
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use telltale_lib::registry::RepeatMode;

    #[test]
    fn rows_follow_registry_order() {
        let registry = Registry::builtin();
        let rows = indicator_rows(&registry);
        assert_eq!(rows.len(), registry.len());
        let ids: Vec<(u32, u32)> = rows.iter().map(|r| (r.deck, r.card)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn chime_flags_mark_parallel() {
        let chime = ChimeDefinition {
            id: "turn".into(),
            asset: "turn.mp3".into(),
            repeat: RepeatMode::Continuous,
            gap_ms: 800,
            parallel: true,
            volume: 50,
        };
        assert_eq!(chime_flags(&chime), "continuous, parallel");
    }
}
