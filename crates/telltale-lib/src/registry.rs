//! Indicator registry: immutable id to definition lookup.
//!
//! Definitions are loaded once, either from the built-in cluster table or
//! from a TOML file with `[[chime]]` and `[[indicator]]` tables, and are
//! shared read-only with the rest of the engine through `Arc`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelltaleError};

/// Telltale identity: `(deck, card)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndicatorId {
    pub deck: u32,
    pub card: u32,
}

impl IndicatorId {
    pub const fn new(deck: u32, card: u32) -> Self {
        Self { deck, card }
    }
}

impl fmt::Display for IndicatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.deck, self.card)
    }
}

/// Screen region that shows one telltale at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u32);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Blink configuration. One blink period is one second; `duty_cycle` is the
/// lit fraction of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlinkSpec {
    pub enabled: bool,
    pub duty_cycle: f64,
}

impl BlinkSpec {
    pub const fn steady(duty_cycle: f64) -> Self {
        Self {
            enabled: false,
            duty_cycle,
        }
    }

    pub const fn blinking(duty_cycle: f64) -> Self {
        Self {
            enabled: true,
            duty_cycle,
        }
    }

    /// Lit time per period, `round(1000 * duty_cycle)` ms.
    pub fn on_ms(&self) -> u64 {
        (1000.0 * self.duty_cycle.clamp(0.0, 1.0)).round() as u64
    }

    /// Dark time per period.
    pub fn off_ms(&self) -> u64 {
        1000 - self.on_ms()
    }

    /// Whether a blink timer is needed. A duty cycle of 0 or 1 never toggles.
    pub fn toggles(&self) -> bool {
        let on = self.on_ms();
        self.enabled && on > 0 && on < 1000
    }
}

/// How often a chime plays per activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Once,
    Twice,
    Continuous,
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatMode::Once => write!(f, "once"),
            RepeatMode::Twice => write!(f, "twice"),
            RepeatMode::Continuous => write!(f, "continuous"),
        }
    }
}

fn default_gap_ms() -> u64 {
    800
}

fn default_volume() -> u8 {
    50
}

/// Audible notification definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChimeDefinition {
    pub id: String,
    /// Asset reference, resolved by the audio backend.
    #[serde(rename = "file")]
    pub asset: String,
    #[serde(default)]
    pub repeat: RepeatMode,
    /// Pause between the two plays of a `twice` chime.
    #[serde(default = "default_gap_ms")]
    pub gap_ms: u64,
    /// Privileged class: plays on the parallel channel, never queued.
    #[serde(default)]
    pub parallel: bool,
    /// 0-100.
    #[serde(default = "default_volume")]
    pub volume: u8,
}

/// Indicator lifetime, encoded on disk as `duration` seconds
/// (`-1` indefinite, `0` default, `> 0` explicit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Lifetime {
    /// Stays active (and a continuous chime repeats) until deactivated.
    Indefinite,
    /// No auto-deactivation; chime cooldown falls back to the minimum.
    Default,
    /// Explicit lifetime and chime cooldown.
    Seconds(u32),
}

impl From<i64> for Lifetime {
    fn from(seconds: i64) -> Self {
        match seconds {
            s if s < 0 => Lifetime::Indefinite,
            0 => Lifetime::Default,
            s => Lifetime::Seconds(s.min(u32::MAX as i64) as u32),
        }
    }
}

impl From<Lifetime> for i64 {
    fn from(l: Lifetime) -> Self {
        match l {
            Lifetime::Indefinite => -1,
            Lifetime::Default => 0,
            Lifetime::Seconds(s) => s as i64,
        }
    }
}

impl Lifetime {
    /// Delay of the lifetime timer, if one is armed at activation.
    pub fn timer_ms(&self) -> Option<u64> {
        match self {
            Lifetime::Seconds(s) => Some(*s as u64 * 1000),
            _ => None,
        }
    }

    /// Normal-channel cooldown after the last play of a once/twice chime.
    pub fn cooldown_ms(&self, min_cooldown_ms: u64) -> u64 {
        self.timer_ms()
            .map(|ms| ms.max(min_cooldown_ms))
            .unwrap_or(min_cooldown_ms)
    }
}

/// Immutable telltale definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDefinition {
    pub id: IndicatorId,
    pub zone: ZoneId,
    pub blink: BlinkSpec,
    /// Chime id, resolved through [`Registry::chime_for`].
    pub chime: Option<String>,
    pub lifetime: Lifetime,
    /// Image asset, passed through to the rendering layer.
    pub image: String,
}

// ── File format ──

fn default_duty_cycle() -> f64 {
    0.5
}

#[derive(Debug, Serialize, Deserialize)]
struct IndicatorEntry {
    deck: u32,
    card: u32,
    zone: u32,
    #[serde(default)]
    blink: bool,
    #[serde(default = "default_duty_cycle")]
    duty_cycle: f64,
    #[serde(default)]
    chime: Option<String>,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    image: String,
}

impl From<IndicatorEntry> for IndicatorDefinition {
    fn from(e: IndicatorEntry) -> Self {
        IndicatorDefinition {
            id: IndicatorId::new(e.deck, e.card),
            zone: ZoneId(e.zone),
            blink: BlinkSpec {
                enabled: e.blink,
                duty_cycle: e.duty_cycle,
            },
            chime: e.chime.filter(|c| !c.trim().is_empty()),
            lifetime: e.duration.into(),
            image: e.image,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "chime")]
    chimes: Vec<ChimeDefinition>,
    #[serde(default, rename = "indicator")]
    indicators: Vec<IndicatorEntry>,
}

/// Problems [`Registry::validate`] and the file loader can report.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryIssue {
    DuplicateIndicator(IndicatorId),
    DuplicateChime(String),
    UnknownChime { indicator: IndicatorId, chime: String },
    InvalidDutyCycle { indicator: IndicatorId, duty_cycle: f64 },
    /// `blink = true` with a duty cycle that is never lit.
    DarkBlink(IndicatorId),
    ZeroGap(String),
    InvalidVolume { chime: String, volume: u8 },
}

impl fmt::Display for RegistryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryIssue::DuplicateIndicator(id) => write!(f, "duplicate indicator {id}"),
            RegistryIssue::DuplicateChime(id) => write!(f, "duplicate chime \"{id}\""),
            RegistryIssue::UnknownChime { indicator, chime } => {
                write!(f, "indicator {indicator} references unknown chime \"{chime}\"")
            }
            RegistryIssue::InvalidDutyCycle {
                indicator,
                duty_cycle,
            } => write!(
                f,
                "indicator {indicator} has duty cycle {duty_cycle} (expected 0..=1)"
            ),
            RegistryIssue::DarkBlink(id) => {
                write!(f, "indicator {id} blinks with a zero duty cycle")
            }
            RegistryIssue::ZeroGap(id) => write!(f, "chime \"{id}\" has a zero repeat gap"),
            RegistryIssue::InvalidVolume { chime, volume } => {
                write!(f, "chime \"{chime}\" has volume {volume} (expected 0..=100)")
            }
        }
    }
}

/// Read-only map from indicator id to definition, plus the chime table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    indicators: BTreeMap<IndicatorId, Arc<IndicatorDefinition>>,
    chimes: BTreeMap<String, Arc<ChimeDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chime definition, replacing any previous one with the same id.
    pub fn insert_chime(&mut self, chime: ChimeDefinition) {
        self.chimes.insert(chime.id.clone(), Arc::new(chime));
    }

    /// Add an indicator definition, replacing any previous one with the same id.
    pub fn insert_indicator(&mut self, def: IndicatorDefinition) {
        self.indicators.insert(def.id, Arc::new(def));
    }

    pub fn lookup(&self, id: IndicatorId) -> Result<Arc<IndicatorDefinition>> {
        self.indicators
            .get(&id)
            .cloned()
            .ok_or(TelltaleError::UnknownIndicator(id))
    }

    pub fn contains(&self, id: IndicatorId) -> bool {
        self.indicators.contains_key(&id)
    }

    pub fn chime(&self, id: &str) -> Option<Arc<ChimeDefinition>> {
        self.chimes.get(id).cloned()
    }

    /// The chime an indicator requests, if it names one that exists.
    pub fn chime_for(&self, def: &IndicatorDefinition) -> Option<Arc<ChimeDefinition>> {
        def.chime.as_deref().and_then(|c| self.chime(c))
    }

    /// Indicator definitions in `(deck, card)` order.
    pub fn indicators(&self) -> impl Iterator<Item = &Arc<IndicatorDefinition>> {
        self.indicators.values()
    }

    pub fn chimes(&self) -> impl Iterator<Item = &Arc<ChimeDefinition>> {
        self.chimes.values()
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Check cross-references and value ranges. Collects every issue.
    pub fn validate(&self) -> std::result::Result<(), Vec<RegistryIssue>> {
        let mut issues = Vec::new();

        for chime in self.chimes.values() {
            if chime.repeat == RepeatMode::Twice && chime.gap_ms == 0 {
                issues.push(RegistryIssue::ZeroGap(chime.id.clone()));
            }
            if chime.volume > 100 {
                issues.push(RegistryIssue::InvalidVolume {
                    chime: chime.id.clone(),
                    volume: chime.volume,
                });
            }
        }

        for def in self.indicators.values() {
            if !(0.0..=1.0).contains(&def.blink.duty_cycle) {
                issues.push(RegistryIssue::InvalidDutyCycle {
                    indicator: def.id,
                    duty_cycle: def.blink.duty_cycle,
                });
            } else if def.blink.enabled && def.blink.on_ms() == 0 {
                issues.push(RegistryIssue::DarkBlink(def.id));
            }
            if let Some(ref chime) = def.chime
                && !self.chimes.contains_key(chime)
            {
                issues.push(RegistryIssue::UnknownChime {
                    indicator: def.id,
                    chime: chime.clone(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Parse a registry from TOML text and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: RegistryFile =
            toml::from_str(s).map_err(|e| TelltaleError::Registry(e.to_string()))?;

        let mut issues = Vec::new();
        let mut registry = Registry::new();

        let mut seen_chimes = HashSet::new();
        for chime in file.chimes {
            if !seen_chimes.insert(chime.id.clone()) {
                issues.push(RegistryIssue::DuplicateChime(chime.id.clone()));
            }
            registry.insert_chime(chime);
        }

        let mut seen = HashSet::new();
        for entry in file.indicators {
            let def = IndicatorDefinition::from(entry);
            if !seen.insert(def.id) {
                issues.push(RegistryIssue::DuplicateIndicator(def.id));
            }
            registry.insert_indicator(def);
        }

        if let Err(more) = registry.validate() {
            issues.extend(more);
        }
        if !issues.is_empty() {
            let joined: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
            return Err(TelltaleError::Registry(joined.join("; ")));
        }
        Ok(registry)
    }

    /// Load a registry file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load from `path`, or the built-in table when the path is empty.
    pub fn load_or_builtin(path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            Ok(Self::builtin())
        } else {
            Self::load(Path::new(path))
        }
    }

    /// Serialize back to the TOML file format.
    pub fn to_toml_string(&self) -> Result<String> {
        let file = RegistryFile {
            chimes: self.chimes.values().map(|c| (**c).clone()).collect(),
            indicators: self
                .indicators
                .values()
                .map(|d| IndicatorEntry {
                    deck: d.id.deck,
                    card: d.id.card,
                    zone: d.zone.0,
                    blink: d.blink.enabled,
                    duty_cycle: d.blink.duty_cycle,
                    chime: d.chime.clone(),
                    duration: d.lifetime.into(),
                    image: d.image.clone(),
                })
                .collect(),
        };
        toml::to_string_pretty(&file).map_err(|e| TelltaleError::Registry(e.to_string()))
    }

    /// The instrument-cluster table: telltale decks 51-61 across zones 1-7.
    pub fn builtin() -> Self {
        let mut r = Registry::new();

        for (id, file, repeat, parallel) in BUILTIN_CHIMES {
            r.insert_chime(ChimeDefinition {
                id: (*id).into(),
                asset: (*file).into(),
                repeat: *repeat,
                gap_ms: default_gap_ms(),
                parallel: *parallel,
                volume: default_volume(),
            });
        }

        for &(deck, card, zone, blink, duty, chime, duration, image) in BUILTIN_TELLTALES {
            r.insert_indicator(IndicatorDefinition {
                id: IndicatorId::new(deck, card),
                zone: ZoneId(zone),
                blink: BlinkSpec {
                    enabled: blink,
                    duty_cycle: duty,
                },
                chime: chime.map(String::from),
                lifetime: duration.into(),
                image: image.into(),
            });
        }
        r
    }
}

use RepeatMode::{Continuous, Once, Twice};

/// `(id, file, repeat, parallel)`
const BUILTIN_CHIMES: &[(&str, &str, RepeatMode, bool)] = &[
    ("blinker", "blinker.mp3", Continuous, true),
    ("door_ajar", "door_ajar.mp3", Once, false),
    ("parking_brake_engaged", "parking_brake_engaged.mp3", Once, false),
    ("engine_check", "engine_check.mp3", Twice, false),
    ("low_fuel", "low_fuel.mp3", Once, false),
    ("tire_pressure_warning", "tire_pressure_warning.mp3", Once, false),
    ("jeep_door_open", "jeep_door_open.mp3", Once, false),
    ("jeep_key_left_in_ignition", "jeep_key_left_in_ignition.mp3", Once, false),
    ("jeep_seatbelt_alert", "jeep_seatbelt_alert.mp3", Continuous, false),
];

type TelltaleRow = (u32, u32, u32, bool, f64, Option<&'static str>, i64, &'static str);

/// `(deck, card, zone, blinking, duty_cycle, chime, duration_s, image)`
#[rustfmt::skip]
const BUILTIN_TELLTALES: &[TelltaleRow] = &[
    (51, 1, 2, false, 0.5, Some("engine_check"), 5, "TT001_Low Oil Level_1.png"),
    (51, 2, 2, true, 0.3, Some("engine_check"), 5, "TT002_Min Oil Level.png"),
    (52, 1, 1, false, 0.5, None, 5, "TT003_Airbag_Enabled.png"),
    (52, 2, 1, false, 0.4, Some("jeep_seatbelt_alert"), 5, "TT004_Airbag_Disabled.png"),
    (53, 1, 2, true, 0.6, Some("engine_check"), 5, "TT005_Battery Level Low_1.png"),
    (53, 2, 2, false, 0.6, Some("engine_check"), 5, "TT006_Battery Level Low_2.png"),
    (54, 1, 4, false, 0.5, Some("blinker"), -1, "TT007_Hazard.png"),
    (55, 1, 1, false, 0.5, Some("jeep_seatbelt_alert"), 90, "TT008_SW_1.png"),
    (55, 2, 1, false, 0.5, Some("jeep_seatbelt_alert"), 5, "TT009_SW_2.png"),
    (56, 1, 2, false, 0.7, Some("low_fuel"), 5, "TT010_Low Fuel Warning.png"),
    (56, 2, 2, true, 0.5, Some("engine_check"), 5, "TT011_Water in Fuel.png"),
    (56, 3, 2, true, 0.4, Some("engine_check"), 5, "TT012_Loose Fuel Cap.png"),
    (57, 1, 7, false, 0.5, None, 5, "TT013_Low Beam_1.png"),
    (58, 1, 6, false, 0.5, None, 5, "TT014_High Beam.png"),
    (58, 2, 6, false, 0.5, None, 5, "TT015_Low Beam_2.png"),
    (59, 1, 3, true, 0.5, Some("blinker"), -1, "TT016_LeftTurn.png"),
    (60, 1, 5, true, 0.5, Some("blinker"), -1, "TT017_RightTurn.png"),
    (61, 1, 2, true, 0.5, None, 5, "TT018_Eng Temp_Low.png"),
    (61, 2, 2, false, 0.3, Some("engine_check"), 5, "TT019_Eng Temp_High_1.png"),
    (61, 3, 2, false, 0.3, Some("engine_check"), 5, "TT020_Engine Temp_High_2.png"),
];
