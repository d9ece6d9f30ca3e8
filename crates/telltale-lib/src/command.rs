//! External command surface: text commands, the JSON control payload, and
//! timed scenario scripts.
//!
//! Text form: `activate 51 1`, `deactivate 51 1`, `activate-all`,
//! `deactivate-all`.
//!
//! JSON form: `{"type":"telltale","deck_num":51,"card_num":1,"action":"activate"}`
//! or `{"type":"bulk","action":"activate_all_telltales"}`.
//!
//! Script: one `<at_ms> <command>` per line, `#` starts a comment.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelltaleError};
use crate::registry::IndicatorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Activate(IndicatorId),
    Deactivate(IndicatorId),
    ActivateAll,
    DeactivateAll,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Activate(id) => write!(f, "activate {} {}", id.deck, id.card),
            Command::Deactivate(id) => write!(f, "deactivate {} {}", id.deck, id.card),
            Command::ActivateAll => write!(f, "activate-all"),
            Command::DeactivateAll => write!(f, "deactivate-all"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Switch {
    Activate,
    Deactivate,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Payload {
    #[serde(alias = "deck", alias = "card")]
    Telltale {
        deck_num: u32,
        card_num: u32,
        action: Switch,
    },
    Bulk {
        action: String,
    },
}

impl Command {
    /// Parse the JSON control payload.
    pub fn from_json(s: &str) -> Result<Self> {
        let payload: Payload =
            serde_json::from_str(s).map_err(|e| TelltaleError::Command(format!("invalid payload: {e}")))?;
        match payload {
            Payload::Telltale {
                deck_num,
                card_num,
                action,
            } => {
                let id = IndicatorId::new(deck_num, card_num);
                Ok(match action {
                    Switch::Activate => Command::Activate(id),
                    Switch::Deactivate => Command::Deactivate(id),
                })
            }
            Payload::Bulk { action } => match action.as_str() {
                "activate_all_telltales" => Ok(Command::ActivateAll),
                "deactivate_all_telltales" => Ok(Command::DeactivateAll),
                other => Err(TelltaleError::Command(format!("unknown bulk action \"{other}\""))),
            },
        }
    }

    fn from_words(s: &str) -> Result<Self> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let number = |w: &str| {
            w.parse::<u32>()
                .map_err(|_| TelltaleError::Command(format!("expected a number, got \"{w}\"")))
        };
        match words.as_slice() {
            [verb, deck, card] if verb.eq_ignore_ascii_case("activate") => {
                Ok(Command::Activate(IndicatorId::new(number(*deck)?, number(*card)?)))
            }
            [verb, deck, card] if verb.eq_ignore_ascii_case("deactivate") => {
                Ok(Command::Deactivate(IndicatorId::new(number(*deck)?, number(*card)?)))
            }
            [verb] if verb.eq_ignore_ascii_case("activate-all") => Ok(Command::ActivateAll),
            [verb] if verb.eq_ignore_ascii_case("deactivate-all") => Ok(Command::DeactivateAll),
            [] => Err(TelltaleError::Command("empty command".into())),
            _ => Err(TelltaleError::Command(format!("unrecognised command \"{s}\""))),
        }
    }
}

impl FromStr for Command {
    type Err = TelltaleError;

    /// Accepts either the text form or a JSON payload.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('{') {
            Command::from_json(s)
        } else {
            Command::from_words(s)
        }
    }
}

/// One scheduled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub at_ms: u64,
    pub command: Command,
    /// 1-based source line.
    pub line: usize,
}

/// A timed command sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self> {
        let mut steps: Vec<Step> = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            let (at, rest) = content
                .split_once(char::is_whitespace)
                .ok_or_else(|| TelltaleError::Command(format!("line {line}: missing command")))?;
            let at_ms: u64 = at
                .parse()
                .map_err(|_| TelltaleError::Command(format!("line {line}: bad time \"{at}\"")))?;
            if let Some(prev) = steps.last()
                && at_ms < prev.at_ms
            {
                return Err(TelltaleError::Command(format!(
                    "line {line}: time {at_ms} is before {}",
                    prev.at_ms
                )));
            }
            let command = rest.parse().map_err(|e| match e {
                TelltaleError::Command(msg) => TelltaleError::Command(format!("line {line}: {msg}")),
                other => other,
            })?;
            steps.push(Step {
                at_ms,
                command,
                line,
            });
        }
        Ok(Script { steps })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Time of the last step.
    pub fn end_ms(&self) -> u64 {
        self.steps.last().map(|s| s.at_ms).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
