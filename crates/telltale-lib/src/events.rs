//! Events emitted to the rendering layer, and the timer payloads the engine
//! schedules for itself.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::audio::PlaybackId;
use crate::registry::{IndicatorId, ZoneId};

/// Audio output a chime plays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Single serialized output shared by ordinary chimes.
    Normal,
    /// Unbounded output for the privileged class.
    Parallel,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Normal => write!(f, "normal"),
            Channel::Parallel => write!(f, "parallel"),
        }
    }
}

/// Observable engine output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ShowIndicator {
        id: IndicatorId,
    },
    HideIndicator {
        id: IndicatorId,
    },
    PlayAudio {
        channel: Channel,
        session: PlaybackId,
        asset: String,
        volume: u8,
    },
    StopAudio {
        channel: Channel,
        session: PlaybackId,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ShowIndicator { id } => write!(f, "show   {id}"),
            Event::HideIndicator { id } => write!(f, "hide   {id}"),
            Event::PlayAudio {
                channel,
                session,
                asset,
                volume,
            } => write!(f, "play   {channel} #{session} {asset} (vol {volume})"),
            Event::StopAudio { channel, session } => write!(f, "stop   {channel} #{session}"),
        }
    }
}

/// Event stamped with the engine clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedEvent {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// Chime sessions are keyed by this id so stale timers and completions can be
/// told apart from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// What a timer fires into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Toggle an indicator's blink phase.
    Blink(IndicatorId),
    /// An indicator's explicit lifetime ran out.
    Lifetime(IndicatorId),
    /// Advance a multiplexed zone to its next member.
    ZoneCycle(ZoneId),
    /// Inter-repeat gap, re-trigger wait, or cooldown of a chime session ended.
    Chime(SessionId),
}

/// Collects emitted events for one engine turn and tracks which indicators
/// are currently shown, so redundant show/hide events are not emitted.
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<TimedEvent>,
    visible: HashSet<IndicatorId>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, at_ms: u64, id: IndicatorId) {
        if self.visible.insert(id) {
            self.push(at_ms, Event::ShowIndicator { id });
        }
    }

    pub fn hide(&mut self, at_ms: u64, id: IndicatorId) {
        if self.visible.remove(&id) {
            self.push(at_ms, Event::HideIndicator { id });
        }
    }

    pub fn push(&mut self, at_ms: u64, event: Event) {
        self.events.push(TimedEvent { at_ms, event });
    }

    pub fn is_visible(&self, id: IndicatorId) -> bool {
        self.visible.contains(&id)
    }

    /// Take all events emitted since the last drain.
    pub fn drain(&mut self) -> Vec<TimedEvent> {
        std::mem::take(&mut self.events)
    }
}
