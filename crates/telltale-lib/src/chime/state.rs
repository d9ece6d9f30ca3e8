//! Playback state machine, as a pure transition function.
//!
//! `Pending -> Playing -> (InterRepeatWait -> Playing)* -> Cooldown -> Done`
//!
//! [`transition`] knows nothing about timers or audio. It returns the next
//! state and one [`Action`] for the scheduler to carry out.

use std::fmt;

use serde::Serialize;

use crate::registry::RepeatMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Pending,
    Playing,
    InterRepeatWait,
    Cooldown,
    Done,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Pending => write!(f, "pending"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::InterRepeatWait => write!(f, "inter-repeat wait"),
            PlaybackState::Cooldown => write!(f, "cooldown"),
            PlaybackState::Done => write!(f, "done"),
        }
    }
}

/// Timing of one session, fixed when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub repeat: RepeatMode,
    /// Pause between the two plays of a `twice` chime.
    pub gap_ms: u64,
    /// Channel hold after the last play. Zero skips the cooldown.
    pub cooldown_ms: u64,
    /// Start-to-start interval of a `continuous` chime.
    pub retrigger_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Session reached the head of its channel.
    Start,
    /// The audio backend finished the current play after `elapsed_ms`.
    Completed { elapsed_ms: u64 },
    /// The asset could not be played.
    Skipped,
    /// The session's wait timer fired.
    TimerElapsed,
    /// Explicit stop.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start the asset.
    Play,
    /// Arm the session timer.
    Wait(u64),
    /// Release the channel.
    Finish,
    /// Halt the audio in flight, then release the channel.
    HaltAndFinish,
    /// Input not meaningful in this state.
    Ignore,
}

/// State plus the number of completed plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub state: PlaybackState,
    pub completed: u32,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            state: PlaybackState::Pending,
            completed: 0,
        }
    }
}

fn after_last_play(plan: &Plan, completed: u32) -> (Progress, Action) {
    if plan.cooldown_ms > 0 {
        (
            Progress {
                state: PlaybackState::Cooldown,
                completed,
            },
            Action::Wait(plan.cooldown_ms),
        )
    } else {
        (
            Progress {
                state: PlaybackState::Done,
                completed,
            },
            Action::Finish,
        )
    }
}

pub fn transition(progress: Progress, plan: &Plan, input: Input) -> (Progress, Action) {
    use PlaybackState::*;

    let Progress { state, completed } = progress;
    let to = |state| Progress { state, completed };

    match (state, input) {
        (Done, _) => (progress, Action::Ignore),

        (Playing, Input::Stop) => (to(Done), Action::HaltAndFinish),
        (_, Input::Stop) => (to(Done), Action::Finish),

        (Pending, Input::Start) => (to(Playing), Action::Play),

        (Playing, Input::Skipped) => (to(Done), Action::Finish),

        (Playing, Input::Completed { elapsed_ms }) => {
            let completed = completed + 1;
            let waiting = Progress {
                state: InterRepeatWait,
                completed,
            };
            match plan.repeat {
                RepeatMode::Once => after_last_play(plan, completed),
                RepeatMode::Twice if completed < 2 => (waiting, Action::Wait(plan.gap_ms)),
                RepeatMode::Twice => after_last_play(plan, completed),
                RepeatMode::Continuous => match plan.retrigger_ms.saturating_sub(elapsed_ms) {
                    0 => (
                        Progress {
                            state: Playing,
                            completed,
                        },
                        Action::Play,
                    ),
                    remaining => (waiting, Action::Wait(remaining)),
                },
            }
        }

        (InterRepeatWait, Input::TimerElapsed) => (to(Playing), Action::Play),
        (Cooldown, Input::TimerElapsed) => (to(Done), Action::Finish),

        _ => (progress, Action::Ignore),
    }
}
