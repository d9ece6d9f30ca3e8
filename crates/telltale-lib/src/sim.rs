//! Scenario driver: replays a [`Script`] against an orchestrator backed by
//! [`SimulatedAudio`], interleaving commands, timers and clip completions in
//! time order.
//!
//! The driver jumps straight from one instant to the next. A caller that
//! wants wall-clock pacing passes a `pace` callback that sleeps for the gap
//! (and can abort the run by returning `false`).

use serde::Serialize;

use crate::audio::SimulatedAudio;
use crate::command::Script;
use crate::config::Config;
use crate::engine::{CommandOutcome, Orchestrator};
use crate::error::Result;
use crate::events::TimedEvent;

/// How long a run keeps going after the last scripted command by default.
pub const DEFAULT_SETTLE_MS: u64 = 15_000;

/// Totals of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub end_ms: u64,
    pub commands: usize,
    pub rejected: usize,
    pub events: usize,
    pub interrupted: bool,
}

/// Build an engine from configuration: registry, simulated audio, timing.
pub fn engine_from_config(config: &Config) -> Result<Orchestrator<SimulatedAudio>> {
    let registry = config.registry()?;
    Ok(Orchestrator::new(registry, config.audio(), config.timing()))
}

/// Run `script` until `until_ms`, passing every emitted event to `sink`.
///
/// `pace(from_ms, to_ms)` is called before each clock jump.
pub fn run<P, S>(
    engine: &mut Orchestrator<SimulatedAudio>,
    script: &Script,
    until_ms: u64,
    mut pace: P,
    mut sink: S,
) -> Summary
where
    P: FnMut(u64, u64) -> bool,
    S: FnMut(&TimedEvent),
{
    let mut summary = Summary::default();
    let mut steps = script.steps().iter().peekable();

    let mut flush = |engine: &mut Orchestrator<SimulatedAudio>, summary: &mut Summary| {
        for event in engine.drain_events() {
            summary.events += 1;
            sink(&event);
        }
    };

    loop {
        let now = engine.now();
        while let Some(step) = steps.next_if(|s| s.at_ms <= now) {
            summary.commands += 1;
            let outcome = engine.apply(&step.command);
            log::info!("[engine] {now} ms: {} -> {outcome:?}", step.command);
            if outcome == CommandOutcome::Rejected {
                summary.rejected += 1;
            }
        }
        flush(engine, &mut summary);

        let next = [
            engine.next_deadline(),
            engine.audio().next_completion(),
            steps.peek().map(|s| s.at_ms),
        ]
        .into_iter()
        .flatten()
        .min();
        let Some(next) = next.filter(|&t| t <= until_ms) else {
            break;
        };

        if !pace(now, next) {
            summary.interrupted = true;
            break;
        }
        engine.advance_to(next);
        for playback in engine.audio_mut().take_finished(next) {
            engine.playback_finished(playback);
        }
    }

    if !summary.interrupted && engine.now() < until_ms {
        if pace(engine.now(), until_ms) {
            engine.advance_to(until_ms);
        } else {
            summary.interrupted = true;
        }
    }
    flush(engine, &mut summary);
    summary.end_ms = engine.now();
    summary
}

/// Run with no pacing and collect every event.
pub fn replay(engine: &mut Orchestrator<SimulatedAudio>, script: &Script, until_ms: u64) -> (Vec<TimedEvent>, Summary) {
    let mut events = Vec::new();
    let summary = run(engine, script, until_ms, |_, _| true, |e| events.push(e.clone()));
    (events, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Timing;
    use crate::events::{Channel, Event};
    use crate::registry::Registry;

    fn engine() -> Orchestrator<SimulatedAudio> {
        Orchestrator::new(Registry::builtin(), SimulatedAudio::new(1_000), Timing::default())
    }

    fn plays(events: &[TimedEvent]) -> Vec<(u64, String)> {
        events
            .iter()
            .filter_map(|e| match e.event {
                Event::PlayAudio { ref asset, .. } => Some((e.at_ms, asset.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn twice_then_cooldown_then_queued_once() {
        let script = Script::parse("0 activate 51 1\n100 activate 56 1\n").unwrap();
        let mut e = engine();
        let (events, summary) = replay(&mut e, &script, 12_000);
        assert_eq!(
            plays(&events),
            vec![
                (0, "engine_check.mp3".into()),
                (1_800, "engine_check.mp3".into()),
                (7_800, "low_fuel.mp3".into()),
            ]
        );
        assert_eq!(summary.commands, 2);
        assert_eq!(summary.end_ms, 12_000);
    }

    #[test]
    fn blinker_retriggers_every_three_seconds() {
        let script = Script::parse("0 activate 59 1\n").unwrap();
        let mut e = engine();
        let (events, _) = replay(&mut e, &script, 9_500);
        let starts: Vec<u64> = plays(&events).into_iter().map(|p| p.0).collect();
        assert_eq!(starts, vec![0, 3_000, 6_000, 9_000]);
        assert!(events.iter().all(|ev| match ev.event {
            Event::PlayAudio { channel, .. } => channel == Channel::Parallel,
            _ => true,
        }));
    }

    #[test]
    fn rejected_commands_are_counted() {
        let script = Script::parse("0 activate 99 9\n10 deactivate 51 1\n").unwrap();
        let mut e = engine();
        let (_, summary) = replay(&mut e, &script, 100);
        assert_eq!(summary.commands, 2);
        assert_eq!(summary.rejected, 1);
    }

    #[test]
    fn pace_can_interrupt() {
        let script = Script::parse("0 activate 59 1\n").unwrap();
        let mut e = engine();
        let mut calls = 0;
        let summary = run(
            &mut e,
            &script,
            60_000,
            |_, _| {
                calls += 1;
                calls < 3
            },
            |_| {},
        );
        assert!(summary.interrupted);
        assert!(summary.end_ms < 60_000);
    }

    #[test]
    fn missing_asset_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("low_fuel.mp3"), b"x").unwrap();
        let mut e = Orchestrator::new(
            Registry::builtin(),
            SimulatedAudio::new(1_000).with_assets_dir(dir.path()),
            Timing::default(),
        );
        let script = Script::parse("0 activate 51 1\n0 activate 56 1\n").unwrap();
        let (events, _) = replay(&mut e, &script, 3_000);
        assert_eq!(plays(&events), vec![(0, "low_fuel.mp3".into())]);
    }

    #[test]
    fn engine_from_default_config() {
        let e = engine_from_config(&Config::default()).unwrap();
        assert_eq!(e.registry().len(), Registry::builtin().len());
    }
}
