//! Integration tests: end-to-end orchestration through the public API.
//!
//! Audio completions are delivered by hand through
//! `Orchestrator::playback_finished`, so every test controls exactly when a
//! clip ends.

use telltale_lib::audio::PlaybackId;
use telltale_lib::audio::mock::MockAudio;
use telltale_lib::chime::state::PlaybackState;
use telltale_lib::events::{Channel, Event};
use telltale_lib::registry::{IndicatorId, Registry, ZoneId};
use telltale_lib::{CommandOutcome, Orchestrator, Timing};

const TEST_REGISTRY: &str = r#"
[[chime]]
id = "a"
file = "a.wav"

[[chime]]
id = "b"
file = "b.wav"

[[chime]]
id = "c"
file = "c.wav"

[[chime]]
id = "twice"
file = "twice.wav"
repeat = "twice"
gap_ms = 1000

[[chime]]
id = "loop"
file = "loop.wav"
repeat = "continuous"

[[chime]]
id = "turn"
file = "turn.wav"
repeat = "continuous"
parallel = true

[[indicator]]
deck = 1
card = 1
zone = 1
chime = "a"

[[indicator]]
deck = 1
card = 2
zone = 1
chime = "b"

[[indicator]]
deck = 1
card = 3
zone = 1
chime = "c"

[[indicator]]
deck = 2
card = 1
zone = 2
chime = "twice"
duration = 2

[[indicator]]
deck = 3
card = 1
zone = 3
chime = "loop"
duration = -1

[[indicator]]
deck = 3
card = 2
zone = 3
chime = "loop"
duration = 4

[[indicator]]
deck = 4
card = 1
zone = 4
blink = true
chime = "turn"
duration = -1

[[indicator]]
deck = 4
card = 2
zone = 5
blink = true
chime = "turn"
duration = -1
"#;

fn id(deck: u32, card: u32) -> IndicatorId {
    IndicatorId::new(deck, card)
}

/// Helper: engine over the small test registry.
fn test_engine() -> Orchestrator<MockAudio> {
    let registry = Registry::from_toml_str(TEST_REGISTRY).unwrap();
    Orchestrator::new(registry, MockAudio::new(), Timing::default())
}

/// Helper: engine over the built-in cluster table.
fn cluster_engine() -> Orchestrator<MockAudio> {
    Orchestrator::new(Registry::builtin(), MockAudio::new(), Timing::default())
}

/// Helper: finish the most recent play.
fn finish_last(e: &mut Orchestrator<MockAudio>) -> PlaybackId {
    let playback = e.audio().last_play().unwrap().id;
    e.playback_finished(playback);
    playback
}

/// Helper: `(at_ms, asset)` of every play so far.
fn plays(e: &Orchestrator<MockAudio>) -> Vec<(u64, String)> {
    e.audio()
        .plays
        .iter()
        .map(|p| (p.at_ms, p.asset.clone()))
        .collect()
}

// ── FIFO order ──

#[test]
fn normal_chimes_start_in_enqueue_order() {
    let mut e = test_engine();
    e.activate(id(1, 3));
    e.activate(id(1, 1));
    e.activate(id(1, 2));
    for _ in 0..3 {
        finish_last(&mut e);
        e.advance_by(1_000);
    }
    let assets: Vec<String> = plays(&e).into_iter().map(|p| p.1).collect();
    assert_eq!(assets, vec!["c.wav", "a.wav", "b.wav"]);
}

// ── Parallel exemption ──

#[test]
fn privileged_chimes_never_wait() {
    let mut e = test_engine();
    e.activate(id(1, 1));
    e.activate(id(1, 2));
    e.activate(id(4, 1));
    e.activate(id(4, 2));

    let turn: Vec<_> = e.audio().plays_of("turn.wav").into_iter().cloned().collect();
    assert_eq!(turn.len(), 2);
    assert!(turn.iter().all(|p| p.channel == Channel::Parallel && p.at_ms == 0));
    assert_ne!(turn[0].id, turn[1].id);

    let normal = e.chimes().normal().unwrap();
    assert_eq!(normal.chime, "a");
    assert_eq!(normal.state, PlaybackState::Playing);
    assert_eq!(e.chimes().queue_len(), 1);
}

// ── Repeat correctness ──

#[test]
fn twice_plays_two_times_then_cools_down() {
    let mut e = test_engine();
    e.activate(id(2, 1));
    finish_last(&mut e);
    e.advance_to(999);
    assert_eq!(e.audio().plays.len(), 1);
    e.advance_to(1_000);
    assert_eq!(plays(&e), vec![(0, "twice.wav".into()), (1_000, "twice.wav".into())]);

    finish_last(&mut e);
    assert_eq!(e.chimes().normal().unwrap().state, PlaybackState::Cooldown);
    e.advance_to(2_999);
    assert!(e.chimes().normal().is_some(), "cooldown lasts the 2 s duration");
    e.advance_to(3_000);
    assert!(e.chimes().normal().is_none());
    assert_eq!(e.audio().plays.len(), 2);
}

// ── Continuous duration ──

#[test]
fn indefinite_continuous_repeats_until_stop() {
    let mut e = test_engine();
    e.activate(id(3, 1));
    for round in 1..=10u64 {
        e.advance_to(round * 3_000 - 2_000);
        finish_last(&mut e);
        e.advance_to(round * 3_000);
    }
    assert_eq!(e.audio().plays.len(), 11);

    e.deactivate(id(3, 1));
    e.advance_by(60_000);
    assert_eq!(e.audio().plays.len(), 11);
    assert!(e.chimes().is_idle());
}

#[test]
fn timed_continuous_stops_after_duration() {
    let mut e = test_engine();
    e.activate(id(3, 2));
    e.advance_to(1_000);
    finish_last(&mut e);
    e.advance_to(3_000);
    let second = e.audio().last_play().unwrap().id;
    e.advance_to(4_000);

    assert!(!e.is_active(id(3, 2)));
    assert_eq!(e.audio().stops, vec![second]);
    e.advance_to(20_000);
    let starts: Vec<u64> = plays(&e).into_iter().map(|p| p.0).collect();
    assert_eq!(starts, vec![0, 3_000]);
}

// ── Zone exclusivity ──

#[test]
fn crowded_zone_shows_exactly_one() {
    let mut e = test_engine();
    e.activate(id(1, 1));
    e.activate(id(1, 2));
    e.activate(id(1, 3));
    assert_eq!(e.zones().interval(ZoneId(1)), Some(500));

    let mut shown = Vec::new();
    for t in (0..=3_000).step_by(100) {
        e.advance_to(t);
        let visible = e.visible_in(ZoneId(1));
        assert_eq!(visible.len(), 1, "at {t} ms");
        if shown.last() != Some(&visible[0]) {
            shown.push(visible[0]);
        }
    }
    assert_eq!(&shown[..4], &[id(1, 1), id(1, 2), id(1, 3), id(1, 1)]);

    e.deactivate(id(1, 1));
    e.deactivate(id(1, 2));
    assert_eq!(e.visible_in(ZoneId(1)), vec![id(1, 3)]);
    assert_eq!(e.zones().interval(ZoneId(1)), None);
}

#[test]
fn members_in_other_zones_are_independent() {
    let mut e = test_engine();
    e.activate(id(1, 1));
    e.activate(id(2, 1));
    assert!(e.is_visible(id(1, 1)));
    assert!(e.is_visible(id(2, 1)));
    assert_eq!(e.zones().interval(ZoneId(1)), None);
}

// ── Cancellation safety ──

#[test]
fn deactivating_queued_chime_has_no_side_effect() {
    let mut e = test_engine();
    e.activate(id(1, 1));
    e.activate(id(1, 2));
    e.drain_events();

    assert_eq!(e.deactivate(id(1, 2)), CommandOutcome::Deactivated);
    assert!(e.audio().plays_of("b.wav").is_empty());
    assert!(e.audio().stops.is_empty());
    assert_eq!(e.chimes().queue_len(), 0);
    let events = e.drain_events();
    assert!(
        events
            .iter()
            .all(|t| !matches!(t.event, Event::StopAudio { .. } | Event::PlayAudio { .. }))
    );
}

#[test]
fn deactivating_playing_chime_stops_and_advances() {
    let mut e = test_engine();
    e.activate(id(1, 1));
    e.activate(id(1, 2));
    e.advance_to(400);
    e.drain_events();

    e.deactivate(id(1, 1));
    let events: Vec<Event> = e.drain_events().into_iter().map(|t| t.event).collect();
    let stop = events
        .iter()
        .position(|ev| matches!(ev, Event::StopAudio { channel: Channel::Normal, .. }))
        .unwrap();
    let play = events
        .iter()
        .position(|ev| matches!(ev, Event::PlayAudio { asset, .. } if asset == "b.wav"))
        .unwrap();
    assert!(stop < play, "stop before the next start: {events:?}");
    assert_eq!(plays(&e).last().unwrap(), &(400, "b.wav".to_string()));
}

#[test]
fn stale_completion_after_stop_is_ignored() {
    let mut e = test_engine();
    e.activate(id(1, 1));
    e.activate(id(1, 2));
    let first = e.audio().last_play().unwrap().id;
    e.deactivate(id(1, 1));

    e.playback_finished(first);
    let normal = e.chimes().normal().unwrap();
    assert_eq!(normal.chime, "b");
    assert_eq!(normal.state, PlaybackState::Playing);
}

#[test]
fn deactivate_leaves_no_timers_behind() {
    let mut e = test_engine();
    for (deck, card) in [(1, 1), (1, 2), (2, 1), (3, 2), (4, 1)] {
        e.activate(id(deck, card));
    }
    for (deck, card) in [(4, 1), (3, 2), (2, 1), (1, 2), (1, 1)] {
        e.deactivate(id(deck, card));
    }
    assert_eq!(e.next_deadline(), None);
    assert!(e.chimes().is_idle());
}

// ── Missing assets ──

#[test]
fn missing_asset_does_not_block_queue() {
    let registry = Registry::from_toml_str(TEST_REGISTRY).unwrap();
    let mut e = Orchestrator::new(
        registry,
        MockAudio::new().with_missing("a.wav"),
        Timing::default(),
    );
    e.activate(id(1, 1));
    e.activate(id(1, 2));
    assert_eq!(plays(&e), vec![(0, "b.wav".into())]);
    assert!(e.is_visible(id(1, 1)), "indicator is still shown");
}

// ── Cluster scenarios ──

#[test]
fn scenario_engine_check_then_low_fuel() {
    let mut e = cluster_engine();
    e.activate(id(51, 1));
    e.advance_to(100);
    e.activate(id(56, 1));
    e.advance_to(1_000);
    finish_last(&mut e);
    e.advance_to(1_800);
    e.advance_to(2_800);
    finish_last(&mut e);
    e.advance_to(7_799);
    assert!(e.audio().plays_of("low_fuel.mp3").is_empty());
    e.advance_to(7_800);
    assert_eq!(
        plays(&e),
        vec![
            (0, "engine_check.mp3".into()),
            (1_800, "engine_check.mp3".into()),
            (7_800, "low_fuel.mp3".into()),
        ]
    );
}

#[test]
fn scenario_blinkers_during_engine_check() {
    let mut e = cluster_engine();
    e.activate(id(51, 1));
    e.advance_to(300);
    e.activate(id(59, 1));
    e.activate(id(60, 1));

    let blinkers = e.audio().plays_of("blinker.mp3");
    assert_eq!(blinkers.len(), 2);
    assert!(blinkers.iter().all(|p| p.channel == Channel::Parallel && p.at_ms == 300));
    assert!(e.audio().stops.is_empty());
    assert_eq!(e.chimes().normal().unwrap().chime, "engine_check");
    assert_eq!(e.chimes().parallel().len(), 2);
}

#[test]
fn scenario_zone_interval_from_duty_cycles() {
    let mut e = cluster_engine();
    e.activate(id(51, 1));
    e.activate(id(51, 2));
    // 51/1 is steady, 51/2 blinks at 0.3: min over blinking members
    assert_eq!(e.zones().interval(ZoneId(2)), Some(300));
    e.activate(id(61, 1));
    assert_eq!(e.zones().interval(ZoneId(2)), Some(300));
}

#[test]
fn scenario_deactivate_during_inter_repeat_wait() {
    let mut e = cluster_engine();
    e.activate(id(51, 1));
    e.activate(id(56, 1));
    e.advance_to(1_000);
    finish_last(&mut e);
    assert_eq!(
        e.chimes().normal().unwrap().state,
        PlaybackState::InterRepeatWait
    );
    e.advance_to(1_200);
    e.deactivate(id(51, 1));

    assert_eq!(plays(&e).last().unwrap(), &(1_200, "low_fuel.mp3".to_string()));
    e.advance_to(20_000);
    assert_eq!(e.audio().plays_of("engine_check.mp3").len(), 1);
}

#[test]
fn scenario_bulk_round_trip() {
    let mut e = cluster_engine();
    let n = e.registry().len();
    let activate_all = "activate-all".parse().unwrap();
    assert_eq!(e.apply(&activate_all), CommandOutcome::Bulk(n));
    for zone in e.zones().zone_ids().collect::<Vec<_>>() {
        assert_eq!(e.visible_in(zone).len(), 1, "zone {zone}");
    }
    let deactivate_all = r#"{"type":"bulk","action":"deactivate_all_telltales"}"#.parse().unwrap();
    assert_eq!(e.apply(&deactivate_all), CommandOutcome::Bulk(n));
    assert_eq!(e.next_deadline(), None);
}

// ── Expired indicators ──

#[test]
fn deactivate_after_expiry_drops_queued_chime() {
    let mut e = cluster_engine();
    // 55/1 holds the normal channel with a continuous chime for 90 s
    e.activate(id(55, 1));
    e.activate(id(56, 1));
    assert_eq!(e.chimes().queue_len(), 1);

    e.advance_to(6_000);
    assert!(!e.is_active(id(56, 1)));
    assert_eq!(e.chimes().queue_len(), 1, "once chime outlives expiry");

    assert_eq!(e.deactivate(id(56, 1)), CommandOutcome::NotActive);
    assert_eq!(e.chimes().queue_len(), 0);
    assert_eq!(e.deactivate(id(55, 1)), CommandOutcome::Deactivated);

    e.advance_to(20_000);
    assert!(e.audio().plays_of("low_fuel.mp3").is_empty());
    assert!(e.chimes().is_idle());
}

#[test]
fn deactivate_all_after_expiry_drops_queued_chime() {
    let mut e = cluster_engine();
    e.activate(id(55, 1));
    e.activate(id(56, 1));
    e.advance_to(6_000);

    let deactivate_all = "deactivate-all".parse().unwrap();
    assert_eq!(e.apply(&deactivate_all), CommandOutcome::Bulk(1));
    e.advance_to(20_000);
    assert!(e.audio().plays_of("low_fuel.mp3").is_empty());
    assert!(e.chimes().is_idle());
    assert_eq!(e.next_deadline(), None);
}
