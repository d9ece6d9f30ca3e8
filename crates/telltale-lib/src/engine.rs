//! Orchestrator: receives activate/deactivate commands and drives the
//! tracker, zone multiplexer and chime scheduler on one virtual clock.
//!
//! Every entry point is one turn. Within a command, effects are applied in
//! a fixed order: tracker mutation, zone recompute, chime enqueue or stop.

use std::sync::Arc;

use serde::Serialize;

use crate::audio::{AudioBackend, PlaybackId};
use crate::chime::{ChimeScheduler, ChimeTiming, SessionInfo};
use crate::command::Command;
use crate::context::Turn;
use crate::events::{Outbox, TimedEvent, TimerEvent};
use crate::registry::{IndicatorId, Registry, ZoneId};
use crate::timer::{TimerHandle, TimerQueue};
use crate::tracker::{Activation, ActivationTracker};
use crate::zone::{Occupancy, ZoneMultiplexer};

/// Engine timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Zone cycle interval when no member blinks.
    pub zone_interval_ms: u64,
    /// Start-to-start interval of continuous chimes.
    pub retrigger_ms: u64,
    /// Cooldown floor for indicators without an explicit duration.
    pub min_cooldown_ms: u64,
    /// Percentage applied to chime volumes.
    pub volume_scale: u8,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            zone_interval_ms: 500,
            retrigger_ms: 3_000,
            min_cooldown_ms: 1_000,
            volume_scale: 100,
        }
    }
}

impl Timing {
    fn chime(&self) -> ChimeTiming {
        ChimeTiming {
            retrigger_ms: self.retrigger_ms,
            min_cooldown_ms: self.min_cooldown_ms,
            volume_scale: self.volume_scale,
        }
    }
}

/// Result of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Activated,
    AlreadyActive,
    Deactivated,
    NotActive,
    /// Unknown indicator id; nothing changed.
    Rejected,
    /// Bulk command; number of indicators whose state changed.
    Bulk(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retire {
    Deactivated,
    Expired,
}

/// One active indicator in a [`Snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ActiveEntry {
    pub id: IndicatorId,
    pub zone: ZoneId,
    pub visible: bool,
    pub activated_at: u64,
    pub expires_at: Option<u64>,
}

/// Serializable picture of the engine state.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub now_ms: u64,
    pub active: Vec<ActiveEntry>,
    pub queued: Vec<IndicatorId>,
    pub normal: Option<SessionInfo>,
    pub parallel: Vec<SessionInfo>,
}

pub struct Orchestrator<A: AudioBackend> {
    registry: Arc<Registry>,
    timers: TimerQueue<TimerEvent>,
    outbox: Outbox,
    tracker: ActivationTracker,
    zones: ZoneMultiplexer,
    chimes: ChimeScheduler,
    audio: A,
}

impl<A: AudioBackend> Orchestrator<A> {
    pub fn new(registry: impl Into<Arc<Registry>>, audio: A, timing: Timing) -> Self {
        Self {
            registry: registry.into(),
            timers: TimerQueue::new(),
            outbox: Outbox::new(),
            tracker: ActivationTracker::new(),
            zones: ZoneMultiplexer::new(timing.zone_interval_ms),
            chimes: ChimeScheduler::new(timing.chime()),
            audio,
        }
    }

    // ── Commands ──

    pub fn activate(&mut self, id: IndicatorId) -> CommandOutcome {
        let def = match self.registry.lookup(id) {
            Ok(def) => def,
            Err(e) => {
                log::warn!("[engine] activate rejected: {e}");
                return CommandOutcome::Rejected;
            }
        };

        let mut turn = Turn::new(&mut self.timers, &mut self.outbox);
        if self.tracker.activate(def.clone(), &mut turn) == Activation::Existing {
            log::debug!("[engine] {id} already active");
            return CommandOutcome::AlreadyActive;
        }
        log::info!("[engine] activate {id} (zone {})", def.zone);

        let occupancy = self.zones.add(def.zone, id, def.blink, &mut turn);
        sync_blink(&mut self.tracker, &self.zones, def.zone, occupancy, &mut turn);

        match self.registry.chime_for(&def) {
            Some(chime) => self
                .chimes
                .enqueue(id, chime, def.lifetime, &mut turn, &mut self.audio),
            None => {
                if let Some(ref name) = def.chime {
                    log::warn!("[engine] {id} references unknown chime \"{name}\"");
                }
            }
        }
        CommandOutcome::Activated
    }

    pub fn deactivate(&mut self, id: IndicatorId) -> CommandOutcome {
        if !self.registry.contains(id) {
            log::warn!("[engine] deactivate rejected: unknown indicator {id}");
            return CommandOutcome::Rejected;
        }
        if self.retire(id, Retire::Deactivated) {
            CommandOutcome::Deactivated
        } else {
            self.drop_chimes(id);
            CommandOutcome::NotActive
        }
    }

    /// Cancel chime state left behind by an indicator that already expired.
    fn drop_chimes(&mut self, id: IndicatorId) {
        if !self.chimes.has_request_for(id) {
            return;
        }
        log::info!("[engine] dropping chime of expired {id}");
        let mut turn = Turn::new(&mut self.timers, &mut self.outbox);
        self.chimes.stop(id, &mut turn, &mut self.audio);
    }

    pub fn apply(&mut self, command: &Command) -> CommandOutcome {
        match *command {
            Command::Activate(id) => self.activate(id),
            Command::Deactivate(id) => self.deactivate(id),
            Command::ActivateAll => {
                let ids: Vec<IndicatorId> = self.registry.indicators().map(|d| d.id).collect();
                let changed = ids
                    .into_iter()
                    .filter(|&id| self.activate(id) == CommandOutcome::Activated)
                    .count();
                log::info!("[engine] activated {changed} indicators");
                CommandOutcome::Bulk(changed)
            }
            Command::DeactivateAll => {
                let ids = self.tracker.ids_by_activation();
                let changed = ids
                    .into_iter()
                    .filter(|&id| self.retire(id, Retire::Deactivated))
                    .count();
                for id in self.chimes.requesters() {
                    self.drop_chimes(id);
                }
                log::info!("[engine] deactivated {changed} indicators");
                CommandOutcome::Bulk(changed)
            }
        }
    }

    fn retire(&mut self, id: IndicatorId, why: Retire) -> bool {
        let mut turn = Turn::new(&mut self.timers, &mut self.outbox);
        let Some(instance) = self.tracker.deactivate(id, &mut turn) else {
            log::debug!("[engine] {id} is not active");
            return false;
        };
        let zone = instance.zone();
        let occupancy = self.zones.remove(zone, id, &mut turn);
        sync_blink(&mut self.tracker, &self.zones, zone, occupancy, &mut turn);

        match why {
            Retire::Deactivated => {
                log::info!("[engine] deactivate {id}");
                self.chimes.stop(id, &mut turn, &mut self.audio);
            }
            Retire::Expired => {
                log::info!("[engine] {id} expired");
                self.chimes.expire(id, &mut turn, &mut self.audio);
            }
        }
        true
    }

    // ── Clock ──

    /// Fire every timer due at or before `now_ms`, then move the clock there.
    pub fn advance_to(&mut self, now_ms: u64) {
        while self.fire_next(now_ms) {}
        self.timers.set_now(now_ms);
    }

    pub fn advance_by(&mut self, delta_ms: u64) {
        self.advance_to(self.now().saturating_add(delta_ms));
    }

    /// Fire the single earliest timer. Returns its deadline.
    pub fn step(&mut self) -> Option<u64> {
        let deadline = self.timers.next_deadline()?;
        self.fire_next(deadline);
        Some(deadline)
    }

    fn fire_next(&mut self, until: u64) -> bool {
        let Some((handle, event)) = self.timers.pop_due(until) else {
            return false;
        };
        self.dispatch(handle, event);
        true
    }

    fn dispatch(&mut self, handle: TimerHandle, event: TimerEvent) {
        match event {
            TimerEvent::Blink(id) => {
                let mut turn = Turn::new(&mut self.timers, &mut self.outbox);
                self.tracker.on_blink(id, handle, &mut turn);
            }
            TimerEvent::Lifetime(id) => {
                if self.tracker.owns_lifetime(id, handle) {
                    self.tracker.lifetime_elapsed(id);
                    self.retire(id, Retire::Expired);
                }
            }
            TimerEvent::ZoneCycle(zone) => {
                let mut turn = Turn::new(&mut self.timers, &mut self.outbox);
                self.zones.tick(zone, handle, &mut turn);
            }
            TimerEvent::Chime(session) => {
                let mut turn = Turn::new(&mut self.timers, &mut self.outbox);
                self.chimes
                    .on_timer(session, handle, &mut turn, &mut self.audio);
            }
        }
    }

    /// Completion notification from the audio backend. Safe to call at any
    /// time; completions of stopped playbacks are ignored.
    pub fn playback_finished(&mut self, playback: PlaybackId) {
        let mut turn = Turn::new(&mut self.timers, &mut self.outbox);
        self.chimes
            .on_completed(playback, &mut turn, &mut self.audio);
    }

    pub fn now(&self) -> u64 {
        self.timers.now()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    // ── Output / inspection ──

    /// Events emitted since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<TimedEvent> {
        self.outbox.drain()
    }

    pub fn is_active(&self, id: IndicatorId) -> bool {
        self.tracker.is_active(id)
    }

    pub fn is_visible(&self, id: IndicatorId) -> bool {
        self.outbox.is_visible(id)
    }

    /// Visible members of a zone.
    pub fn visible_in(&self, zone: ZoneId) -> Vec<IndicatorId> {
        self.zones
            .members(zone)
            .into_iter()
            .filter(|&id| self.outbox.is_visible(id))
            .collect()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn zones(&self) -> &ZoneMultiplexer {
        &self.zones
    }

    pub fn chimes(&self) -> &ChimeScheduler {
        &self.chimes
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            now_ms: self.now(),
            active: self
                .tracker
                .iter()
                .map(|a| ActiveEntry {
                    id: a.id(),
                    zone: a.zone(),
                    visible: self.outbox.is_visible(a.id()),
                    activated_at: a.activated_at,
                    expires_at: a.expires_at(),
                })
                .collect(),
            queued: self.chimes.queued().map(|r| r.indicator).collect(),
            normal: self.chimes.normal(),
            parallel: self.chimes.parallel(),
        }
    }
}

/// Members of a multiplexed zone do not blink; a sole member resumes.
fn sync_blink(
    tracker: &mut ActivationTracker,
    zones: &ZoneMultiplexer,
    zone: ZoneId,
    occupancy: Occupancy,
    turn: &mut Turn<'_>,
) {
    match occupancy {
        Occupancy::Empty => {}
        Occupancy::Solo(id) => tracker.resume_blink(id, turn),
        Occupancy::Multiplexed => {
            for id in zones.members(zone) {
                tracker.suspend_blink(id, turn);
            }
        }
    }
}
