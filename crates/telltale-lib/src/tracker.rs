//! Activation tracker: the set of active indicators and the timers each
//! instance owns (blink phase, lifetime).
//!
//! The tracker never decides zone visibility. It only flips its own
//! indicator while blinking is allowed, which the orchestrator turns off for
//! members of a multiplexed zone.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::Turn;
use crate::events::TimerEvent;
use crate::registry::{IndicatorDefinition, IndicatorId, ZoneId};
use crate::timer::TimerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Created,
    /// Already active; the existing instance was left untouched.
    Existing,
}

#[derive(Debug)]
struct Blink {
    timer: Option<TimerHandle>,
    lit: bool,
}

/// Runtime state of one activation.
#[derive(Debug)]
pub struct ActiveIndicator {
    pub definition: Arc<IndicatorDefinition>,
    pub activated_at: u64,
    /// Monotonic activation counter, used for deactivate-all ordering.
    pub order: u64,
    blink: Option<Blink>,
    lifetime_timer: Option<TimerHandle>,
}

impl ActiveIndicator {
    pub fn id(&self) -> IndicatorId {
        self.definition.id
    }

    pub fn zone(&self) -> ZoneId {
        self.definition.zone
    }

    /// Whether the blink timer is currently running.
    pub fn is_blinking(&self) -> bool {
        self.blink.as_ref().is_some_and(|b| b.timer.is_some())
    }

    /// Lifetime deadline, if one is armed.
    pub fn expires_at(&self) -> Option<u64> {
        self.definition
            .lifetime
            .timer_ms()
            .map(|ms| self.activated_at + ms)
    }
}

#[derive(Debug, Default)]
pub struct ActivationTracker {
    active: BTreeMap<IndicatorId, ActiveIndicator>,
    next_order: u64,
}

impl ActivationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an instance for `definition`, arming its blink and lifetime
    /// timers. Idempotent for an already-active id.
    pub fn activate(&mut self, definition: Arc<IndicatorDefinition>, turn: &mut Turn<'_>) -> Activation {
        let id = definition.id;
        if self.active.contains_key(&id) {
            return Activation::Existing;
        }

        let blink = definition.blink.toggles().then(|| Blink {
            timer: Some(turn.after(definition.blink.on_ms(), TimerEvent::Blink(id))),
            lit: true,
        });
        let lifetime_timer = definition
            .lifetime
            .timer_ms()
            .map(|ms| turn.after(ms, TimerEvent::Lifetime(id)));

        self.next_order += 1;
        self.active.insert(
            id,
            ActiveIndicator {
                definition,
                activated_at: turn.now(),
                order: self.next_order,
                blink,
                lifetime_timer,
            },
        );
        Activation::Created
    }

    /// Remove an instance, cancelling every timer it owns.
    pub fn deactivate(&mut self, id: IndicatorId, turn: &mut Turn<'_>) -> Option<ActiveIndicator> {
        let mut instance = self.active.remove(&id)?;
        if let Some(ref mut blink) = instance.blink {
            turn.cancel(&mut blink.timer);
        }
        turn.cancel(&mut instance.lifetime_timer);
        Some(instance)
    }

    pub fn is_active(&self, id: IndicatorId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn get(&self, id: IndicatorId) -> Option<&ActiveIndicator> {
        self.active.get(&id)
    }

    /// Active instances in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveIndicator> {
        self.active.values()
    }

    /// Active ids in activation order.
    pub fn ids_by_activation(&self) -> Vec<IndicatorId> {
        let mut all: Vec<&ActiveIndicator> = self.active.values().collect();
        all.sort_by_key(|a| a.order);
        all.into_iter().map(|a| a.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// True when `handle` is the live lifetime timer of `id`.
    pub fn owns_lifetime(&self, id: IndicatorId, handle: TimerHandle) -> bool {
        self.active
            .get(&id)
            .is_some_and(|a| a.lifetime_timer == Some(handle))
    }

    /// Lifetime timer fired: forget the handle so retiring does not cancel it twice.
    pub fn lifetime_elapsed(&mut self, id: IndicatorId) {
        if let Some(a) = self.active.get_mut(&id) {
            a.lifetime_timer = None;
        }
    }

    /// Blink timer fired: flip the phase and arm the next one.
    pub fn on_blink(&mut self, id: IndicatorId, handle: TimerHandle, turn: &mut Turn<'_>) {
        let Some(instance) = self.active.get_mut(&id) else {
            return;
        };
        let spec = instance.definition.blink;
        let Some(ref mut blink) = instance.blink else {
            return;
        };
        if blink.timer != Some(handle) {
            log::debug!("[engine] stale blink timer for {id}");
            return;
        }

        blink.lit = !blink.lit;
        let next = if blink.lit {
            turn.show(id);
            spec.on_ms()
        } else {
            turn.hide(id);
            spec.off_ms()
        };
        blink.timer = Some(turn.after(next, TimerEvent::Blink(id)));
    }

    /// Stop blinking while the indicator shares a multiplexed zone.
    pub fn suspend_blink(&mut self, id: IndicatorId, turn: &mut Turn<'_>) {
        if let Some(blink) = self.active.get_mut(&id).and_then(|a| a.blink.as_mut()) {
            turn.cancel(&mut blink.timer);
        }
    }

    /// Restart blinking from the lit phase, if it was suspended.
    pub fn resume_blink(&mut self, id: IndicatorId, turn: &mut Turn<'_>) {
        let Some(instance) = self.active.get_mut(&id) else {
            return;
        };
        let on_ms = instance.definition.blink.on_ms();
        if let Some(ref mut blink) = instance.blink
            && blink.timer.is_none()
        {
            blink.lit = true;
            blink.timer = Some(turn.after(on_ms, TimerEvent::Blink(id)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, Outbox};
    use crate::registry::{BlinkSpec, Lifetime};
    use crate::timer::TimerQueue;

    fn def(deck: u32, card: u32, blink: BlinkSpec, lifetime: Lifetime) -> Arc<IndicatorDefinition> {
        Arc::new(IndicatorDefinition {
            id: IndicatorId::new(deck, card),
            zone: ZoneId(1),
            blink,
            chime: None,
            lifetime,
            image: String::new(),
        })
    }

    fn fire_all(
        tracker: &mut ActivationTracker,
        timers: &mut TimerQueue<TimerEvent>,
        out: &mut Outbox,
        until: u64,
    ) {
        while let Some((handle, event)) = timers.pop_due(until) {
            if let TimerEvent::Blink(id) = event {
                tracker.on_blink(id, handle, &mut Turn::new(timers, out));
            }
        }
    }

    // ── activate / deactivate ──

    #[test]
    fn activate_is_idempotent() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let d = def(51, 1, BlinkSpec::steady(0.5), Lifetime::Seconds(5));
        let mut turn = Turn::new(&mut timers, &mut out);
        assert_eq!(tracker.activate(d.clone(), &mut turn), Activation::Created);
        assert_eq!(tracker.activate(d, &mut turn), Activation::Existing);
        assert_eq!(tracker.len(), 1);
        assert_eq!(timers.len(), 1, "one lifetime timer, no duplicate");
    }

    #[test]
    fn lifetime_timer_only_for_explicit_duration() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let mut turn = Turn::new(&mut timers, &mut out);
        tracker.activate(def(1, 1, BlinkSpec::steady(0.5), Lifetime::Indefinite), &mut turn);
        tracker.activate(def(1, 2, BlinkSpec::steady(0.5), Lifetime::Default), &mut turn);
        assert!(timers.is_empty());
    }

    #[test]
    fn deactivate_cancels_every_timer() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let id = IndicatorId::new(51, 2);
        let mut turn = Turn::new(&mut timers, &mut out);
        tracker.activate(def(51, 2, BlinkSpec::blinking(0.3), Lifetime::Seconds(5)), &mut turn);
        assert_eq!(turn.timers.len(), 2);
        let gone = tracker.deactivate(id, &mut turn).unwrap();
        assert_eq!(gone.id(), id);
        assert!(timers.is_empty());
        assert!(!tracker.is_active(id));
    }

    #[test]
    fn deactivate_inactive_is_none() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let mut turn = Turn::new(&mut timers, &mut out);
        assert!(tracker.deactivate(IndicatorId::new(9, 9), &mut turn).is_none());
    }

    #[test]
    fn activation_order_is_kept() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let mut turn = Turn::new(&mut timers, &mut out);
        tracker.activate(def(60, 1, BlinkSpec::steady(0.5), Lifetime::Default), &mut turn);
        tracker.activate(def(51, 1, BlinkSpec::steady(0.5), Lifetime::Default), &mut turn);
        assert_eq!(
            tracker.ids_by_activation(),
            vec![IndicatorId::new(60, 1), IndicatorId::new(51, 1)]
        );
    }

    // ── blink ──

    #[test]
    fn blink_follows_duty_cycle() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let id = IndicatorId::new(51, 2);
        out.show(0, id);
        out.drain();
        tracker.activate(
            def(51, 2, BlinkSpec::blinking(0.3), Lifetime::Default),
            &mut Turn::new(&mut timers, &mut out),
        );
        fire_all(&mut tracker, &mut timers, &mut out, 2_000);
        let stamps: Vec<(u64, bool)> = out
            .drain()
            .into_iter()
            .map(|e| (e.at_ms, matches!(e.event, Event::ShowIndicator { .. })))
            .collect();
        assert_eq!(
            stamps,
            vec![(300, false), (1_000, true), (1_300, false), (2_000, true)]
        );
    }

    #[test]
    fn suspend_and_resume_blink() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let id = IndicatorId::new(61, 1);
        let mut turn = Turn::new(&mut timers, &mut out);
        tracker.activate(def(61, 1, BlinkSpec::blinking(0.5), Lifetime::Default), &mut turn);
        assert!(tracker.get(id).unwrap().is_blinking());
        tracker.suspend_blink(id, &mut turn);
        assert!(!tracker.get(id).unwrap().is_blinking());
        assert!(turn.timers.is_empty());
        tracker.resume_blink(id, &mut turn);
        tracker.resume_blink(id, &mut turn);
        assert_eq!(timers.len(), 1, "resume is idempotent");
    }

    #[test]
    fn steady_indicator_has_no_blink_timer() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        let mut turn = Turn::new(&mut timers, &mut out);
        tracker.activate(def(1, 1, BlinkSpec::blinking(1.0), Lifetime::Default), &mut turn);
        tracker.resume_blink(IndicatorId::new(1, 1), &mut turn);
        assert!(timers.is_empty());
    }

    #[test]
    fn expires_at_uses_activation_time() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut tracker = ActivationTracker::new();
        timers.set_now(1_000);
        let mut turn = Turn::new(&mut timers, &mut out);
        tracker.activate(def(1, 1, BlinkSpec::steady(0.5), Lifetime::Seconds(90)), &mut turn);
        assert_eq!(tracker.get(IndicatorId::new(1, 1)).unwrap().expires_at(), Some(91_000));
    }
}
