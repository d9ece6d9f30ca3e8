//! Zone multiplexer: round-robin visibility among active members that share
//! a display zone.
//!
//! A zone exists while it has members. With one member that member is shown
//! and flashes on its own blink timer; with two or more a repeating cycle
//! timer shows exactly one member at a time, in activation order.

use std::collections::BTreeMap;

use crate::context::Turn;
use crate::events::TimerEvent;
use crate::registry::{BlinkSpec, IndicatorId, ZoneId};
use crate::timer::TimerHandle;

/// Zone occupancy after a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    Empty,
    Solo(IndicatorId),
    Multiplexed,
}

#[derive(Debug, Clone, Copy)]
struct Member {
    id: IndicatorId,
    blink: BlinkSpec,
}

#[derive(Debug)]
struct Zone {
    members: Vec<Member>,
    cursor: usize,
    cycle_timer: Option<TimerHandle>,
    interval_ms: u64,
}

impl Zone {
    fn current(&self) -> Option<IndicatorId> {
        self.members.get(self.cursor).map(|m| m.id)
    }

    fn occupancy(&self) -> Occupancy {
        match self.members.as_slice() {
            [] => Occupancy::Empty,
            [only] => Occupancy::Solo(only.id),
            _ => Occupancy::Multiplexed,
        }
    }
}

/// Cycle interval: shortest lit time over members that actually toggle, or
/// `default_ms` when none does. A zero duty cycle never drives the interval.
pub fn cycle_interval(blinks: impl IntoIterator<Item = BlinkSpec>, default_ms: u64) -> u64 {
    blinks
        .into_iter()
        .filter(BlinkSpec::toggles)
        .map(|b| b.on_ms())
        .min()
        .unwrap_or(default_ms)
        .max(1)
}

#[derive(Debug)]
pub struct ZoneMultiplexer {
    zones: BTreeMap<ZoneId, Zone>,
    default_interval_ms: u64,
}

impl ZoneMultiplexer {
    pub fn new(default_interval_ms: u64) -> Self {
        Self {
            zones: BTreeMap::new(),
            default_interval_ms,
        }
    }

    /// Append `id` to `zone`, creating the zone on first use.
    pub fn add(&mut self, zone_id: ZoneId, id: IndicatorId, blink: BlinkSpec, turn: &mut Turn<'_>) -> Occupancy {
        let zone = self.zones.entry(zone_id).or_insert_with(|| Zone {
            members: Vec::new(),
            cursor: 0,
            cycle_timer: None,
            interval_ms: 0,
        });
        if zone.members.iter().any(|m| m.id == id) {
            return zone.occupancy();
        }
        zone.members.push(Member { id, blink });
        self.recompute(zone_id, turn)
    }

    /// Remove `id` from `zone`, hiding it. The cursor keeps pointing at a
    /// live member.
    pub fn remove(&mut self, zone_id: ZoneId, id: IndicatorId, turn: &mut Turn<'_>) -> Occupancy {
        let Some(zone) = self.zones.get_mut(&zone_id) else {
            return Occupancy::Empty;
        };
        let Some(index) = zone.members.iter().position(|m| m.id == id) else {
            return zone.occupancy();
        };
        zone.members.remove(index);
        turn.hide(id);

        if index < zone.cursor {
            zone.cursor -= 1;
        }
        if zone.cursor >= zone.members.len() {
            zone.cursor = 0;
        }
        self.recompute(zone_id, turn)
    }

    fn recompute(&mut self, zone_id: ZoneId, turn: &mut Turn<'_>) -> Occupancy {
        let Some(zone) = self.zones.get_mut(&zone_id) else {
            return Occupancy::Empty;
        };
        let occupancy = zone.occupancy();
        match occupancy {
            Occupancy::Empty => {
                turn.cancel(&mut zone.cycle_timer);
                self.zones.remove(&zone_id);
                log::debug!("[zone] zone {zone_id} is empty");
            }
            Occupancy::Solo(only) => {
                if zone.cycle_timer.is_some() {
                    log::debug!("[zone] zone {zone_id} stops cycling, {only} remains");
                }
                turn.cancel(&mut zone.cycle_timer);
                zone.cursor = 0;
                turn.show(only);
            }
            Occupancy::Multiplexed => {
                let current = zone.current();
                for m in &zone.members {
                    if Some(m.id) == current {
                        turn.show(m.id);
                    } else {
                        turn.hide(m.id);
                    }
                }
                zone.interval_ms =
                    cycle_interval(zone.members.iter().map(|m| m.blink), self.default_interval_ms);
                turn.cancel(&mut zone.cycle_timer);
                zone.cycle_timer = Some(turn.every(zone.interval_ms, TimerEvent::ZoneCycle(zone_id)));
                log::debug!(
                    "[zone] zone {zone_id} cycles {} members every {} ms",
                    zone.members.len(),
                    zone.interval_ms
                );
            }
        }
        occupancy
    }

    /// Cycle timer fired: hide the current member and show the next.
    pub fn tick(&mut self, zone_id: ZoneId, handle: TimerHandle, turn: &mut Turn<'_>) {
        let Some(zone) = self.zones.get_mut(&zone_id) else {
            return;
        };
        if zone.cycle_timer != Some(handle) || zone.members.len() < 2 {
            return;
        }
        if let Some(current) = zone.current() {
            turn.hide(current);
        }
        zone.cursor = (zone.cursor + 1) % zone.members.len();
        if let Some(next) = zone.current() {
            turn.show(next);
        }
    }

    /// Members of a zone in activation order.
    pub fn members(&self, zone_id: ZoneId) -> Vec<IndicatorId> {
        self.zones
            .get(&zone_id)
            .map(|z| z.members.iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }

    /// The member the cursor points at.
    pub fn current(&self, zone_id: ZoneId) -> Option<IndicatorId> {
        self.zones.get(&zone_id).and_then(Zone::current)
    }

    pub fn occupancy(&self, zone_id: ZoneId) -> Occupancy {
        self.zones
            .get(&zone_id)
            .map(Zone::occupancy)
            .unwrap_or(Occupancy::Empty)
    }

    /// Cycle interval of a multiplexed zone.
    pub fn interval(&self, zone_id: ZoneId) -> Option<u64> {
        self.zones
            .get(&zone_id)
            .filter(|z| z.cycle_timer.is_some())
            .map(|z| z.interval_ms)
    }

    /// Zones that currently have members.
    pub fn zone_ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.keys().copied()
    }
}
