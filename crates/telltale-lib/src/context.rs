//! Turn context: the mutable engine services one turn may touch.
//!
//! Every state transition (command, timer firing, playback completion) runs
//! as one turn. The orchestrator builds a [`Turn`] from its own fields and
//! lends it to the tracker, the zone multiplexer and the chime scheduler in
//! that order, so none of them owns the clock or the event sink.

use crate::events::{Event, Outbox, TimerEvent};
use crate::registry::IndicatorId;
use crate::timer::{TimerHandle, TimerQueue};

pub struct Turn<'a> {
    pub timers: &'a mut TimerQueue<TimerEvent>,
    pub out: &'a mut Outbox,
}

impl<'a> Turn<'a> {
    pub fn new(timers: &'a mut TimerQueue<TimerEvent>, out: &'a mut Outbox) -> Self {
        Self { timers, out }
    }

    /// Engine clock.
    pub fn now(&self) -> u64 {
        self.timers.now()
    }

    pub fn show(&mut self, id: IndicatorId) {
        let now = self.now();
        self.out.show(now, id);
    }

    pub fn hide(&mut self, id: IndicatorId) {
        let now = self.now();
        self.out.hide(now, id);
    }

    pub fn emit(&mut self, event: Event) {
        let now = self.now();
        self.out.push(now, event);
    }

    pub fn after(&mut self, delay_ms: u64, event: TimerEvent) -> TimerHandle {
        self.timers.schedule_once(delay_ms, event)
    }

    pub fn every(&mut self, period_ms: u64, event: TimerEvent) -> TimerHandle {
        self.timers.schedule_repeating(period_ms, event)
    }

    /// Cancel the timer in `slot`, if any, leaving `None`.
    pub fn cancel(&mut self, slot: &mut Option<TimerHandle>) {
        if let Some(handle) = slot.take() {
            self.timers.cancel(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_is_stamped_with_clock() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        timers.set_now(250);
        let mut turn = Turn::new(&mut timers, &mut out);
        turn.show(IndicatorId::new(51, 1));
        assert_eq!(out.drain()[0].at_ms, 250);
    }

    #[test]
    fn cancel_clears_slot() {
        let mut timers = TimerQueue::new();
        let mut out = Outbox::new();
        let mut turn = Turn::new(&mut timers, &mut out);
        let mut slot = Some(turn.after(100, TimerEvent::Blink(IndicatorId::new(1, 1))));
        turn.cancel(&mut slot);
        assert!(slot.is_none());
        assert!(timers.is_empty());
    }
}
