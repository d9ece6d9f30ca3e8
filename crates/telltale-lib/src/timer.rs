//! Timer service: a virtual millisecond clock with cancellable one-shot and
//! repeating timers.
//!
//! Nothing here sleeps. The owner advances the clock and pops due timers one
//! at a time, so every firing is a discrete turn and tests can drive time
//! deterministically. A wall-clock driver simply maps elapsed real time onto
//! the same calls.

use std::collections::{BTreeMap, HashMap};

/// Handle returned by `schedule_*`, used to cancel a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy)]
struct Slot {
    deadline: u64,
    period: Option<u64>,
}

/// Deadline-ordered timer queue. Ties fire in scheduling order.
#[derive(Debug)]
pub struct TimerQueue<T> {
    now: u64,
    next_id: u64,
    pending: BTreeMap<(u64, u64), T>,
    slots: HashMap<u64, Slot>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            now: 0,
            next_id: 0,
            pending: BTreeMap::new(),
            slots: HashMap::new(),
        }
    }

    /// Current clock value in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Move the clock forward. Never moves it backwards.
    pub fn set_now(&mut self, now: u64) {
        self.now = self.now.max(now);
    }

    /// Fire `payload` once, `delay_ms` from now.
    pub fn schedule_once(&mut self, delay_ms: u64, payload: T) -> TimerHandle {
        self.insert(delay_ms, None, payload)
    }

    /// Fire `payload` every `period_ms` (minimum 1), first firing one period from now.
    pub fn schedule_repeating(&mut self, period_ms: u64, payload: T) -> TimerHandle {
        let period = period_ms.max(1);
        self.insert(period, Some(period), payload)
    }

    fn insert(&mut self, delay_ms: u64, period: Option<u64>, payload: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = self.now.saturating_add(delay_ms);
        self.pending.insert((deadline, id), payload);
        self.slots.insert(id, Slot { deadline, period });
        TimerHandle(id)
    }

    /// Cancel a timer. Returns `false` if it already fired (one-shot) or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.slots.remove(&handle.0) {
            Some(slot) => {
                self.pending.remove(&(slot.deadline, handle.0));
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.slots.contains_key(&handle.0)
    }

    /// Deadline of a pending timer.
    pub fn deadline(&self, handle: TimerHandle) -> Option<u64> {
        self.slots.get(&handle.0).map(|s| s.deadline)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.keys().next().map(|&(deadline, _)| deadline)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T: Clone> TimerQueue<T> {
    /// Pop the earliest timer due at or before `until`, advancing the clock to
    /// its deadline. Repeating timers are re-armed under the same handle.
    pub fn pop_due(&mut self, until: u64) -> Option<(TimerHandle, T)> {
        let (&(deadline, id), _) = self.pending.iter().next()?;
        if deadline > until {
            return None;
        }
        let payload = self.pending.remove(&(deadline, id))?;
        self.now = self.now.max(deadline);

        match self.slots.get(&id).and_then(|s| s.period) {
            Some(period) => {
                let next = deadline.saturating_add(period);
                self.pending.insert((next, id), payload.clone());
                self.slots.insert(
                    id,
                    Slot {
                        deadline: next,
                        period: Some(period),
                    },
                );
            }
            None => {
                self.slots.remove(&id);
            }
        }
        Some((TimerHandle(id), payload))
    }
}
