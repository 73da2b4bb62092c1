//! Cycle-timestamped event queue.
//!
//! Every subsystem that needs to "wake up" after some number of cycles —
//! the APU's sample-rate tick, a deferred DMA re-arm, anything that isn't
//! naturally driven by the per-cycle [`step`](crate::bus::Bus::step) calls —
//! registers an event here instead of keeping its own countdown. This keeps
//! "how many cycles until something interesting happens" answerable in one
//! place, which is what lets the CPU fast-forward through a halt instead of
//! single-stepping it.
//!
//! Handlers aren't stored as closures (that would need the scheduler to hold
//! a reference back into the component that registered them, the exact
//! back-pointer shape the rest of this core avoids). Instead every event
//! carries a plain [`EventKind`] tag; the owner (`Bus`) drains due events
//! from [`Scheduler::add_cycles`] and dispatches on the tag itself.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Handle returned by [`Scheduler::add`], usable with [`Scheduler::cancel`].
pub type EventHandle = u64;

/// What kind of work is due when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The APU should mix and emit the next stereo sample.
    ApuSample,
    /// Test/generic marker with no side effect of its own.
    Generic(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduledEvent {
    timestamp: u64,
    handle: EventHandle,
    kind: EventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest timestamp sorts first.
        other.timestamp.cmp(&self.timestamp)
    }
}

/// A fired event, handed back to the caller of [`Scheduler::add_cycles`].
#[derive(Debug, Clone, Copy)]
pub struct Due {
    pub kind: EventKind,
    /// How far `now` overshot the event's target timestamp.
    pub cycles_late: u64,
}

/// The event at the top of the heap stays there until `add_cycles` drains it;
/// 64 pending events is comfortably more than this core ever schedules at
/// once (one APU sample event plus a handful of test/generic markers).
const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
pub struct Scheduler {
    now: u64,
    next_handle: EventHandle,
    heap: BinaryHeap<ScheduledEvent>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            now: 0,
            next_handle: 0,
            heap: BinaryHeap::with_capacity(DEFAULT_CAPACITY),
        }
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `kind` to fire `delay` cycles from `now`. `delay == 0` fires
    /// on the next call to [`Self::add_cycles`], even `add_cycles(0)`... no,
    /// `add_cycles` only drains when `now >= timestamp`, so a zero-delay event
    /// needs at least one cycle to elapse, same as real hardware latency.
    pub fn add(&mut self, delay: u64, kind: EventKind) -> EventHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.heap.push(ScheduledEvent {
            timestamp: self.now + delay,
            handle,
            kind,
        });
        handle
    }

    /// Cancel a pending event. A no-op if `handle` already fired or never
    /// existed — the heap is rebuilt without it either way.
    pub fn cancel(&mut self, handle: EventHandle) {
        if self.heap.iter().any(|e| e.handle == handle) {
            let remaining: Vec<_> = self.heap.drain().filter(|e| e.handle != handle).collect();
            self.heap = remaining.into();
        }
    }

    /// Advance `now` by `n` cycles and drain every event whose timestamp has
    /// been reached, earliest first. Tie-break order between events sharing
    /// a timestamp is unspecified.
    pub fn add_cycles(&mut self, n: u64) -> Vec<Due> {
        self.now += n;

        let mut fired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.timestamp > self.now {
                break;
            }
            let event = self.heap.pop().expect("peeked event must be present");
            fired.push(Due {
                kind: event.kind,
                cycles_late: self.now - event.timestamp,
            });
        }
        fired
    }

    /// Cycles remaining until the earliest pending event, or `None` if the
    /// queue is empty. Used to size a halt fast-forward.
    #[must_use]
    pub fn cycles_until_next(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.timestamp.saturating_sub(self.now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_once_with_no_overshoot() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.add(10, EventKind::Generic(1));

        let fired = scheduler.add_cycles(9);
        assert!(fired.is_empty());

        let fired = scheduler.add_cycles(1);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].cycles_late, 0);
        assert_eq!(fired[0].kind, EventKind::Generic(1));

        // Firing again must not re-deliver the same event.
        let fired = scheduler.add_cycles(100);
        assert!(fired.is_empty());
        let _ = handle;
    }

    #[test]
    fn overshoot_is_reported() {
        let mut scheduler = Scheduler::new();
        scheduler.add(5, EventKind::Generic(0));

        let fired = scheduler.add_cycles(8);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].cycles_late, 3);
    }

    #[test]
    fn cancel_before_fire_is_a_no_op_after() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.add(5, EventKind::Generic(0));
        scheduler.cancel(handle);

        let fired = scheduler.add_cycles(10);
        assert!(fired.is_empty());
    }

    #[test]
    fn cancel_after_fire_is_harmless() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.add(1, EventKind::Generic(0));
        let fired = scheduler.add_cycles(1);
        assert_eq!(fired.len(), 1);

        scheduler.cancel(handle); // no panic, no effect
    }

    #[test]
    fn drains_in_timestamp_order() {
        let mut scheduler = Scheduler::new();
        scheduler.add(20, EventKind::Generic(2));
        scheduler.add(5, EventKind::Generic(0));
        scheduler.add(10, EventKind::Generic(1));

        let fired = scheduler.add_cycles(25);
        let order: Vec<_> = fired
            .iter()
            .map(|d| match d.kind {
                EventKind::Generic(n) => n,
                EventKind::ApuSample => u32::MAX,
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn reschedule_from_within_drain_is_the_periodic_tick_pattern() {
        let mut scheduler = Scheduler::new();
        scheduler.add(4, EventKind::ApuSample);

        let mut fires = 0;
        for _ in 0..20 {
            for due in scheduler.add_cycles(4) {
                if due.kind == EventKind::ApuSample {
                    fires += 1;
                    scheduler.add(4, EventKind::ApuSample);
                }
            }
        }
        assert_eq!(fires, 20);
    }
}
