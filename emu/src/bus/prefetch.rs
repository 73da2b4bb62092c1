//! The GamePak prefetch unit.
//!
//! When `WAITCNT`'s prefetch-enable bit is set, the bus speculatively reads
//! ahead of the CPU along sequential ROM opcode fetches while the Game Pak
//! bus would otherwise sit idle, so the next fetch can be served in a single
//! cycle instead of paying the full non-sequential wait state. This unit
//! only tracks the state machine -- how many halfwords are queued, and how
//! long until the next one lands -- since the opcode byte values themselves
//! always come from the normal memory read path regardless of timing.

use serde::{Deserialize, Serialize};

/// Real hardware's queue holds up to 8 halfwords ahead of the CPU.
const QUEUE_CAPACITY: u32 = 8;

#[derive(Default, Serialize, Deserialize)]
pub struct Prefetch {
    active: bool,
    /// Halfwords currently queued ahead of `last_address`.
    queued: u32,
    /// Sequential-access cycles left before `queued` grows by one.
    countdown: u32,
    /// Cycles a queue slot costs to fill; the ROM window's own `S` time.
    fill_cycles: u32,
    /// Address of the most recently consumed (or restarted-from) halfword.
    /// The next opcode fetch only hits the queue if it asks for
    /// `last_address + width`; anything else is a branch and misses.
    last_address: usize,
}

impl Prefetch {
    /// Begin buffering from `address`, paying `fill_cycles` sequential
    /// cycles per queued halfword. Called on every miss, including the very
    /// first fetch after the unit goes idle.
    pub fn restart(&mut self, address: usize, fill_cycles: u32) {
        self.active = true;
        self.queued = 0;
        self.fill_cycles = fill_cycles.max(1);
        self.countdown = self.fill_cycles;
        self.last_address = address;
    }

    /// Drop whatever is queued. Called on a branch, a disabled WAITCNT bit,
    /// or any Game Pak access the unit doesn't model (data reads, DMA).
    pub fn abort(&mut self) {
        self.active = false;
        self.queued = 0;
    }

    /// Let the buffer keep filling for `cycles` of bus time it wasn't asked
    /// to serve a fetch.
    pub fn tick(&mut self, cycles: u32) {
        if !self.active || self.queued >= QUEUE_CAPACITY {
            return;
        }
        let mut remaining = cycles;
        while remaining > 0 && self.queued < QUEUE_CAPACITY {
            if remaining < self.countdown {
                self.countdown -= remaining;
                return;
            }
            remaining -= self.countdown;
            self.countdown = self.fill_cycles;
            self.queued += 1;
        }
    }

    /// Ask for the halfword at `address` (the CPU's opcode fetch, `width`
    /// bytes past the last one it asked for). Returns `true` on a queue hit,
    /// consuming one slot; `false` on a miss, leaving the caller to
    /// [`Self::restart`] from `address`.
    pub fn try_consume(&mut self, address: usize, width: usize) -> bool {
        if !self.active || self.queued == 0 || address != self.last_address.wrapping_add(width) {
            return false;
        }
        self.queued -= 1;
        self.last_address = address;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_restarts_and_does_not_serve_until_filled() {
        let mut pf = Prefetch::default();
        pf.restart(0x0800_0000, 3);
        assert!(!pf.try_consume(0x0800_0002, 2));
    }

    #[test]
    fn ticking_through_fill_cycles_queues_a_halfword() {
        let mut pf = Prefetch::default();
        pf.restart(0x0800_0000, 3);
        pf.tick(3);
        assert!(pf.try_consume(0x0800_0002, 2));
        assert!(!pf.try_consume(0x0800_0004, 2));
    }

    #[test]
    fn queue_never_exceeds_capacity() {
        let mut pf = Prefetch::default();
        pf.restart(0x0800_0000, 1);
        pf.tick(100);
        assert_eq!(pf.queued, QUEUE_CAPACITY);
    }

    #[test]
    fn non_adjacent_address_is_a_miss() {
        let mut pf = Prefetch::default();
        pf.restart(0x0800_0000, 1);
        pf.tick(8);
        assert!(!pf.try_consume(0x0800_0100, 2));
    }

    #[test]
    fn abort_drains_the_queue() {
        let mut pf = Prefetch::default();
        pf.restart(0x0800_0000, 1);
        pf.tick(8);
        pf.abort();
        assert!(!pf.try_consume(0x0800_0002, 2));
    }
}
