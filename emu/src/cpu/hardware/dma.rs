//! The four DMA channels.
//!
//! A channel arms when its enable bit rises with a matching start-timing
//! selection, latches its working source/destination/length from the
//! MMIO-visible registers (masked to the channel's address width), and then
//! transfers until that latched length is exhausted. [`Bus`](crate::bus::Bus)
//! owns the actual memory access (only it can reach every address space), so
//! this module only tracks the state machine: what is armed, how far a
//! transfer has progressed, and what should happen at completion.
//!
//! Channels 1 and 2 have a second job: when armed by [`Occasion::Special`]
//! with a FIFO destination, they ignore the programmed length and move
//! exactly four words without advancing the destination, refilling the
//! sound FIFOs on a timer overflow.

use serde::{Deserialize, Serialize};

/// What triggered (or should trigger) a channel's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occasion {
    Immediate,
    VBlank,
    HBlank,
    /// DMA1/2 sound-FIFO refill; also the DMA3 video-capture trigger, which
    /// this core does not model.
    Special,
}

impl Occasion {
    const fn matches(self, start_timing_bits: u16) -> bool {
        matches!(
            (self, start_timing_bits),
            (Self::Immediate, 0) | (Self::VBlank, 1) | (Self::HBlank, 2) | (Self::Special, 3)
        )
    }
}

/// Addresses of sound FIFO A / FIFO B, the destinations that select the
/// fixed-length, non-advancing FIFO-DMA path on channels 1 and 2.
const FIFO_A_ADDRESS: u32 = 0x0400_00A0;
const FIFO_B_ADDRESS: u32 = 0x0400_00A4;

/// DMA0 is the only channel wired to an `/IRQ`-style bus arbiter that never
/// grants it BIOS or Game Pak ROM; a read from either surfaces the DMA
/// open-bus latch instead.
const fn is_bios_or_rom(address: u32) -> bool {
    matches!(address, 0x0000_0000..=0x0000_3FFF | 0x0800_0000..=0x0DFF_FFFF)
}

#[derive(Debug, Clone, Copy)]
pub struct TransferUnit {
    pub source: u32,
    pub destination: u32,
    pub is_32bit: bool,
    /// `false` on channel 0 when `source` is BIOS or ROM: the read must not
    /// happen, and the transfer instead writes the current open-bus value.
    pub allow_read: bool,
}

pub enum TransferOutcome {
    Continue,
    Done { raise_irq: bool },
}

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
pub struct Registers {
    pub source_address: u32,
    pub destination_address: u32,
    pub word_count: u16,
    pub control: u16,

    /// Working copy of the source address, latched and masked at arm time.
    pub internal_source: u32,
    /// Working copy of the destination address, latched and masked at arm
    /// time (or re-latched each pulse, for a destination-reload repeat
    /// channel).
    pub internal_dest: u32,
    internal_remaining: u32,
    /// Set once this channel has latched for its current enable period, so
    /// a write that merely pokes an already-enabled control register
    /// doesn't re-arm it.
    armed: bool,
    fifo_transfer: bool,
    /// Latched at arm time: `false` only for channel 0 reading BIOS/ROM.
    allow_read: bool,
}

impl Registers {
    const fn enabled(&self) -> bool {
        self.control & (1 << 15) != 0
    }

    const fn repeat(&self) -> bool {
        self.control & (1 << 9) != 0
    }

    const fn start_timing_bits(&self) -> u16 {
        (self.control >> 12) & 0b11
    }

    const fn irq_on_complete(&self) -> bool {
        self.control & (1 << 14) != 0
    }

    const fn is_32bit(&self) -> bool {
        self.control & (1 << 10) != 0
    }

    /// 0 = increment, 1 = decrement, 2 = fixed, 3 = increment and reload.
    const fn dest_control(&self) -> u16 {
        (self.control >> 5) & 0b11
    }

    /// 0 = increment, 1 = decrement, 2 = fixed, 3 = reserved (treated as fixed).
    const fn source_control(&self) -> u16 {
        (self.control >> 7) & 0b11
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [Registers; 4],
}

impl Dma {
    fn address_masks(index: usize) -> (u32, u32, u16) {
        let source_mask = if index == 0 { 0x07FF_FFFF } else { 0x0FFF_FFFF };
        let dest_mask = if index == 3 { 0x0FFF_FFFF } else { 0x07FF_FFFF };
        let length_mask = if index == 3 { 0xFFFF } else { 0x3FFF };
        (source_mask, dest_mask, length_mask)
    }

    fn latch(&mut self, index: usize) {
        let (source_mask, dest_mask, length_mask) = Self::address_masks(index);
        let regs = &mut self.channels[index];
        regs.internal_source = regs.source_address & source_mask;
        regs.internal_dest = regs.destination_address & dest_mask;
        let requested = regs.word_count & length_mask;
        regs.internal_remaining =
            u32::from(if requested == 0 { length_mask + 1 } else { requested });
        regs.fifo_transfer = false;
        regs.allow_read = !(index == 0 && is_bios_or_rom(regs.internal_source));
    }

    fn latch_fifo(&mut self, index: usize) {
        let regs = &mut self.channels[index];
        regs.internal_source = regs.source_address & 0x0FFF_FFFF;
        regs.internal_dest = regs.destination_address;
        regs.internal_remaining = 4;
        regs.fifo_transfer = true;
        regs.allow_read = !(index == 0 && is_bios_or_rom(regs.internal_source));
    }

    const fn is_fifo_destination(address: u32) -> bool {
        address == FIFO_A_ADDRESS || address == FIFO_B_ADDRESS
    }

    /// Arm channel `index` for `occasion` if its control register calls for
    /// it. Returns `true` if the channel just became ready to transfer.
    ///
    /// Channels 1 and 2 take the FIFO path instead of their ordinary latch
    /// when armed by [`Occasion::Special`] with a FIFO destination; DMA0 and
    /// DMA3 never take it.
    pub fn try_arm(&mut self, index: usize, occasion: Occasion) -> bool {
        let regs = self.channels[index];
        if !regs.enabled() || !occasion.matches(regs.start_timing_bits()) {
            return false;
        }

        let is_fifo = occasion == Occasion::Special
            && (index == 1 || index == 2)
            && Self::is_fifo_destination(regs.destination_address);

        if regs.armed {
            // Already latched; only a repeat channel re-triggers, and only
            // on a fresh pulse of its own occasion (never re-armed by the
            // write-triggered Immediate re-check).
            if occasion == Occasion::Immediate || !regs.repeat() {
                return false;
            }
        }

        if is_fifo {
            self.latch_fifo(index);
        } else {
            self.latch(index);
        }
        self.channels[index].armed = true;
        true
    }

    /// Disarm a channel so the next 0-to-1 enable edge re-latches it.
    fn disarm(&mut self, index: usize) {
        self.channels[index].armed = false;
    }

    /// Clear the software-visible enable bit, e.g. on non-repeat completion.
    fn clear_enable(&mut self, index: usize) {
        self.channels[index].control &= !(1 << 15);
    }

    #[must_use]
    pub fn next_unit(&self, index: usize) -> TransferUnit {
        let regs = &self.channels[index];
        TransferUnit {
            source: regs.internal_source,
            destination: regs.internal_dest,
            is_32bit: regs.fifo_transfer || regs.is_32bit(),
            allow_read: regs.allow_read,
        }
    }

    /// Arms `index` for `occasion`; semantically identical to
    /// [`Self::try_arm`], named for the request/grant relationship between a
    /// channel and the shared Game Pak/system bus it competes for.
    pub fn request(&mut self, index: usize, occasion: Occasion) -> bool {
        self.try_arm(index, occasion)
    }

    /// The lowest-indexed (highest priority) channel that is currently armed
    /// with units left to move, if any.
    #[must_use]
    pub fn highest_priority_runnable(&self) -> Option<usize> {
        (0..4).find(|&i| self.channels[i].armed)
    }

    /// `true` when a strictly higher-priority channel than `index` is also
    /// armed right now. A transfer loop driving `index` one unit at a time
    /// should re-check [`Self::highest_priority_runnable`] after every unit
    /// rather than running `index` to completion, so a higher-priority
    /// channel arming mid-transfer preempts it immediately.
    #[must_use]
    pub fn is_interleaved(&self, index: usize) -> bool {
        (0..index).any(|i| self.channels[i].armed)
    }

    /// Advance channel `index` by one transferred unit. Call only after
    /// actually moving the data at the addresses [`Self::next_unit`]
    /// reported.
    pub fn advance(&mut self, index: usize) -> TransferOutcome {
        let unit_size: u32 =
            if self.channels[index].fifo_transfer || self.channels[index].is_32bit() {
                4
            } else {
                2
            };

        {
            let regs = &mut self.channels[index];
            regs.internal_source =
                step_address(regs.internal_source, regs.source_control(), unit_size);
            if !regs.fifo_transfer {
                regs.internal_dest =
                    step_address(regs.internal_dest, regs.dest_control(), unit_size);
            }
            regs.internal_remaining -= 1;
        }

        if self.channels[index].internal_remaining == 0 {
            let regs = self.channels[index];
            let raise_irq = regs.irq_on_complete();

            if regs.fifo_transfer {
                // Re-latches on the next Special pulse; stays enabled.
                self.disarm(index);
            } else if regs.repeat() {
                if regs.dest_control() == 3 {
                    let (_, dest_mask, _) = Self::address_masks(index);
                    self.channels[index].internal_dest =
                        self.channels[index].destination_address & dest_mask;
                }
                let (_, _, length_mask) = Self::address_masks(index);
                let requested = self.channels[index].word_count & length_mask;
                self.channels[index].internal_remaining =
                    u32::from(if requested == 0 { length_mask + 1 } else { requested });

                if regs.start_timing_bits() == 0 {
                    // Immediate has no further occasion to wait on.
                    self.disarm(index);
                    self.clear_enable(index);
                } else {
                    self.disarm(index);
                }
            } else {
                self.disarm(index);
                self.clear_enable(index);
            }

            TransferOutcome::Done { raise_irq }
        } else {
            TransferOutcome::Continue
        }
    }

    /// Drop a channel's armed state once its enable bit reads low, so a
    /// later 0-to-1 edge is recognized as fresh.
    pub fn notice_disable(&mut self, index: usize) {
        if !self.channels[index].enabled() {
            self.disarm(index);
        }
    }
}

const fn step_address(address: u32, control_bits: u16, unit_size: u32) -> u32 {
    match control_bits {
        1 => address.wrapping_sub(unit_size),
        2 => address,
        _ => address.wrapping_add(unit_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed_immediate(word_count: u16, control: u16) -> Dma {
        let mut dma = Dma::default();
        dma.channels[0].source_address = 0x0800_0000;
        dma.channels[0].destination_address = 0x0200_0000;
        dma.channels[0].word_count = word_count;
        dma.channels[0].control = control | (1 << 15);
        dma
    }

    #[test]
    fn immediate_transfer_arms_once() {
        let mut dma = armed_immediate(4, 0);
        assert!(dma.try_arm(0, Occasion::Immediate));
        assert!(!dma.try_arm(0, Occasion::Immediate));
    }

    #[test]
    fn zero_length_means_max_length() {
        let mut dma = armed_immediate(0, 0);
        dma.try_arm(0, Occasion::Immediate);
        assert_eq!(dma.channels[0].internal_remaining, 0x4000);
    }

    #[test]
    fn transfer_runs_to_completion_and_clears_enable() {
        let mut dma = armed_immediate(2, 0);
        dma.try_arm(0, Occasion::Immediate);

        let outcome1 = dma.advance(0);
        assert!(matches!(outcome1, TransferOutcome::Continue));
        let outcome2 = dma.advance(0);
        assert!(matches!(
            outcome2,
            TransferOutcome::Done { raise_irq: false }
        ));
        assert_eq!(dma.channels[0].control & (1 << 15), 0);
    }

    #[test]
    fn irq_on_complete_is_reported() {
        let mut dma = armed_immediate(1, 1 << 14);
        dma.try_arm(0, Occasion::Immediate);
        let outcome = dma.advance(0);
        assert!(matches!(outcome, TransferOutcome::Done { raise_irq: true }));
    }

    #[test]
    fn fifo_dma_always_moves_four_words_without_advancing_dest() {
        let mut dma = Dma::default();
        dma.channels[1].source_address = 0x0200_1000;
        dma.channels[1].destination_address = FIFO_A_ADDRESS;
        dma.channels[1].word_count = 100; // ignored by the FIFO path
        dma.channels[1].control = (1 << 15) | (3 << 12); // enable, Special timing

        assert!(dma.try_arm(1, Occasion::Special));
        assert_eq!(dma.channels[1].internal_remaining, 4);

        for _ in 0..3 {
            assert!(matches!(dma.advance(1), TransferOutcome::Continue));
        }
        assert!(matches!(dma.advance(1), TransferOutcome::Done { .. }));
        assert_eq!(dma.channels[1].internal_dest, FIFO_A_ADDRESS);
    }

    #[test]
    fn repeat_channel_rearms_on_next_pulse() {
        let mut dma = Dma::default();
        dma.channels[2].word_count = 1;
        dma.channels[2].control = (1 << 15) | (1 << 9) | (1 << 12); // enable, repeat, VBlank

        assert!(dma.try_arm(2, Occasion::VBlank));
        dma.advance(2);
        // Still enabled (repeat) and ready for the next VBlank pulse.
        assert_ne!(dma.channels[2].control & (1 << 15), 0);
        assert!(dma.try_arm(2, Occasion::VBlank));
    }

    #[test]
    fn non_matching_occasion_does_not_arm() {
        let mut dma = armed_immediate(4, 1 << 12); // start timing = VBlank
        assert!(!dma.try_arm(0, Occasion::Immediate));
    }

    #[test]
    fn channel_zero_reading_rom_is_not_allowed() {
        let mut dma = armed_immediate(4, 0);
        dma.channels[0].source_address = 0x0800_0000; // ROM
        dma.try_arm(0, Occasion::Immediate);
        assert!(!dma.next_unit(0).allow_read);
    }

    #[test]
    fn channel_zero_reading_ewram_is_allowed() {
        let mut dma = armed_immediate(4, 0);
        dma.channels[0].source_address = 0x0200_0000; // EWRAM
        dma.try_arm(0, Occasion::Immediate);
        assert!(dma.next_unit(0).allow_read);
    }

    #[test]
    fn other_channels_may_read_rom() {
        let mut dma = Dma::default();
        dma.channels[1].source_address = 0x0800_0000;
        dma.channels[1].destination_address = 0x0200_0000;
        dma.channels[1].word_count = 4;
        dma.channels[1].control = 1 << 15;
        dma.try_arm(1, Occasion::Immediate);
        assert!(dma.next_unit(1).allow_read);
    }

    #[test]
    fn higher_priority_channel_is_runnable_first() {
        let mut dma = Dma::default();
        dma.channels[2].word_count = 1;
        dma.channels[2].control = 1 << 15;
        dma.try_arm(2, Occasion::Immediate);
        assert_eq!(dma.highest_priority_runnable(), Some(2));

        dma.channels[0].word_count = 1;
        dma.channels[0].control = 1 << 15;
        dma.try_arm(0, Occasion::Immediate);

        assert_eq!(dma.highest_priority_runnable(), Some(0));
        assert!(dma.is_interleaved(2));
        assert!(!dma.is_interleaved(0));
    }
}
