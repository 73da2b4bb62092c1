//! Interrupt controller registers.
//!
//! The GBA interrupt system allows hardware events to trigger CPU exceptions.
//! Three registers control interrupt behavior:
//!
//! # Interrupt Registers
//!
//! | Register | Address       | Description                                    |
//! |----------|---------------|------------------------------------------------|
//! | IE       | `0x0400_0200` | Interrupt Enable - which IRQs can fire         |
//! | IF       | `0x0400_0202` | Interrupt Request Flags - pending interrupts   |
//! | IME      | `0x0400_0208` | Interrupt Master Enable - global on/off        |
//!
//! # Interrupt Sources
//!
//! Each bit in IE/IF corresponds to an interrupt source:
//!
//! | Bit | Source  | Description                    |
//! |-----|---------|--------------------------------|
//! | 0   | VBlank  | Vertical blank period started  |
//! | 1   | HBlank  | Horizontal blank period        |
//! | 2   | VCount  | Scanline counter match         |
//! | 3-6 | Timer   | Timer 0-3 overflow             |
//! | 7   | Serial  | Serial communication           |
//! | 8-11| DMA     | DMA 0-3 complete               |
//! | 12  | Keypad  | Button combination pressed     |
//! | 13  | GamePak | External cartridge interrupt   |
//!
//! # Interrupt Flow
//!
//! 1. Hardware sets a bit in IF when an event occurs
//! 2. If that bit is also set in IE, and IME is enabled, the CPU takes an IRQ exception
//! 3. The IRQ handler reads IF to determine which interrupt(s) fired
//! 4. Handler writes `1` to IF bits to acknowledge/clear them
//!
//! See [`Bus::is_irq_pending`](crate::bus::Bus::is_irq_pending) for the pending check.

use serde::{Deserialize, Serialize};

/// A named interrupt source, mapped to its bit index in IE/IF.
///
/// Mirrors [`crate::bus::IrqType`] but lives on the controller itself so
/// components other than the bus (DMA, Timers, the PPU) can raise an
/// interrupt without reaching back through `Bus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqSource {
    VBlank,
    HBlank,
    VCount,
    /// Timer 0-3, `index` in 0..=3.
    Timer(u8),
    Serial,
    /// DMA 0-3, `index` in 0..=3.
    Dma(u8),
    Keypad,
    GamePak,
}

impl IrqSource {
    #[must_use]
    pub const fn bit_index(self) -> u8 {
        match self {
            Self::VBlank => 0,
            Self::HBlank => 1,
            Self::VCount => 2,
            Self::Timer(index) => 3 + index,
            Self::Serial => 7,
            Self::Dma(index) => 8 + index,
            Self::Keypad => 12,
            Self::GamePak => 13,
        }
    }
}

/// Interrupt control registers for the GBA.
///
/// These registers are memory-mapped at `0x0400_0200` and accessed through the
/// [`Bus`](crate::bus::Bus).
#[derive(Serialize, Deserialize, Default)]
pub struct InterruptControl {
    pub interrupt_enable: u16,
    /// Interrupt Request Flags (IF), bits are set when interrupts are requested,
    /// cleared by writing 1 to the corresponding bit
    pub interrupt_request: u16,
    pub wait_state_control: u16,
    pub interrupt_master_enable: u16,
    pub post_boot_flag: u8,
    pub power_down_control: u8,
    pub purpose_unknown: u8,
}

impl InterruptControl {
    /// Ors the bit for `source` into IF. Never clears bits — acknowledgement
    /// only happens via a write-one-to-clear write to the IF register.
    pub fn raise(&mut self, source: IrqSource) {
        self.interrupt_request |= 1 << source.bit_index();
    }

    /// `true` when at least one enabled interrupt is pending (IE & IF != 0),
    /// irrespective of IME. The CPU also checks IME and CPSR.I before
    /// actually dispatching; see [`Self::dispatchable`].
    #[must_use]
    pub const fn servable(&self) -> bool {
        (self.interrupt_enable & self.interrupt_request) != 0
    }

    /// `servable() && IME`. Does not account for CPSR.I, which the CPU
    /// checks itself since it owns the flag.
    #[must_use]
    pub const fn dispatchable(&self) -> bool {
        self.servable() && self.interrupt_master_enable != 0
    }

    /// Write-one-to-clear acknowledgement of the low byte of IF.
    pub const fn acknowledge_low(&mut self, value: u8) {
        self.interrupt_request &= !(value as u16);
    }

    /// Write-one-to-clear acknowledgement of the high byte of IF.
    pub const fn acknowledge_high(&mut self, value: u8) {
        self.interrupt_request &= !((value as u16) << 8);
    }
}
