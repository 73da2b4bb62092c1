//! The four hardware timers.
//!
//! Each channel is a 16-bit up-counter. Non-cascade channels are driven by a
//! prescaled fraction of the bus clock; cascade channels (1-3 only) instead
//! increment once per overflow of the channel below them. Overflow reloads
//! the counter from `reload` (never from zero), optionally raises an IRQ,
//! and — for channels 0 and 1 — is the clock the APU drains its FIFOs on.
//!
//! # Registers
//!
//! `tmNcnt_l` is read-as-counter, write-as-reload on real hardware; this is
//! modeled here as two separate fields (`tmNcnt_l`, `tmN_reload`) so a
//! register write can stage the reload without disturbing a live counter.
//! `tmNcnt_h`: bits 0-1 prescaler select, bit 2 cascade, bit 6 irq enable,
//! bit 7 enable.

use serde::{Deserialize, Serialize};

/// Prescaler divisor for select values 0..=3: F/1, F/64, F/256, F/1024.
const PRESCALER_SHIFT: [u32; 4] = [0, 6, 8, 10];

/// Cycles subtracted from a freshly-enabled channel's accumulator, modeling
/// the couple of cycles of latency real hardware has before a just-started
/// timer ticks for the first time.
const STARTUP_DELAY: i32 = -2;

#[derive(Default, Clone, Copy)]
pub struct TimersStepResult {
    pub timer0_overflow: bool,
    pub timer1_overflow: bool,
    pub timer2_overflow: bool,
    pub timer3_overflow: bool,
    /// Raw overflow of timer 0/1, regardless of IRQ-enable — the clock the
    /// APU's FIFO A/B drain on, see [`crate::cpu::hardware::sound`].
    pub apu_timer0_overflow: bool,
    pub apu_timer1_overflow: bool,
}

#[derive(Default, Serialize, Deserialize)]
pub struct Timers {
    pub tm0cnt_l: u16,
    pub tm0cnt_h: u16,
    pub tm0_reload: u16,
    pub tm1cnt_l: u16,
    pub tm1cnt_h: u16,
    pub tm1_reload: u16,
    pub tm2cnt_l: u16,
    pub tm2cnt_h: u16,
    pub tm2_reload: u16,
    pub tm3cnt_l: u16,
    pub tm3cnt_h: u16,
    pub tm3_reload: u16,

    /// Sub-prescaler cycle debt per channel. Signed so the startup delay can
    /// go negative. Not serialized as part of the public register surface;
    /// it's internal bookkeeping, reset to 0 across a (de)serialize round
    /// trip, which only costs the rare in-flight fractional tick.
    #[serde(skip)]
    accumulator: [i32; 4],
    #[serde(skip)]
    was_enabled: [bool; 4],
}

impl Timers {
    const fn counter(&self, index: usize) -> u16 {
        match index {
            0 => self.tm0cnt_l,
            1 => self.tm1cnt_l,
            2 => self.tm2cnt_l,
            3 => self.tm3cnt_l,
            _ => unreachable!(),
        }
    }

    fn set_counter(&mut self, index: usize, value: u16) {
        match index {
            0 => self.tm0cnt_l = value,
            1 => self.tm1cnt_l = value,
            2 => self.tm2cnt_l = value,
            3 => self.tm3cnt_l = value,
            _ => unreachable!(),
        }
    }

    const fn reload(&self, index: usize) -> u16 {
        match index {
            0 => self.tm0_reload,
            1 => self.tm1_reload,
            2 => self.tm2_reload,
            3 => self.tm3_reload,
            _ => unreachable!(),
        }
    }

    const fn control(&self, index: usize) -> u16 {
        match index {
            0 => self.tm0cnt_h,
            1 => self.tm1cnt_h,
            2 => self.tm2cnt_h,
            3 => self.tm3cnt_h,
            _ => unreachable!(),
        }
    }

    fn set_control_raw(&mut self, index: usize, value: u16) {
        match index {
            0 => self.tm0cnt_h = value,
            1 => self.tm1cnt_h = value,
            2 => self.tm2cnt_h = value,
            3 => self.tm3cnt_h = value,
            _ => unreachable!(),
        }
    }

    fn prescaler_shift(&self, index: usize) -> u32 {
        PRESCALER_SHIFT[(self.control(index) & 0b11) as usize]
    }

    fn cascade(&self, index: usize) -> bool {
        self.control(index) & (1 << 2) != 0
    }

    fn irq_enable(&self, index: usize) -> bool {
        self.control(index) & (1 << 6) != 0
    }

    fn enabled(&self, index: usize) -> bool {
        self.control(index) & (1 << 7) != 0
    }

    pub fn set_reload(&mut self, index: usize, value: u16) {
        match index {
            0 => self.tm0_reload = value,
            1 => self.tm1_reload = value,
            2 => self.tm2_reload = value,
            3 => self.tm3_reload = value,
            _ => unreachable!(),
        }
    }

    /// Write the control register for `index`, latching the enable-edge
    /// startup quirk: a 0-to-1 transition loads the counter from `reload`
    /// and biases the accumulator so the first tick lands a couple of
    /// cycles late.
    pub fn set_control(&mut self, index: usize, value: u16) {
        let enabling_now = value & (1 << 7) != 0;
        self.set_control_raw(index, value);

        if enabling_now && !self.was_enabled[index] {
            self.set_counter(index, self.reload(index));
            self.accumulator[index] = STARTUP_DELAY;
        }
        self.was_enabled[index] = enabling_now;
    }

    /// Bumps channel `index`'s counter by one tick, reloading and reporting
    /// overflow when it wraps past `0xFFFF`.
    fn increment(&mut self, index: usize) -> bool {
        let (next, overflowed) = self.counter(index).overflowing_add(1);
        if overflowed {
            self.set_counter(index, self.reload(index));
            true
        } else {
            self.set_counter(index, next);
            false
        }
    }

    /// Advance every enabled, non-cascade channel by one bus cycle, cascading
    /// overflow into the next channel as it occurs. Called once per
    /// [`crate::bus::Bus::step`].
    pub fn step(&mut self) -> TimersStepResult {
        let mut result = TimersStepResult::default();

        for index in 0..4 {
            if !self.enabled(index) || self.cascade(index) {
                continue;
            }

            let shift = self.prescaler_shift(index);
            self.accumulator[index] += 1;

            while self.accumulator[index] >= (1 << shift) {
                self.accumulator[index] -= 1 << shift;
                if self.increment(index) {
                    self.report_overflow(index, &mut result);
                    self.cascade_into_next(index, &mut result);
                }
            }
        }

        result
    }

    /// Channel `index` just overflowed; walk cascade-enabled channels above
    /// it as long as each one itself overflows.
    fn cascade_into_next(&mut self, index: usize, result: &mut TimersStepResult) {
        let mut current = index;
        while current + 1 < 4 {
            let next = current + 1;
            if !self.enabled(next) || !self.cascade(next) {
                break;
            }
            if self.increment(next) {
                self.report_overflow(next, result);
                current = next;
            } else {
                break;
            }
        }
    }

    fn report_overflow(&self, index: usize, result: &mut TimersStepResult) {
        let irq = self.irq_enable(index);
        match index {
            0 => {
                result.timer0_overflow = irq;
                result.apu_timer0_overflow = true;
            }
            1 => {
                result.timer1_overflow = irq;
                result.apu_timer1_overflow = true;
            }
            2 => result.timer2_overflow = irq,
            3 => result.timer3_overflow = irq,
            _ => unreachable!(),
        }
    }

    /// Minimum cycles until the next IRQ-armed, non-cascade channel overflows.
    /// Used to fast-forward while the CPU is halted. Cascade channels are not
    /// represented since their period depends on the whole chain below them;
    /// a halted CPU still wakes correctly whenever its base channel (or any
    /// other scheduled event) fires.
    #[must_use]
    pub fn estimate_cycles_until_irq(&self) -> Option<u64> {
        (0..4)
            .filter(|&i| self.enabled(i) && self.irq_enable(i) && !self.cascade(i))
            .map(|i| {
                let shift = self.prescaler_shift(i);
                let remaining_counts = i64::from(0x10000 - i64::from(self.counter(i)));
                let cycles = (remaining_counts << shift) - i64::from(self.accumulator[i]);
                cycles.max(0) as u64
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabling_loads_counter_from_reload() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0xFFF0);
        timers.set_control(0, 0x80); // enable, prescaler /1

        assert_eq!(timers.tm0cnt_l, 0xFFF0);
    }

    #[test]
    fn startup_delay_postpones_first_increment() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0);
        timers.set_control(0, 0x80);

        timers.step();
        timers.step();
        assert_eq!(timers.tm0cnt_l, 0);

        timers.step();
        assert_eq!(timers.tm0cnt_l, 1);
    }

    #[test]
    fn overflow_reloads_and_raises_irq() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0xFFFE);
        timers.set_control(0, 0x80 | 0x40); // enable + irq, prescaler /1

        timers.step();
        timers.step();
        let result = timers.step();
        assert!(!result.timer0_overflow);
        assert_eq!(timers.tm0cnt_l, 0xFFFF);

        let result = timers.step();
        assert!(result.timer0_overflow);
        assert!(result.apu_timer0_overflow);
        assert_eq!(timers.tm0cnt_l, 0xFFFE);
    }

    #[test]
    fn cascade_increments_once_per_overflow() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0xFFFE);
        timers.set_control(0, 0x80);
        timers.set_reload(1, 0);
        timers.set_control(1, 0x80 | 0x40 | 0x04); // enable + irq + cascade

        for _ in 0..8 {
            timers.step();
        }

        assert_eq!(timers.tm1cnt_l, 4);
    }

    #[test]
    fn prescaler_divides_the_tick_rate() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0);
        timers.set_control(0, 0x80 | 0x01); // enable, prescaler /64

        for _ in 0..65 {
            timers.step();
        }
        assert_eq!(timers.tm0cnt_l, 0);
        timers.step();
        assert_eq!(timers.tm0cnt_l, 1);
    }

    #[test]
    fn disabled_channel_does_not_tick() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0);
        timers.set_control(0, 0); // not enabled
        for _ in 0..1000 {
            timers.step();
        }
        assert_eq!(timers.tm0cnt_l, 0);
    }
}
