//! PSG synthesis, FIFO mixing, and stereo sample production.
//!
//! [`Sound`] only stores the raw MMIO register bytes; this module owns the
//! runtime state the registers can't express on their own (phase counters,
//! length counters, envelopes, the noise LFSR, the two FIFOs) and is driven
//! once per CPU cycle from [`Bus::step`](crate::bus::Bus::step). Samples are
//! produced at the rate `SOUNDBIAS` selects and pushed into a ring buffer the
//! frontend drains from its audio callback.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use vecfixed::VecFixed;

use crate::bitwise::Bits;

use super::sound::Sound;

const CPU_CLOCK_HZ: u32 = 16_777_216;

/// Capacity of the host-side mixed-sample ring buffer. Generous enough that
/// a frontend polling once per frame never has to block.
const SAMPLE_BUFFER_CAPACITY: usize = 4096;

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
struct Envelope {
    volume: u8,
    direction_up: bool,
    period: u8,
    timer: u8,
}

impl Envelope {
    fn reload(&mut self, initial_volume: u8, direction_up: bool, period: u8) {
        self.volume = initial_volume;
        self.direction_up = direction_up;
        self.period = period;
        self.timer = period;
    }

    /// Ticks at 64 Hz (the envelope sweep rate).
    fn tick(&mut self) {
        if self.period == 0 {
            return;
        }
        self.timer = self.timer.saturating_sub(1);
        if self.timer != 0 {
            return;
        }
        self.timer = self.period;
        if self.direction_up {
            self.volume = (self.volume + 1).min(15);
        } else {
            self.volume = self.volume.saturating_sub(1);
        }
    }
}

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
struct LengthCounter {
    enabled: bool,
    remaining: u16,
}

impl LengthCounter {
    fn reload(&mut self, enabled: bool, remaining: u16) {
        self.enabled = enabled;
        self.remaining = remaining;
    }

    /// Ticks at 256 Hz. Returns `false` once expired, silencing the channel.
    fn tick(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining > 0
    }
}

const SQUARE_DUTY: [[bool; 8]; 4] = [
    [false, false, false, false, false, false, false, true], // 12.5%
    [true, false, false, false, false, false, false, true],  // 25%
    [true, false, false, false, false, true, true, true],    // 50%
    [false, true, true, true, true, true, true, false],      // 75%
];

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
struct SquareChannel {
    enabled: bool,
    duty: u8,
    duty_step: u8,
    frequency: u16,
    cycle_accumulator: u32,
    envelope: Envelope,
    length: LengthCounter,
    // Sweep (channel 1 only).
    sweep_enabled: bool,
    sweep_period: u8,
    sweep_timer: u8,
    sweep_shift: u8,
    sweep_decrease: bool,
    sweep_shadow_frequency: u16,
}

impl SquareChannel {
    fn period_cycles(frequency: u16) -> u32 {
        16 * u32::from(2048 - frequency)
    }

    fn trigger(&mut self, has_sweep: bool) {
        self.enabled = true;
        self.cycle_accumulator = 0;
        self.duty_step = 0;
        if has_sweep {
            self.sweep_shadow_frequency = self.frequency;
            self.sweep_timer = if self.sweep_period == 0 { 8 } else { self.sweep_period };
            self.sweep_enabled = self.sweep_period != 0 || self.sweep_shift != 0;
            if self.sweep_shift != 0 && self.overflows(self.sweep_shadow_frequency) {
                self.enabled = false;
            }
        }
    }

    fn overflows(&self, shadow: u16) -> bool {
        let delta = shadow >> self.sweep_shift;
        let candidate = if self.sweep_decrease {
            shadow.saturating_sub(delta)
        } else {
            shadow + delta
        };
        candidate >= 2048
    }

    /// Ticks at 128 Hz.
    fn tick_sweep(&mut self) {
        if !self.sweep_enabled {
            return;
        }
        self.sweep_timer = self.sweep_timer.saturating_sub(1);
        if self.sweep_timer != 0 {
            return;
        }
        self.sweep_timer = if self.sweep_period == 0 { 8 } else { self.sweep_period };
        if self.sweep_period == 0 {
            return;
        }
        if self.overflows(self.sweep_shadow_frequency) {
            self.enabled = false;
            return;
        }
        let delta = self.sweep_shadow_frequency >> self.sweep_shift;
        self.sweep_shadow_frequency = if self.sweep_decrease {
            self.sweep_shadow_frequency.saturating_sub(delta)
        } else {
            self.sweep_shadow_frequency + delta
        };
        if self.sweep_shift != 0 {
            if self.overflows(self.sweep_shadow_frequency) {
                self.enabled = false;
            } else {
                self.frequency = self.sweep_shadow_frequency;
            }
        }
    }

    fn step(&mut self, cycles: u32) {
        if !self.enabled {
            return;
        }
        self.cycle_accumulator += cycles;
        let period = Self::period_cycles(self.frequency).max(1);
        while self.cycle_accumulator >= period {
            self.cycle_accumulator -= period;
            self.duty_step = (self.duty_step + 1) % 8;
        }
    }

    fn amplitude(&self) -> i16 {
        if !self.enabled {
            return 0;
        }
        let high = SQUARE_DUTY[usize::from(self.duty)][usize::from(self.duty_step)];
        if high {
            i16::from(self.envelope.volume)
        } else {
            0
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WaveChannel {
    enabled: bool,
    dac_enabled: bool,
    frequency: u16,
    cycle_accumulator: u32,
    sample_index: u8,
    volume_shift: u8,
    length: LengthCounter,
}

impl Default for WaveChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            frequency: 0,
            cycle_accumulator: 0,
            sample_index: 0,
            volume_shift: 0,
            length: LengthCounter::default(),
        }
    }
}

impl WaveChannel {
    fn period_cycles(frequency: u16) -> u32 {
        8 * u32::from(2048 - frequency)
    }

    fn trigger(&mut self) {
        self.enabled = self.dac_enabled;
        self.cycle_accumulator = 0;
        self.sample_index = 0;
    }

    fn step(&mut self, cycles: u32) {
        if !self.enabled {
            return;
        }
        self.cycle_accumulator += cycles;
        let period = Self::period_cycles(self.frequency).max(1);
        while self.cycle_accumulator >= period {
            self.cycle_accumulator -= period;
            self.sample_index = (self.sample_index + 1) % 32;
        }
    }

    fn amplitude(&self, wave_ram: &[u8; 16]) -> i16 {
        if !self.enabled || self.volume_shift == 0 {
            return 0;
        }
        let byte = wave_ram[usize::from(self.sample_index / 2)];
        let nibble = if self.sample_index % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        };
        i16::from(nibble >> (self.volume_shift - 1))
    }
}

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
struct NoiseChannel {
    enabled: bool,
    lfsr: u16,
    narrow: bool,
    cycle_accumulator: u32,
    divisor_code: u8,
    shift: u8,
    envelope: Envelope,
    length: LengthCounter,
}

impl NoiseChannel {
    const DIVISORS: [u32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

    fn period_cycles(&self) -> u32 {
        Self::DIVISORS[usize::from(self.divisor_code & 0b111)] << self.shift
    }

    fn trigger(&mut self) {
        self.enabled = true;
        self.lfsr = 0x7FFF;
        self.cycle_accumulator = 0;
    }

    fn step(&mut self, cycles: u32) {
        if !self.enabled {
            return;
        }
        self.cycle_accumulator += cycles;
        let period = self.period_cycles().max(1);
        while self.cycle_accumulator >= period {
            self.cycle_accumulator -= period;
            let bit = (self.lfsr & 1) ^ ((self.lfsr >> 1) & 1);
            self.lfsr = (self.lfsr >> 1) | (bit << 14);
            if self.narrow {
                self.lfsr &= !(1 << 6);
                self.lfsr |= bit << 6;
            }
        }
    }

    fn amplitude(&self) -> i16 {
        if !self.enabled {
            return 0;
        }
        if self.lfsr & 1 == 0 {
            i16::from(self.envelope.volume)
        } else {
            0
        }
    }
}

/// One of the two direct-sound (FIFO) DMA channels.
///
/// The queue itself is not part of save-state: it holds at most 32
/// in-flight audio bytes and is always refilled by DMA within a frame, so
/// skipping it keeps `Backup`-style persistence focused on state the guest
/// can actually observe.
#[derive(Default, Serialize, Deserialize)]
struct Fifo {
    #[serde(skip)]
    queue: VecFixed<32, i8>,
    current: i8,
}

impl Fifo {
    fn push(&mut self, byte: i8) {
        self.queue.push(byte);
    }

    fn pop_into_current(&mut self) {
        if let Some(sample) = self.queue.pop_front() {
            self.current = sample;
        }
    }

    fn needs_refill(&self) -> bool {
        self.queue.len() <= 16
    }

    fn reset(&mut self) {
        while self.queue.pop_front().is_some() {}
        self.current = 0;
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Apu {
    square1: SquareChannel,
    square2: SquareChannel,
    wave: WaveChannel,
    noise: NoiseChannel,
    fifo_a: Fifo,
    fifo_b: Fifo,

    sample_cycle_accumulator: u32,
    length_cycle_accumulator: u32,
    envelope_cycle_accumulator: u32,
    sweep_cycle_accumulator: u32,

    #[serde(skip)]
    samples: VecDeque<(i16, i16)>,
}

/// What a timer overflow should do to the APU: drain one byte from the
/// FIFO it clocks, and report whether that FIFO now needs a DMA refill.
pub struct FifoDrainResult {
    pub fifo_a_needs_refill: bool,
    pub fifo_b_needs_refill: bool,
}

impl Apu {
    /// Applies a register write's side effects that the raw byte storage in
    /// [`Sound`] can't express on its own: channel triggers, FIFO resets and
    /// pushes, and sweep/envelope/length reloads.
    pub fn notice_write(&mut self, address: usize, regs: &Sound, wave_ram: &[u8; 16]) {
        match address {
            // SOUND1CNT_H / SOUND1CNT_X
            0x0400_0062 | 0x0400_0063 => self.reload_square1_envelope(regs),
            0x0400_0064 | 0x0400_0065 => {
                self.square1.frequency = regs.channel1_frequency_control.get_bits(0..=10);
                self.square1
                    .length
                    .reload(regs.channel1_frequency_control.is_bit_on(14), 64 - self.square1_length(regs));
                if regs.channel1_frequency_control.is_bit_on(15) {
                    self.reload_square1_sweep(regs);
                    self.square1.trigger(true);
                }
            }
            0x0400_0060 | 0x0400_0061 => self.reload_square1_sweep(regs),
            0x0400_0068 | 0x0400_0069 => self.reload_square2_envelope(regs),
            0x0400_006C | 0x0400_006D => {
                self.square2.frequency = regs.channel2_frequency_control.get_bits(0..=10);
                self.square2
                    .length
                    .reload(regs.channel2_frequency_control.is_bit_on(14), 64 - self.square2_length(regs));
                if regs.channel2_frequency_control.is_bit_on(15) {
                    self.square2.trigger(false);
                }
            }
            0x0400_0070 | 0x0400_0071 => {
                self.wave.dac_enabled = regs.channel3_stop_wave_ram_select.is_bit_on(7);
            }
            0x0400_0072 | 0x0400_0073 => {
                self.wave
                    .length
                    .reload(true, 256 - regs.channel3_length_volume.get_bits(0..=7));
                self.wave.volume_shift = match regs.channel3_length_volume.get_bits(13..=14) {
                    0 => 0,
                    1 => 4,
                    2 => 3,
                    _ => 2,
                };
            }
            0x0400_0074 | 0x0400_0075 => {
                self.wave.frequency = regs.channel3_frequency_control.get_bits(0..=10);
                self.wave
                    .length
                    .enabled = regs.channel3_frequency_control.is_bit_on(14);
                if regs.channel3_frequency_control.is_bit_on(15) {
                    self.wave.trigger();
                }
            }
            0x0400_0078 | 0x0400_0079 => {
                self.noise.envelope.reload(
                    regs.channel4_length_envelope.get_bits(12..=15) as u8,
                    regs.channel4_length_envelope.is_bit_on(11),
                    regs.channel4_length_envelope.get_bits(8..=10) as u8,
                );
                self.noise
                    .length
                    .reload(self.noise.length.enabled, 64 - regs.channel4_length_envelope.get_bits(0..=5));
            }
            0x0400_007C | 0x0400_007D => {
                self.noise.divisor_code = regs.channel4_frequency_control.get_bits(0..=2) as u8;
                self.noise.narrow = regs.channel4_frequency_control.is_bit_on(3);
                self.noise.shift = regs.channel4_frequency_control.get_bits(4..=7) as u8;
                self.noise
                    .length
                    .enabled = regs.channel4_frequency_control.is_bit_on(14);
                if regs.channel4_frequency_control.is_bit_on(15) {
                    self.noise.trigger();
                }
            }
            0x0400_00A0..=0x0400_00A3 => {
                self.fifo_a.push(regs.channel_a_fifo.get_byte((address - 0x0400_00A0) as u8) as i8);
            }
            0x0400_00A4..=0x0400_00A7 => {
                self.fifo_b.push(regs.channel_b_fifo.get_byte((address - 0x0400_00A4) as u8) as i8);
            }
            0x0400_0082 | 0x0400_0083 => {
                if regs.control_mixing_dma_control.is_bit_on(7) {
                    self.fifo_a.reset();
                }
                if regs.control_mixing_dma_control.is_bit_on(15) {
                    self.fifo_b.reset();
                }
            }
            _ => {}
        }
        let _ = wave_ram;
    }

    fn square1_length(&self, regs: &Sound) -> u16 {
        regs.channel1_duty_length_envelope.get_bits(0..=5)
    }
    fn square2_length(&self, regs: &Sound) -> u16 {
        regs.channel2_duty_length_envelope.get_bits(0..=5)
    }

    fn reload_square1_envelope(&mut self, regs: &Sound) {
        self.square1.duty = regs.channel1_duty_length_envelope.get_bits(6..=7) as u8;
        self.square1.envelope.reload(
            regs.channel1_duty_length_envelope.get_bits(12..=15) as u8,
            regs.channel1_duty_length_envelope.is_bit_on(11),
            regs.channel1_duty_length_envelope.get_bits(8..=10) as u8,
        );
    }

    fn reload_square1_sweep(&mut self, regs: &Sound) {
        self.square1.sweep_shift = regs.channel1_sweep.get_bits(0..=2) as u8;
        self.square1.sweep_decrease = regs.channel1_sweep.is_bit_on(3);
        self.square1.sweep_period = regs.channel1_sweep.get_bits(4..=6) as u8;
    }

    fn reload_square2_envelope(&mut self, regs: &Sound) {
        self.square2.duty = regs.channel2_duty_length_envelope.get_bits(6..=7) as u8;
        self.square2.envelope.reload(
            regs.channel2_duty_length_envelope.get_bits(12..=15) as u8,
            regs.channel2_duty_length_envelope.is_bit_on(11),
            regs.channel2_duty_length_envelope.get_bits(8..=10) as u8,
        );
    }

    /// Drains one byte from whichever FIFO `timer_id` clocks (selected by
    /// `SOUNDCNT_H`'s timer-select bits), called from [`Timers::step`] on
    /// that timer's overflow.
    pub fn on_timer_overflow(&mut self, timer_id: u8, regs: &Sound) -> FifoDrainResult {
        let fifo_a_timer = u8::from(regs.control_mixing_dma_control.is_bit_on(10));
        let fifo_b_timer = u8::from(regs.control_mixing_dma_control.is_bit_on(14));

        if timer_id == fifo_a_timer {
            self.fifo_a.pop_into_current();
        }
        if timer_id == fifo_b_timer {
            self.fifo_b.pop_into_current();
        }

        FifoDrainResult {
            fifo_a_needs_refill: timer_id == fifo_a_timer && self.fifo_a.needs_refill(),
            fifo_b_needs_refill: timer_id == fifo_b_timer && self.fifo_b.needs_refill(),
        }
    }

    /// Advances PSG phase, the 256/128/64 Hz frame-sequencer ticks, and
    /// pushes a mixed stereo sample once `SOUNDBIAS`'s sample period has
    /// elapsed. Called once per CPU cycle from `Bus::step`.
    pub fn step(&mut self, cycles: u32, regs: &Sound, wave_ram: &[u8; 16]) {
        self.square1.step(cycles);
        self.square2.step(cycles);
        self.wave.step(cycles);
        self.noise.step(cycles);

        self.length_cycle_accumulator += cycles;
        while self.length_cycle_accumulator >= CPU_CLOCK_HZ / 256 {
            self.length_cycle_accumulator -= CPU_CLOCK_HZ / 256;
            if !self.square1.length.tick() {
                self.square1.enabled = false;
            }
            if !self.square2.length.tick() {
                self.square2.enabled = false;
            }
            if !self.wave.length.tick() {
                self.wave.enabled = false;
            }
            if !self.noise.length.tick() {
                self.noise.enabled = false;
            }
        }

        self.envelope_cycle_accumulator += cycles;
        while self.envelope_cycle_accumulator >= CPU_CLOCK_HZ / 64 {
            self.envelope_cycle_accumulator -= CPU_CLOCK_HZ / 64;
            self.square1.envelope.tick();
            self.square2.envelope.tick();
            self.noise.envelope.tick();
        }

        self.sweep_cycle_accumulator += cycles;
        while self.sweep_cycle_accumulator >= CPU_CLOCK_HZ / 128 {
            self.sweep_cycle_accumulator -= CPU_CLOCK_HZ / 128;
            self.square1.tick_sweep();
        }

        let sample_period = Self::sample_period_cycles(regs);
        self.sample_cycle_accumulator += cycles;
        while self.sample_cycle_accumulator >= sample_period {
            self.sample_cycle_accumulator -= sample_period;
            self.push_mixed_sample(regs, wave_ram);
        }
    }

    fn sample_period_cycles(regs: &Sound) -> u32 {
        let rate_hz: u32 = match regs.sound_pwm_control.get_bits(14..=15) {
            0 => 32768,
            1 => 65536,
            2 => 131072,
            _ => 262144,
        };
        (CPU_CLOCK_HZ / rate_hz).max(1)
    }

    fn push_mixed_sample(&mut self, regs: &Sound, wave_ram: &[u8; 16]) {
        let psg_shift = match regs.control_mixing_dma_control.get_bits(0..=1) {
            0 => 2,
            1 => 1,
            _ => 0,
        };
        let psg_mix = (self.square1.amplitude()
            + self.square2.amplitude()
            + self.wave.amplitude(wave_ram)
            + self.noise.amplitude())
            >> psg_shift;

        let fifo_a_volume = if regs.control_mixing_dma_control.is_bit_on(2) { 1 } else { 0 };
        let fifo_b_volume = if regs.control_mixing_dma_control.is_bit_on(3) { 1 } else { 0 };
        let fifo_a = i16::from(self.fifo_a.current) << (fifo_a_volume + 1);
        let fifo_b = i16::from(self.fifo_b.current) << (fifo_b_volume + 1);

        let left_vol = i16::from(regs.control_stereo_volume_enable.get_bits(4..=6)) + 1;
        let right_vol = i16::from(regs.control_stereo_volume_enable.get_bits(0..=2)) + 1;

        let mut left = psg_mix * left_vol;
        let mut right = psg_mix * right_vol;

        if regs.control_mixing_dma_control.is_bit_on(9) {
            left += fifo_a;
        }
        if regs.control_mixing_dma_control.is_bit_on(8) {
            right += fifo_a;
        }
        if regs.control_mixing_dma_control.is_bit_on(13) {
            left += fifo_b;
        }
        if regs.control_mixing_dma_control.is_bit_on(12) {
            right += fifo_b;
        }

        if self.samples.len() >= SAMPLE_BUFFER_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back((left * 32, right * 32));
    }

    /// Drains every sample produced since the last call.
    pub fn take_samples(&mut self) -> Vec<(i16, i16)> {
        self.samples.drain(..).collect()
    }
}
