//! # GBA System
//!
//! This module contains the [`Gba`] struct which represents the entire
//! Game Boy Advance system and ties together all components.
//!
//! ## System Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                        Game Boy Advance System                              │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                                                                             │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │                         ARM7TDMI CPU                                 │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐               │   │
//! │  │   │Registers│  │  CPSR   │  │Pipeline │  │  ALU    │               │   │
//! │  │   │ R0-R15  │  │  SPSR   │  │ 3-stage │  │Shifter  │               │   │
//! │  │   └─────────┘  └─────────┘  └─────────┘  └─────────┘               │   │
//! │  └────────────────────────────────┬────────────────────────────────────┘   │
//! │                                   │                                        │
//! │                                   ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │                           Memory Bus                                │   │
//! │  └───┬─────────┬─────────┬─────────┬─────────┬─────────┬─────────┬────┘   │
//! │      │         │         │         │         │         │         │        │
//! │      ▼         ▼         ▼         ▼         ▼         ▼         ▼        │
//! │  ┌───────┐ ┌───────┐ ┌───────┐ ┌───────┐ ┌───────┐ ┌───────┐ ┌───────┐   │
//! │  │ BIOS  │ │ EWRAM │ │ IWRAM │ │  I/O  │ │Palette│ │ VRAM  │ │  ROM  │   │
//! │  │ 16KB  │ │ 256KB │ │ 32KB  │ │  Regs │ │  1KB  │ │ 96KB  │ │ 32MB  │   │
//! │  │0x0000 │ │0x0200 │ │0x0300 │ │0x0400 │ │0x0500 │ │0x0600 │ │0x0800 │   │
//! │  └───────┘ └───────┘ └───────┘ └───────┘ └───────┘ └───────┘ └───────┘   │
//! │                          │                                                │
//! │                          ▼                                                │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │                      I/O Registers (0x04000000)                     │   │
//! │  │  ┌──────┐ ┌──────┐ ┌──────┐ ┌──────┐ ┌──────┐ ┌──────┐ ┌──────┐   │   │
//! │  │  │ LCD  │ │Sound │ │ DMA  │ │Timers│ │Serial│ │Keypad│ │  IRQ │   │   │
//! │  │  └──────┘ └──────┘ └──────┘ └──────┘ └──────┘ └──────┘ └──────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────────┘   │
//! │                                                                             │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Map
//!
//! | Address Range       | Size  | Description                    |
//! |---------------------|-------|--------------------------------|
//! | 0x00000000-0x00003FFF | 16KB  | BIOS (read-only, protected)    |
//! | 0x02000000-0x0203FFFF | 256KB | EWRAM (External Work RAM)      |
//! | 0x03000000-0x03007FFF | 32KB  | IWRAM (Internal Work RAM)      |
//! | 0x04000000-0x040003FF | 1KB   | I/O Registers                  |
//! | 0x05000000-0x050003FF | 1KB   | Palette RAM                    |
//! | 0x06000000-0x06017FFF | 96KB  | VRAM (Video RAM)               |
//! | 0x07000000-0x070003FF | 1KB   | OAM (Object Attribute Memory)  |
//! | 0x08000000-0x09FFFFFF | 32MB  | ROM (Game Pak)                 |

use std::sync::{Arc, Mutex};

use crate::{
    bus::Bus,
    cartridge_header::CartridgeHeader,
    cpu::{
        DISASM_BUFFER_CAPACITY, DisasmEntry, arm7tdmi::Arm7tdmi,
        hardware::{backup::BackupKind, internal_memory::InternalMemory},
    },
    device::{InputDevice, VideoDevice},
    error::{ConfigurationError, CoreError},
    render::gba_lcd::GbaLcd,
};

/// Exact size of a GBA BIOS image.
pub const BIOS_SIZE: usize = 0x0000_4000;

/// Upper bound of the cartridge ROM address space (the three 32 MiB-aliased
/// `0x08-0x0D` windows).
pub const MAX_ROM_SIZE: usize = 0x0200_0000;

/// The complete Game Boy Advance system.
pub struct Gba {
    pub cpu: Arm7tdmi,

    /// Parsed cartridge header with game metadata.
    pub cartridge_header: CartridgeHeader,

    pub lcd: Arc<Mutex<Box<GbaLcd>>>,

    /// Consumer for the lock-free disassembler channel.
    pub disasm_rx: Option<rtrb::Consumer<DisasmEntry>>,

    /// Kept around so [`Gba::reset`] can rebuild the CPU/bus from scratch
    /// without the caller having to hand the BIOS and ROM back in.
    bios: [u8; BIOS_SIZE],
    rom: Vec<u8>,
}

impl Gba {
    /// Create a new GBA system with the given BIOS and cartridge ROM.
    /// After creation, the CPU is ready to execute the BIOS boot sequence.
    ///
    /// Save type is auto-detected from the ROM's id string; use
    /// [`Gba::load_rom`] instead to override it.
    pub fn new(bios: [u8; BIOS_SIZE], cartridge: &[u8]) -> Result<Self, CoreError> {
        if cartridge.len() > MAX_ROM_SIZE {
            return Err(ConfigurationError::RomTooLarge(cartridge.len()).into());
        }

        let cartridge_header = CartridgeHeader::new(cartridge)?;

        let lcd = Arc::new(Mutex::new(Box::default()));
        let memory = InternalMemory::new(bios, cartridge);
        let bus = Bus::with_memory(memory);
        let mut arm = Arm7tdmi::new(bus);

        // avoid to block execution for disassembler
        let (tx, rx) = rtrb::RingBuffer::new(DISASM_BUFFER_CAPACITY);
        arm.disasm_tx = Some(tx);

        Ok(Self {
            cpu: arm,
            cartridge_header,
            lcd,
            disasm_rx: Some(rx),
            bios,
            rom: cartridge.to_vec(),
        })
    }

    /// Rebuild the CPU and bus from the currently loaded BIOS/ROM, as if the
    /// system had just been powered on. The backup chip's contents survive
    /// the reset (flipping the power switch doesn't erase the cartridge).
    pub fn reset(&mut self) -> Result<(), CoreError> {
        let backup_kind = self.cpu.bus.internal_memory.backup.kind();
        let save_bytes = self.cpu.bus.internal_memory.backup.get_save_bytes().to_vec();

        let cartridge_header = CartridgeHeader::new(&self.rom)?;
        let memory = InternalMemory::new(self.bios, &self.rom);
        let mut bus = Bus::with_memory(memory);
        bus.internal_memory.set_backup_kind(backup_kind);
        bus.internal_memory.backup.load_save_bytes(&save_bytes);

        let mut arm = Arm7tdmi::new(bus);
        let (tx, rx) = rtrb::RingBuffer::new(DISASM_BUFFER_CAPACITY);
        arm.disasm_tx = Some(tx);

        self.cpu = arm;
        self.cartridge_header = cartridge_header;
        self.disasm_rx = Some(rx);
        Ok(())
    }

    /// Replace the BIOS image and reset. `bytes` must be exactly
    /// [`BIOS_SIZE`] (16 KiB).
    pub fn load_bios(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        let bios: [u8; BIOS_SIZE] = bytes
            .try_into()
            .map_err(|_| ConfigurationError::WrongBiosSize(bytes.len()))?;
        self.bios = bios;
        self.reset()
    }

    /// Replace the cartridge ROM and reset, auto-detecting the backup chip
    /// from the ROM's id string unless `save_type_hint` overrides it.
    ///
    /// `force_rtc` enables the GPIO real-time-clock pins regardless of what
    /// auto-detection would otherwise assume; some carts with an RTC chip
    /// don't carry a recognizable id string for it.
    pub fn load_rom(
        &mut self,
        bytes: &[u8],
        save_type_hint: Option<BackupKind>,
        force_rtc: bool,
    ) -> Result<(), CoreError> {
        if bytes.len() > MAX_ROM_SIZE {
            return Err(ConfigurationError::RomTooLarge(bytes.len()).into());
        }

        let cartridge_header = CartridgeHeader::new(bytes)?;
        self.rom = bytes.to_vec();

        let memory = InternalMemory::new(self.bios, &self.rom);
        let mut bus = Bus::with_memory(memory);
        let kind = save_type_hint.unwrap_or_else(|| BackupKind::detect_from_rom(&self.rom));
        bus.internal_memory.set_backup_kind(kind);
        if force_rtc {
            bus.internal_memory.enable_gpio_rtc();
        }

        let mut arm = Arm7tdmi::new(bus);
        let (tx, rx) = rtrb::RingBuffer::new(DISASM_BUFFER_CAPACITY);
        arm.disasm_tx = Some(tx);

        self.cpu = arm;
        self.cartridge_header = cartridge_header;
        self.disasm_rx = Some(rx);
        Ok(())
    }

    /// Current backup chip's contents, ready to be written to a save file.
    #[must_use]
    pub fn get_save_bytes(&self) -> &[u8] {
        self.cpu.bus.internal_memory.backup.get_save_bytes()
    }

    /// Restore the backup chip's contents from a previously saved file.
    pub fn load_save_bytes(&mut self, data: &[u8]) {
        self.cpu.bus.internal_memory.backup.load_save_bytes(data);
    }

    /// Execute one CPU instruction cycle.
    /// Returns `true` if `VBlank` just started (a new frame is ready to display).
    /// Call this in a loop to run the emulator.
    /// For real-time emulation, you'd call this ~16.78 million times per second (GBA clock speed).
    pub fn step(&mut self) -> bool {
        self.cpu.step()
    }

    /// Run the system for approximately `cycles` CPU cycles, polling `input`
    /// once per instruction and handing `video` a finished frame each time
    /// `VBlank` is entered. Audio samples accumulate independently and are
    /// drained separately via [`Bus::take_audio_samples`].
    pub fn run_for(&mut self, cycles: u64, input: &mut dyn InputDevice, video: &mut dyn VideoDevice) {
        let target = self.cpu.current_cycle + u128::from(cycles);
        while self.cpu.current_cycle < target {
            self.cpu.bus.poll_input(input);
            if self.cpu.step() {
                video.draw(&self.cpu.bus.lcd.to_frame_buffer());
            }
        }
    }
}
