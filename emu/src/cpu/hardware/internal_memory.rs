//! Internal memory storage: BIOS, RAM, ROM, and Flash.
//!
//! This module implements the GBA's main memory regions that store code and data.
//! The [`InternalMemory`] struct holds the actual byte arrays for each region.
//!
//! # Memory Regions
//!
//! | Region       | Address Range           | Size   | Description                      |
//! |--------------|-------------------------|--------|----------------------------------|
//! | BIOS         | `0x0000_0000-0000_3FFF` | 16 KB  | System ROM (read-only)           |
//! | WRAM         | `0x0200_0000-0203_FFFF` | 256 KB | Work RAM (mirrored every 256KB)  |
//! | IWRAM        | `0x0300_0000-0300_7FFF` | 32 KB  | Internal Work RAM (fast, mirrored) |
//! | ROM          | `0x0800_0000-0DFF_FFFF` | 32 MB  | Game Pak ROM (3 wait states)     |
//! | SRAM/Flash/EEPROM | `0x0E00_0000-0E01_FFFF` (and WS2 for EEPROM) | up to 128 KB | Save data storage |
//!
//! # Address Mirroring
//!
//! RAM regions mirror throughout their address space:
//! - **WRAM**: Mirrors every 256KB (`0x0204_0000` = `0x0200_0000`)
//! - **IWRAM**: Mirrors every 32KB (`0x0300_8000` = `0x0300_0000`)
//!
//! # Cartridge Backup Storage
//!
//! SRAM, FLASH, and EEPROM command handling lives in [`backup`](super::backup); this
//! module only routes addresses to it and, for EEPROM, carves out its serial window
//! from the WS2 ROM mirror.
//!
//! # GPIO (RTC Support)
//!
//! The module also routes GPIO registers at ROM offset `0xC4-0xC9` (used by some
//! games, e.g. Pokemon, for Real-Time Clock communication) to [`backup::Gpio`](super::backup::Gpio):
//! - `0xC4`: Data register (pin state)
//! - `0xC6`: Direction register (1=output, 0=input)
//! - `0xC8`: Control register (GPIO enable)
//!
//! # Empty ROM Reads
//!
//! When reading past the end of the loaded ROM, the GBA returns the lower 16 bits
//! of the requested address (due to how the Game Pak bus works). This is emulated
//! in `read_rom`.

#![allow(clippy::unreadable_literal)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::backup::{Backup, BackupKind, Gpio};

use super::get_unmasked_address;

#[derive(Serialize, Deserialize)]
pub struct InternalMemory {
    /// From 0x00000000 to 0x00003FFF (16 `KBytes`).
    bios_system_rom: Vec<u8>,

    /// From 0x02000000 to 0x0203FFFF (256 `KBytes`).
    working_ram: Vec<u8>,

    /// From 0x03000000 to 0x03007FFF (32kb).
    working_iram: Vec<u8>,

    /// From 0x08000000 to 0x0FFFFFFF.
    /// Basically here you can find different kind of rom loaded.
    // 08000000-09FFFFFF Game Pak ROM/FlashROM (max 32MB) - Wait State 0
    // 0A000000-0BFFFFFF Game Pak ROM/FlashROM (max 32MB) - Wait State 1
    // 0C000000-0DFFFFFF Game Pak ROM/FlashROM (max 32MB) - Wait State 2
    // 0E000000-0E01FFFF Game Pak SRAM/Flash (max 128 KBytes) - 8bit Bus width
    pub rom: Vec<u8>,

    /// Cartridge backup storage: SRAM, FLASH or EEPROM, whichever the ROM's
    /// id string declared (see [`Backup::new`] / [`BackupKind::detect_from_rom`]).
    pub backup: Backup,

    /// RTC-style GPIO pins at ROM offset `0xC4-0xC9`.
    gpio: Gpio,

    /// From 0x00004000 to `0x01FF_FFFF`.
    /// From 0x10000000 to `0xFFFF_FFFF`.
    unused_region: HashMap<usize, u8>,
}

impl InternalMemory {
    #[must_use]
    pub fn new(bios: [u8; 0x0000_4000], rom: &[u8]) -> Self {
        Self {
            bios_system_rom: bios.to_vec(),
            working_ram: vec![0; 0x0004_0000],
            working_iram: vec![0; 0x0000_8000],
            rom: rom.to_vec(),
            backup: Backup::new(BackupKind::detect_from_rom(rom)),
            gpio: Gpio {
                control: 1, // GPIO enabled (allow reads) by default.
                ..Gpio::default()
            },
            unused_region: HashMap::new(),
        }
    }

    /// Override save-type auto-detection, e.g. when the frontend's
    /// configuration names a type the ROM's id string doesn't declare.
    pub fn set_backup_kind(&mut self, kind: BackupKind) {
        self.backup = Backup::new(kind);
    }

    /// Force the GPIO pins readable, for carts that carry a real-time-clock
    /// chip but whose id string doesn't give auto-detection anything to key
    /// off of.
    pub fn enable_gpio_rtc(&mut self) {
        self.gpio.control = 1;
    }
}

impl Default for InternalMemory {
    /// Creates an `InternalMemory` with properly-sized memory regions.
    ///
    /// This is primarily used for testing. For actual emulation, use
    /// [`InternalMemory::new`] with real BIOS and ROM data.
    fn default() -> Self {
        Self {
            bios_system_rom: vec![0; 0x0000_4000], // 16 KB BIOS
            working_ram: vec![0; 0x0004_0000],     // 256 KB EWRAM
            working_iram: vec![0; 0x0000_8000],    // 32 KB IWRAM
            rom: vec![0; 0x0200_0000],             // 32 MB ROM (max size)
            backup: Backup::new(BackupKind::Flash128),
            gpio: Gpio {
                control: 1,
                ..Gpio::default()
            },
            unused_region: HashMap::new(),
        }
    }
}

impl InternalMemory {
    /// Whether `ws2_offset` (an offset into the combined 32 MiB WS2 window,
    /// i.e. `address - 0x0C00_0000`) is the serial EEPROM's reserved slot:
    /// the last 256 bytes of the D half for ROMs over 16 MiB, or the whole
    /// D half for ROMs small enough that nothing else lives there.
    fn is_eeprom_offset(&self, ws2_offset: usize) -> bool {
        const D_HALF_START: usize = 0x0100_0000;
        if ws2_offset < D_HALF_START {
            return false;
        }
        self.rom.len() <= 0x0100_0000 || ws2_offset >= 0x01FF_FF00
    }

    fn read_rom(&self, address: usize) -> u8 {
        // GPIO port region (for RTC in Pokemon Fire Red/Leaf Green)
        // Located at ROM addresses 0xC4-0xC9 (16-bit aligned)
        // 0xC4/0xC5 = Data register (pin state)
        // 0xC6/0xC7 = Direction register
        // 0xC8/0xC9 = Control register
        if (0xC4..=0xC9).contains(&address) {
            return self.gpio.read_byte(address);
        }

        if address < self.rom.len() {
            self.rom[address]
        } else {
            // Preamble:
            // The GamePak ROM is an halfword addressable memory
            // and it uses a 16bits bus to transfer data and a
            // 24bits(32MB halfword addressed) bus to transfer the address to read.
            // So technically we can't just read 1 byte from the ROM, we
            // request the halfword and then we take the upper/lower 8bits
            // depending on the address least significant bit.
            //
            // https://rust-console.github.io/gbatek-gbaonly/#auxgbagamepakbus
            // In GamePak ROM, the 16bits data and the
            // lower 16bits of the address are transferred on the same bus (AD0-15),
            // the higher 8bits of the address (24bits in total, remember halfword addressing)
            // are transferred via A16-23.
            // When requesting an address which is "empty", the GamePak ROM doesn't overwrite the
            // value present in the AD0-15 bus, which then will still contain the lower 16bits of the address.
            // CPU will then use this as if it was the value read from the ROM.
            //
            // Here we get the 24bits address (halfword addressing) by shifting right by 1
            // and we take only the 16 lower bits. We use this as if it was the value read from the ROM
            // and we get the 0 or 1 byte depending on the LSB in the address.
            #[allow(clippy::cast_possible_truncation)]
            {
                (((address >> 1) & 0xFFFF) as u16).get_byte((address & 0b1) as u8)
            }
        }
    }
}

impl InternalMemory {
    #[must_use]
    pub fn read_at(&self, address: usize) -> u8 {
        match address {
            0x0000_0000..=0x0000_3FFF => self.bios_system_rom[address],
            0x0200_0000..=0x02FF_FFFF => {
                self.working_ram
                    [get_unmasked_address(address, 0x00FF_0000, 0xFF00_FFFF, 16, 4) - 0x0200_0000]
            }
            0x0300_0000..=0x03FF_FFFF => {
                let unmasked = get_unmasked_address(address, 0x00FF_F000, 0xFF00_0FFF, 12, 8);
                let idx = unmasked - 0x0300_0000;
                let value = self.working_iram[idx];

                // Debug: Log reads around the problematic address
                if (0x0300_36A0..=0x0300_36B0).contains(&unmasked) {
                    tracing::debug!(
                        "IWRAM READ: addr=0x{address:08X}, unmasked=0x{unmasked:08X}, idx=0x{idx:04X}, value=0x{value:02X}"
                    );
                }

                // Log reads from IRQ handler pointer area
                if unmasked >= 0x03007FFC {
                    tracing::debug!(
                        "!!! READ FROM IRQ HANDLER POINTER AREA !!!\n  \
                         Address: 0x{address:08X} (unmask to 0x{unmasked:08X}), Value: 0x{value:02X}"
                    );
                }

                value
            }
            0x0800_0000..=0x09FF_FFFF => self.read_rom(address - 0x0800_0000),
            0x0A00_0000..=0x0BFF_FFFF => self.read_rom(address - 0x0A00_0000),
            0x0C00_0000..=0x0DFF_FFFF => {
                let ws2_offset = address - 0x0C00_0000;
                if self.backup.kind().is_eeprom() && self.is_eeprom_offset(ws2_offset) {
                    // Serial protocol: the data bit rides bit 0 of the low
                    // byte of each halfword access; the high byte and any
                    // byte-granular read are open-bus-ish don't-care.
                    return if ws2_offset & 1 == 0 {
                        self.backup.read_eeprom_bit() as u8
                    } else {
                        0
                    };
                }
                self.read_rom(ws2_offset)
            }
            0x0E00_0000..=0x0E01_FFFF => self.backup.read_sram_byte(address - 0x0E00_0000),
            0x0000_4000..=0x01FF_FFFF
            | 0x0E02_0000..=0x0FFF_FFFF
            | 0x1000_0000..=0xFFFF_FFFF => {
                tracing::debug!("READ on unused memory 0x{address:08X}");
                self.unused_region.get(&address).map_or(0, |v| *v)
            }
            _ => {
                tracing::debug!("READ on out-of-range memory 0x{address:08X}");
                0
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    pub fn write_at(&mut self, address: usize, value: u8) {
        match address {
            0x0000_0000..=0x0000_3FFF => {
                // BIOS is read-only, ignore writes
                // (Some games may try to write here, but it should have no effect)
            }
            0x0200_0000..=0x0203_FFFF => self.working_ram[address - 0x0200_0000] = value,
            // Mirror
            0x0204_0000..=0x02FF_FFFF => {
                self.working_ram[get_unmasked_address(address, 0x00FF_0000, 0xFF00_FFFF, 16, 4)
                    - 0x0200_0000] = value;
            }
            0x0300_0000..=0x0300_7FFF => {
                // Log writes to IRQ handler pointer area (last 4 bytes of IWRAM)
                if address >= 0x03007FFC {
                    tracing::debug!(
                        "!!! WRITE TO IRQ HANDLER POINTER AREA !!!\n  \
                         Address: 0x{address:08X}, Value: 0x{value:02X}",
                    );
                }
                // Log writes to IRQ handler code area (for debugging)
                if (0x03003580..0x03003600).contains(&address) {
                    tracing::debug!(
                        "!!! WRITE TO IRQ HANDLER CODE AREA !!!\n  \
                         Address: 0x{address:08X}, Value: 0x{value:02X}",
                    );
                }
                // Debug: Log writes around the problematic address
                if (0x0300_36A0..=0x0300_36B0).contains(&address) {
                    let idx = address - 0x0300_0000;
                    tracing::debug!(
                        "IWRAM WRITE: addr=0x{address:08X}, idx=0x{idx:04X}, value=0x{value:02X}"
                    );
                }
                self.working_iram[address - 0x0300_0000] = value;
            }
            // Mirror
            0x0300_8000..=0x03FF_FFFF => {
                let unmasked = get_unmasked_address(address, 0x00FF_F000, 0xFF00_0FFF, 12, 8);
                // Log writes to IRQ handler pointer area (mirrors to last 4 bytes of IWRAM)
                if unmasked >= 0x03007FFC {
                    tracing::debug!(
                        "!!! WRITE TO IRQ HANDLER POINTER AREA (mirrored) !!!\n  \
                         Address: 0x{address:08X} (unmask to 0x{unmasked:08X}), Value: 0x{value:02X}",
                    );
                }
                self.working_iram[unmasked - 0x0300_0000] = value;
            }
            0x0800_0000..=0x0BFF_FFFF => {
                // ROM (WS0/WS1) is read-only; the GPIO pins share the same
                // offsets across all three ROM windows, so a write here
                // reaches them the same way a WS2 write does below.
                let rom_offset = address & 0x01FF_FFFF;
                if (0xC4..=0xC9).contains(&rom_offset) {
                    self.gpio.write_byte(rom_offset, value);
                }
            }
            0x0C00_0000..=0x0DFF_FFFF => {
                let ws2_offset = address - 0x0C00_0000;
                if self.backup.kind().is_eeprom() && self.is_eeprom_offset(ws2_offset) {
                    if ws2_offset & 1 == 0 {
                        self.backup.write_eeprom_bit(u16::from(value));
                    }
                    return;
                }
                let rom_offset = ws2_offset & 0x01FF_FFFF;
                if (0xC4..=0xC9).contains(&rom_offset) {
                    self.gpio.write_byte(rom_offset, value);
                }
            }
            0x0E00_0000..=0x0E01_FFFF => {
                self.backup.write_sram_byte(address - 0x0E00_0000, value);
            }
            0x0E02_0000..=0x0FFF_FFFF => {
                // Outside backup range, ignore
                tracing::debug!("Attempted write to unused GamePak region at {address:#010x}");
            }
            _ => {
                tracing::debug!("WRITE to unused memory 0x{address:08X} = 0x{value:02X}");
                self.unused_region.insert(address, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_work_ram() {
        let mut im = InternalMemory::default();

        let address = 0x03000005;
        im.write_at(address, 5);

        assert_eq!(im.working_iram[5], 5);
    }

    #[test]
    fn test_last_byte_work_ram() {
        let mut im = InternalMemory::default();

        let address = 0x03007FFF;
        im.write_at(address, 5);

        assert_eq!(im.working_iram[0x7FFF], 5);
    }

    #[test]
    fn test_read_work_ram() {
        let mut im = InternalMemory::default();
        im.working_iram[5] = 10;

        let address = 0x03000005;
        assert_eq!(im.read_at(address), 10);
    }

    #[test]
    fn test_bios_is_read_only() {
        let mut im = InternalMemory::default();
        // BIOS is read-only, writes should be ignored
        let original = im.read_at(0x000001EC);
        im.write_at(0x000001EC, 10);
        // Value should not have changed
        assert_eq!(im.read_at(0x000001EC), original);
    }

    #[test]
    fn test_read_rom() {
        let im = InternalMemory {
            rom: vec![1, 2, 3, 4],
            ..Default::default()
        };
        let address = 0x08000000;
        assert_eq!(im.read_at(address), 1);

        // Testing reading in empty rom
        let address = 0x09FF_FFFF;
        assert_eq!(im.read_at(address), 0xFF);

        let address = 0x09FF_FFEE;
        assert_eq!(im.read_at(address), 0xF7);

        let address = 0x09FF_FFEF;
        assert_eq!(im.read_at(address), 0xFF);
    }

    #[test]
    fn test_mirror_3ffffxx() {
        let mut im = InternalMemory::default();
        im.working_iram[0x7FF0] = 5;

        assert_eq!(im.read_at(0x3FFFFF0), 5);

        im.write_at(0x3FFFFA0, 10);

        assert_eq!(im.working_iram[0x7FA0], 10);
    }

    #[test]
    fn test_mirror_wram() {
        let mut im = InternalMemory::default();
        im.working_ram[0x010003] = 5;

        assert_eq!(im.read_at(0x02010003), 5);
        assert_eq!(im.read_at(0x02050003), 5);
        assert_eq!(im.read_at(0x02350003), 5);
        assert_eq!(im.read_at(0x02F50003), 5);

        im.write_at(0x02010003, 2);
        assert_eq!(im.working_ram[0x010003], 2);

        im.write_at(0x02050003, 1);
        assert_eq!(im.working_ram[0x010003], 1);

        im.write_at(0x02350010, 1);
        assert_eq!(im.working_ram[0x010010], 1);

        im.write_at(0x02F5003F, 1);
        assert_eq!(im.working_ram[0x01003F], 1);
    }

    #[test]
    fn test_mirror_iram() {
        let mut im = InternalMemory::default();
        im.working_iram[0x21FF] = 5;

        assert_eq!(im.read_at(0x030021FF), 5);
        assert_eq!(im.read_at(0x0300A1FF), 5);
        assert_eq!(im.read_at(0x030121FF), 5);
        assert_eq!(im.read_at(0x03FFA1FF), 5);

        im.write_at(0x030021FF, 2);
        assert_eq!(im.working_iram[0x21FF], 2);

        im.write_at(0x0300A1FF, 1);
        assert_eq!(im.working_iram[0x21FF], 1);

        im.write_at(0x030171FF, 10);
        assert_eq!(im.working_iram[0x71FF], 10);

        im.write_at(0x03FFF1FF, 1);
        assert_eq!(im.working_iram[0x71FF], 1);
    }

    #[test]
    fn sram_writes_and_reads_route_through_backup() {
        let mut im = InternalMemory::default();
        im.set_backup_kind(BackupKind::Sram);

        im.write_at(0x0E00_1234, 0x42);
        assert_eq!(im.read_at(0x0E00_1234), 0x42);
    }

    #[test]
    fn eeprom_window_lives_at_the_end_of_a_small_ws2_rom() {
        let mut im = InternalMemory {
            rom: vec![0; 0x1000],
            ..Default::default()
        };
        im.set_backup_kind(BackupKind::Eeprom512);

        // a small ROM means the entire D half of WS2 is the EEPROM window.
        assert!(im.is_eeprom_offset(0x0100_0000));
        assert!(!im.is_eeprom_offset(0x0000_0000));
    }

    #[test]
    fn gpio_registers_round_trip_through_every_rom_window() {
        let mut im = InternalMemory::default();

        im.write_at(0x0800_00C6, 0xFF); // direction: all pins output
        im.write_at(0x0800_00C4, 0x03); // data
        assert_eq!(im.read_at(0x0A00_00C4), 0x03);
        assert_eq!(im.read_at(0x0C00_00C4), 0x03);
    }
}
