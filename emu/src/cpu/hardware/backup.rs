//! Cartridge backup storage: SRAM, FLASH and EEPROM.
//!
//! Real GBA carts expose exactly one of these on the `0x0E000000-0x0FFFFFFF`
//! bus window (SRAM/FLASH) or serially inside the ROM's own address space
//! (EEPROM, which shares the WS2 mirror with the cartridge's own data and is
//! only reachable through the few addresses the linker places it at). A
//! deep class hierarchy with virtual `read`/`write` is the wrong shape here
//! — there is exactly one active backup per cartridge, decided once at load
//! time — so this is a tagged variant instead: [`Backup`] holds one
//! [`BackupKind`] and dispatches its two state machines ([`FlashState`],
//! [`EepromState`]) by matching on it.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// Which backup chip (if any) this cartridge carries, and its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    None,
    Sram,
    Flash64,
    Flash128,
    /// 512 B, 6-bit addressed ("4 Kbit" chip).
    Eeprom512,
    /// 8 KiB, 14-bit addressed ("64 Kbit" chip).
    Eeprom8k,
}

impl BackupKind {
    /// Scan the cartridge image for one of the id strings the linker embeds
    /// next to the save-type backup routines. First match wins; longer,
    /// more specific needles are checked before their prefixes so
    /// `FLASH512_V`/`FLASH1M_V` aren't shadowed by a bare `FLASH_V` scan.
    #[must_use]
    pub fn detect_from_rom(rom: &[u8]) -> Self {
        const NEEDLES: [(&[u8], BackupKind); 5] = [
            (b"EEPROM_V", BackupKind::Eeprom8k),
            (b"FLASH512_V", BackupKind::Flash64),
            (b"FLASH1M_V", BackupKind::Flash128),
            (b"FLASH_V", BackupKind::Flash64),
            (b"SRAM_V", BackupKind::Sram),
        ];

        for (needle, kind) in NEEDLES {
            if rom.windows(needle.len()).any(|w| w == needle) {
                return kind;
            }
        }
        BackupKind::None
    }

    /// Size in bytes of the persisted save blob for this kind, used both to
    /// allocate storage and to validate `load_save_bytes`.
    #[must_use]
    pub const fn save_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Sram | Self::Flash64 => 0x1_0000,
            Self::Flash128 => 0x2_0000,
            Self::Eeprom512 => 512,
            Self::Eeprom8k => 0x2000,
        }
    }

    #[must_use]
    pub const fn is_eeprom(self) -> bool {
        matches!(self, Self::Eeprom512 | Self::Eeprom8k)
    }

    #[must_use]
    pub const fn is_flash(self) -> bool {
        matches!(self, Self::Flash64 | Self::Flash128)
    }
}

/// FLASH's 3-phase unlock sequence: `5555h=AA -> 2AAAh=55 -> 5555h=cmd`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum FlashState {
    #[default]
    Ready,
    Unlock1,
    Unlock2,
    IdMode,
    EraseArmed,
    EraseUnlock1,
    EraseUnlock2,
    WriteNext,
    BankSelectNext,
}

/// EEPROM's serial bit-banged protocol, one bit per halfword access.
/// `address_bits` (6 or 14) is learned from the length of the first command
/// stream seen if the chip size wasn't configured up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum EepromState {
    AcceptCommand {
        bits: u8,
        prefix: u8,
    },
    GetAddress {
        is_write: bool,
        bits: u8,
        address: u16,
    },
    /// Write data stream: 64 bits clocked in MSB-first, then a stop bit.
    Writing {
        address: u16,
        bits: u8,
        buffer: u64,
    },
    /// Read dummy bit before the 64-bit data stream.
    EatDummy {
        address: u16,
    },
    Reading {
        bits: u8,
        buffer: u64,
    },
}

impl Default for EepromState {
    fn default() -> Self {
        Self::AcceptCommand { bits: 0, prefix: 0 }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Backup {
    kind: BackupKind,
    /// Flat backing store: 64 KiB for SRAM/FLASH64, 128 KiB for FLASH128
    /// (two banks concatenated), 512 B / 8 KiB for EEPROM.
    memory: Vec<u8>,

    flash_state: FlashState,
    flash_bank: usize,

    /// Cell, not a plain field: the serial read side is driven from the
    /// bus's byte-read path, which only has `&self` (a ROM-region read must
    /// stay side-effect-free everywhere except the one chip that is
    /// genuinely clocked by being read).
    eeprom_state: std::cell::Cell<EepromState>,
    /// 6 or 14; 0 means "not yet learned", resolved on first command.
    eeprom_address_bits: u8,
}

impl Default for Backup {
    fn default() -> Self {
        Self::new(BackupKind::None)
    }
}

impl Backup {
    #[must_use]
    pub fn new(kind: BackupKind) -> Self {
        Self {
            kind,
            memory: vec![0xFF; kind.save_size().max(1)],
            flash_state: FlashState::default(),
            flash_bank: 0,
            eeprom_state: std::cell::Cell::new(EepromState::default()),
            eeprom_address_bits: match kind {
                BackupKind::Eeprom512 => 6,
                BackupKind::Eeprom8k => 14,
                _ => 0,
            },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> BackupKind {
        self.kind
    }

    /// Replace the backing store with a persisted save, provided its size
    /// matches the expected size for `self.kind` (or for FLASH, either
    /// bank size — a 64 KiB save loaded onto a detected FLASH128 is kept at
    /// its declared size rather than silently padded).
    pub fn load_save_bytes(&mut self, data: &[u8]) {
        self.memory = data.to_vec();
        self.flash_state = FlashState::default();
        self.eeprom_state.set(EepromState::default());
    }

    #[must_use]
    pub fn get_save_bytes(&self) -> &[u8] {
        &self.memory
    }

    // ---- SRAM / FLASH: byte-addressed on 0x0E00_0000-0x0E01_FFFF ----

    #[must_use]
    pub fn read_sram_byte(&self, offset: usize) -> u8 {
        match self.kind {
            BackupKind::Sram => self.memory[offset & 0xFFFF],
            BackupKind::Flash64 | BackupKind::Flash128 => self.flash_read(offset),
            _ => 0xFF,
        }
    }

    pub fn write_sram_byte(&mut self, offset: usize, value: u8) {
        match self.kind {
            BackupKind::Sram => {
                let idx = offset & 0xFFFF;
                self.memory[idx] = value;
            }
            BackupKind::Flash64 | BackupKind::Flash128 => self.flash_write(offset, value),
            _ => {}
        }
    }

    fn flash_read(&self, offset: usize) -> u8 {
        let page_offset = offset & 0xFFFF;
        if self.flash_state == FlashState::IdMode {
            // Manufacturer/device id pairs: SST 64K = (0xBF, 0xD4);
            // Macronix 128K = (0xC2, 0x09).
            return match (self.kind, page_offset) {
                (BackupKind::Flash64, 0x0000) => 0xBF,
                (BackupKind::Flash64, 0x0001) => 0xD4,
                (BackupKind::Flash128, 0x0000) => 0xC2,
                (BackupKind::Flash128, 0x0001) => 0x09,
                _ => 0xFF,
            };
        }
        let real = self.flash_bank * 0x1_0000 + page_offset;
        self.memory.get(real).copied().unwrap_or(0xFF)
    }

    fn flash_write(&mut self, offset: usize, value: u8) {
        let page_offset = offset & 0xFFFF;
        match self.flash_state {
            FlashState::Ready | FlashState::IdMode => {
                if page_offset == 0x5555 && value == 0xAA {
                    self.flash_state = FlashState::Unlock1;
                } else if self.flash_state == FlashState::IdMode && value == 0xF0 {
                    self.flash_state = FlashState::Ready;
                }
            }
            FlashState::Unlock1 => {
                self.flash_state = if page_offset == 0x2AAA && value == 0x55 {
                    FlashState::Unlock2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::Unlock2 => {
                self.flash_state = FlashState::Ready;
                if page_offset == 0x5555 {
                    match value {
                        0x90 => self.flash_state = FlashState::IdMode,
                        0xF0 => {}
                        0x80 => self.flash_state = FlashState::EraseArmed,
                        0xA0 => self.flash_state = FlashState::WriteNext,
                        0xB0 if matches!(self.kind, BackupKind::Flash128) => {
                            self.flash_state = FlashState::BankSelectNext;
                        }
                        _ => {}
                    }
                }
            }
            FlashState::EraseArmed => {
                self.flash_state = if page_offset == 0x5555 && value == 0xAA {
                    FlashState::EraseUnlock1
                } else {
                    FlashState::Ready
                };
            }
            FlashState::EraseUnlock1 => {
                self.flash_state = if page_offset == 0x2AAA && value == 0x55 {
                    FlashState::EraseUnlock2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::EraseUnlock2 => {
                if value == 0x10 && page_offset == 0x5555 {
                    self.memory.fill(0xFF);
                } else if value == 0x30 {
                    let sector_base = self.flash_bank * 0x1_0000 + (page_offset & 0xF000);
                    for b in &mut self.memory[sector_base..(sector_base + 0x1000).min(self.memory.len())]
                    {
                        *b = 0xFF;
                    }
                }
                self.flash_state = FlashState::Ready;
            }
            FlashState::WriteNext => {
                let real = self.flash_bank * 0x1_0000 + page_offset;
                if let Some(byte) = self.memory.get_mut(real) {
                    // FLASH programming can only clear bits, never set them.
                    *byte &= value;
                }
                self.flash_state = FlashState::Ready;
            }
            FlashState::BankSelectNext => {
                if page_offset == 0x0000 {
                    self.flash_bank = usize::from(value & 0x01);
                }
                self.flash_state = FlashState::Ready;
            }
        }
    }

    // ---- EEPROM: one serial bit per halfword access ----

    /// Read the next serial bit, as it appears in bit 0 of the accessed
    /// halfword (the rest of the word is don't-care on real hardware; callers
    /// map this into the halfword the way they map any other open-bus read).
    pub fn read_eeprom_bit(&self) -> u16 {
        match self.eeprom_state.get() {
            EepromState::Reading { bits, buffer } => {
                let total_bits = 64;
                let bit = if bits < total_bits {
                    ((buffer >> (total_bits - 1 - u32::from(bits))) & 1) as u16
                } else {
                    1
                };
                let next_bits = bits + 1;
                self.eeprom_state.set(if next_bits >= total_bits {
                    EepromState::default()
                } else {
                    EepromState::Reading {
                        bits: next_bits,
                        buffer,
                    }
                });
                bit
            }
            _ => 1,
        }
    }

    /// Clock in one serial bit (bit 0 of the written halfword).
    pub fn write_eeprom_bit(&mut self, value: u16) {
        let bit = value & 1;
        match self.eeprom_state.get() {
            EepromState::AcceptCommand { bits, prefix } => {
                let prefix = (prefix << 1) | bit as u8;
                let bits = bits + 1;
                self.eeprom_state.set(if bits == 2 {
                    EepromState::GetAddress {
                        is_write: prefix == 0b10,
                        bits: 0,
                        address: 0,
                    }
                } else {
                    EepromState::AcceptCommand { bits, prefix }
                });
            }
            EepromState::GetAddress {
                is_write,
                bits,
                address,
            } => {
                let width = self.address_width();
                let address = (address << 1) | bit;
                let bits = bits + 1;
                if bits >= width {
                    // Chip size auto-detection: remember the width we just
                    // observed if it wasn't configured ahead of time.
                    if self.eeprom_address_bits == 0 {
                        self.eeprom_address_bits = width;
                    }
                    self.eeprom_state.set(if is_write {
                        EepromState::Writing {
                            address,
                            bits: 0,
                            buffer: 0,
                        }
                    } else {
                        EepromState::EatDummy { address }
                    });
                } else {
                    self.eeprom_state.set(EepromState::GetAddress {
                        is_write,
                        bits,
                        address,
                    });
                }
            }
            EepromState::Writing {
                address,
                bits,
                buffer,
            } => {
                let buffer = (buffer << 1) | u64::from(bit);
                let bits = bits + 1;
                if bits >= 64 {
                    self.commit_write(address, buffer);
                    // Trailing stop bit is consumed without effect.
                    self.eeprom_state.set(EepromState::default());
                } else {
                    self.eeprom_state.set(EepromState::Writing {
                        address,
                        bits,
                        buffer,
                    });
                }
            }
            EepromState::EatDummy { address } => {
                // The single dummy bit before a read's data stream.
                let buffer = self.load_read(address);
                self.eeprom_state.set(EepromState::Reading { bits: 0, buffer });
            }
            EepromState::Reading { .. } => {
                // Writes during a read stream restart the command parser.
                self.eeprom_state.set(EepromState::AcceptCommand {
                    bits: 1,
                    prefix: bit as u8,
                });
            }
        }
    }

    const fn address_width(&self) -> u8 {
        if self.eeprom_address_bits == 0 {
            // Not yet learned: default to the larger (64 Kbit) chip, the
            // common case; corrected on the very first command if wrong.
            14
        } else {
            self.eeprom_address_bits
        }
    }

    fn commit_write(&mut self, address: u16, buffer: u64) {
        let base = usize::from(address) * 8;
        for i in 0..8 {
            let shift = 8 * (7 - i);
            let byte = ((buffer >> shift) & 0xFF) as u8;
            if let Some(slot) = self.memory.get_mut(base + i) {
                *slot = byte;
            }
        }
    }

    fn load_read(&self, address: u16) -> u64 {
        let base = usize::from(address) * 8;
        let mut buffer = 0u64;
        for i in 0..8 {
            let byte = self.memory.get(base + i).copied().unwrap_or(0xFF);
            buffer = (buffer << 8) | u64::from(byte);
        }
        buffer
    }
}

/// RTC-style GPIO pins exposed at ROM offset `0xC4-0xC9`, used by a handful
/// of cartridges (Pokemon R/S/E/FR/LG) to bit-bang a real-time clock over
/// the otherwise-unused high address lines. Tracked alongside backup state
/// because it lives on the same cartridge bus, but it is not a backup
/// medium itself — `data`/`direction`/`control` are plain latched pins.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Gpio {
    pub data: u16,
    pub direction: u16,
    pub control: u16,
}

impl Gpio {
    #[must_use]
    pub fn read_byte(&self, offset: usize) -> u8 {
        match offset {
            0xC4 => self.data.get_byte(0),
            0xC5 => self.data.get_byte(1),
            0xC6 => self.direction.get_byte(0),
            0xC7 => self.direction.get_byte(1),
            0xC8 => self.control.get_byte(0),
            0xC9 => self.control.get_byte(1),
            _ => 0,
        }
    }

    pub fn write_byte(&mut self, offset: usize, value: u8) {
        match offset {
            0xC4 => self.data.set_byte(0, value),
            0xC5 => self.data.set_byte(1, value),
            0xC6 => self.direction.set_byte(0, value),
            0xC7 => self.direction.set_byte(1, value),
            0xC8 => self.control.set_byte(0, value),
            0xC9 => self.control.set_byte(1, value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_eeprom_flash_and_sram_ids() {
        assert_eq!(BackupKind::detect_from_rom(b"xxEEPROM_Vyyy"), BackupKind::Eeprom8k);
        assert_eq!(BackupKind::detect_from_rom(b"xxFLASH512_Vyy"), BackupKind::Flash64);
        assert_eq!(BackupKind::detect_from_rom(b"xxFLASH1M_Vyyy"), BackupKind::Flash128);
        assert_eq!(BackupKind::detect_from_rom(b"xxFLASH_Vyyyyy"), BackupKind::Flash64);
        assert_eq!(BackupKind::detect_from_rom(b"xxSRAM_Vyyyyyy"), BackupKind::Sram);
        assert_eq!(BackupKind::detect_from_rom(b"nothing here"), BackupKind::None);
    }

    #[test]
    fn flash_64k_unlock_sequence_enters_id_mode() {
        let mut backup = Backup::new(BackupKind::Flash64);
        backup.write_sram_byte(0x5555, 0xAA);
        backup.write_sram_byte(0x2AAA, 0x55);
        backup.write_sram_byte(0x5555, 0x90);
        assert_eq!(backup.read_sram_byte(0x0000), 0xBF);
        assert_eq!(backup.read_sram_byte(0x0001), 0xD4);

        backup.write_sram_byte(0x5555, 0xAA);
        backup.write_sram_byte(0x2AAA, 0x55);
        backup.write_sram_byte(0x5555, 0xF0);
        assert_eq!(backup.read_sram_byte(0x0000), 0xFF);
    }

    #[test]
    fn flash_write_can_only_clear_bits() {
        let mut backup = Backup::new(BackupKind::Flash64);
        // Program 0x0F into an erased (0xFF) byte.
        backup.write_sram_byte(0x5555, 0xAA);
        backup.write_sram_byte(0x2AAA, 0x55);
        backup.write_sram_byte(0x5555, 0xA0);
        backup.write_sram_byte(0x0010, 0x0F);
        assert_eq!(backup.read_sram_byte(0x0010), 0x0F);

        // Writing 0xF0 on top can only clear the bits still set (none left).
        backup.write_sram_byte(0x5555, 0xAA);
        backup.write_sram_byte(0x2AAA, 0x55);
        backup.write_sram_byte(0x5555, 0xA0);
        backup.write_sram_byte(0x0010, 0xF0);
        assert_eq!(backup.read_sram_byte(0x0010), 0x00);
    }

    #[test]
    fn flash_sector_erase_clears_only_target_sector() {
        let mut backup = Backup::new(BackupKind::Flash64);
        backup.write_sram_byte(0x5555, 0xAA);
        backup.write_sram_byte(0x2AAA, 0x55);
        backup.write_sram_byte(0x5555, 0xA0);
        backup.write_sram_byte(0x1000, 0x00);
        assert_eq!(backup.read_sram_byte(0x1000), 0x00);

        backup.write_sram_byte(0x5555, 0xAA);
        backup.write_sram_byte(0x2AAA, 0x55);
        backup.write_sram_byte(0x5555, 0x80);
        backup.write_sram_byte(0x5555, 0xAA);
        backup.write_sram_byte(0x2AAA, 0x55);
        backup.write_sram_byte(0x1000, 0x30); // erase the sector containing 0x1000
        assert_eq!(backup.read_sram_byte(0x1000), 0xFF);
    }

    #[test]
    fn eeprom_write_then_read_round_trips() {
        let mut backup = Backup::new(BackupKind::Eeprom8k);
        let address: u16 = 0x12;
        let data: u64 = 0x0123_4567_89AB_CDEF;

        // 2-bit write prefix, 14-bit address, 64 data bits, 1 stop bit.
        for bit in [1u16, 0] {
            backup.write_eeprom_bit(bit);
        }
        for i in (0..14).rev() {
            backup.write_eeprom_bit((address >> i) & 1);
        }
        for i in (0..64).rev() {
            backup.write_eeprom_bit(((data >> i) & 1) as u16);
        }
        backup.write_eeprom_bit(0); // stop bit

        // 2-bit read prefix, 14-bit address.
        for bit in [1u16, 1] {
            backup.write_eeprom_bit(bit);
        }
        for i in (0..14).rev() {
            backup.write_eeprom_bit((address >> i) & 1);
        }
        backup.write_eeprom_bit(0); // dummy bit before the data stream

        let mut read_back: u64 = 0;
        for _ in 0..64 {
            read_back = (read_back << 1) | u64::from(backup.read_eeprom_bit());
        }
        assert_eq!(read_back, data);
    }

    #[test]
    fn save_round_trip_preserves_bytes() {
        let mut backup = Backup::new(BackupKind::Sram);
        let mut expected = vec![0u8; BackupKind::Sram.save_size()];
        expected[10] = 0x42;
        backup.load_save_bytes(&expected);
        assert_eq!(backup.get_save_bytes(), expected.as_slice());
    }
}
