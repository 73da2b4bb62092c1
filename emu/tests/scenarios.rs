//! Whole-system scenario tests driven entirely through the core's public
//! surface (`Gba` plus raw MMIO reads/writes through its bus), the same way
//! a frontend or a piece of homebrew would exercise it. Unit-level behavior
//! of individual peripherals lives in their own `#[cfg(test)] mod tests`.

use emu::cpu::psr::CpuState;
use emu::gba::Gba;
use pretty_assertions::assert_eq;

const BIOS_SIZE: usize = 0x0000_4000;

/// A ROM buffer big enough to hold a valid header, with the header checksum
/// pre-computed for an otherwise all-zero header (so `CartridgeHeader::new`
/// doesn't reject it). `id_string`, if given, is dropped in right after the
/// header so `BackupKind::detect_from_rom` can find it.
fn test_rom(size: usize, id_string: Option<&[u8]>) -> Vec<u8> {
    let mut rom = vec![0u8; size];
    // Header checksum over an all-zero 0xA0..0xBD range: 0u8 folded by
    // wrapping_sub is still 0, then wrapping_sub(0x19) = 0xE7.
    rom[0xBD] = 0xE7;
    if let Some(id) = id_string {
        let at = 0x0E4;
        rom[at..at + id.len()].copy_from_slice(id);
    }
    rom
}

fn test_gba(rom: &[u8]) -> Gba {
    Gba::new([0u8; BIOS_SIZE], rom).expect("test rom has a valid header")
}

#[test]
fn flash64_id_command_returns_manufacturer_and_device_id() {
    let rom = test_rom(0x1000, Some(b"FLASH_V"));
    let mut gba = test_gba(&rom);

    let write = |gba: &mut Gba, addr: usize, value: u8| gba.cpu.bus.write_byte(addr, value);
    let read = |gba: &mut Gba, addr: usize| gba.cpu.bus.read_byte(addr);

    // Enter ID mode: 5555h=AA, 2AAAh=55, 5555h=90.
    write(&mut gba, 0x0E00_5555, 0xAA);
    write(&mut gba, 0x0E00_2AAA, 0x55);
    write(&mut gba, 0x0E00_5555, 0x90);

    assert_eq!(read(&mut gba, 0x0E00_0000), 0xBF);
    assert_eq!(read(&mut gba, 0x0E00_0001), 0xD4);

    // Exit ID mode: 5555h=AA, 2AAAh=55, 5555h=F0.
    write(&mut gba, 0x0E00_5555, 0xAA);
    write(&mut gba, 0x0E00_2AAA, 0x55);
    write(&mut gba, 0x0E00_5555, 0xF0);

    // Back to normal reads: the backing store was never programmed, so it
    // still holds FLASH's erased-state fill value.
    assert_eq!(read(&mut gba, 0x0E00_0000), 0xFF);
}

#[test]
fn timer1_cascades_off_timer0_and_raises_its_irq() {
    let rom = test_rom(0x1000, None);
    let mut gba = test_gba(&rom);

    // TM0: reload 0xFFFE, enable + prescaler /1. With the startup-delay
    // quirk (-2 cycles before the first increment), this overflows on
    // exactly its 4th, 6th, 8th, 10th `Bus::step()` call.
    gba.cpu.bus.write_half_word(0x0400_0100, 0xFFFE);
    gba.cpu.bus.write_half_word(0x0400_0102, 0x0080);
    // TM1: reload 0xFFFC, enable + irq + cascade. Incrementing once per
    // Timer0 overflow, it wraps past 0xFFFF (a real overflow of its own,
    // not just a cascade-driven increment) on the 4th pulse.
    gba.cpu.bus.write_half_word(0x0400_0104, 0xFFFC);
    gba.cpu.bus.write_half_word(0x0400_0106, 0x00C4);

    // Global IRQ plumbing: enable Timer1's IE bit and IME, so the pending
    // flag we check is one the CPU would actually have dispatched on.
    gba.cpu.bus.write_half_word(0x0400_0200, 1 << 4);
    gba.cpu.bus.write_half_word(0x0400_0208, 1);

    // `Bus::step()` (and so `Timers::step()`) runs exactly once per
    // `gba.step()`, so the 4th Timer0 overflow lands precisely on the 10th
    // call; no imprecise over-stepping needed.
    for _ in 0..10 {
        gba.step();
    }

    assert_eq!(gba.cpu.bus.read_half_word(0x0400_0104), 0xFFFC);
    let interrupt_flags = gba.cpu.bus.read_half_word(0x0400_0202);
    assert_ne!(interrupt_flags & (1 << 4), 0, "Timer1 IRQ should be pending");
}

#[test]
fn save_bytes_round_trip_through_a_flash_backed_cartridge() {
    let rom = test_rom(0x1000, Some(b"FLASH_V"));
    let mut gba = test_gba(&rom);

    let mut pattern = vec![0u8; gba.get_save_bytes().len()];
    for (i, byte) in pattern.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }

    gba.load_save_bytes(&pattern);
    assert_eq!(gba.get_save_bytes(), pattern.as_slice());
}

#[test]
fn reset_twice_is_the_same_as_resetting_once() {
    let rom = test_rom(0x1000, Some(b"SRAM_V"));
    let mut gba = test_gba(&rom);

    let mut pattern = vec![0u8; gba.get_save_bytes().len()];
    for (i, byte) in pattern.iter_mut().enumerate() {
        *byte = ((i * 7) % 256) as u8;
    }
    gba.load_save_bytes(&pattern);

    gba.reset().expect("reset from a previously loaded rom must succeed");
    let once = gba.get_save_bytes().to_vec();

    gba.reset().expect("a second reset must succeed the same way");
    let twice = gba.get_save_bytes().to_vec();

    assert_eq!(once, twice, "backup contents must survive reset identically");
    assert_eq!(once, pattern, "reset must not erase the cartridge backup");
}

#[test]
fn vblank_eventually_fires_with_vcount_at_160() {
    let rom = test_rom(0x1000, None);
    let mut gba = test_gba(&rom);

    // Force-blank the screen (DISPCNT bit 7) so the PPU doesn't try to read
    // tile/map data this minimal test ROM never sets up.
    gba.cpu.bus.write_byte(0x0400_0000, 0x80);

    let mut entered_vblank = false;
    for _ in 0..2_000_000 {
        if gba.step() {
            entered_vblank = true;
            break;
        }
    }

    assert!(entered_vblank, "VBlank should fire within two million cycles");
    assert_eq!(gba.cpu.bus.read_half_word(0x0400_0006), 160);
    let dispstat = gba.cpu.bus.read_half_word(0x0400_0004);
    assert_ne!(dispstat & 0b01, 0, "DISPSTAT.vblank should be set");
    assert_eq!(dispstat & 0b10, 0, "DISPSTAT.hblank should be clear at the vblank boundary");
}

#[test]
fn division_swi_computes_quotient_and_remainder() {
    let rom = test_rom(0x1000, None);
    let mut gba = test_gba(&rom);

    // SWI #6 (Div), unconditional ARM encoding, placed in IWRAM.
    let pc = 0x0300_0000_usize;
    gba.cpu.bus.write_word(pc, 0xEF00_0006);
    gba.cpu.registers.set_program_counter(pc as u32);
    gba.cpu.registers.set_register_at(0, 100); // numerator
    gba.cpu.registers.set_register_at(1, 7); // denominator
    gba.cpu.flush_pipeline();

    // The 3-stage pipeline needs a fetch, a decode, and an execute step
    // before a freshly placed instruction's side effects land.
    for _ in 0..3 {
        gba.step();
    }

    assert_eq!(gba.cpu.registers.register_at(0), 14, "quotient");
    assert_eq!(gba.cpu.registers.register_at(1), 2, "remainder");
}

#[test]
fn dma_channel_repeats_on_each_hblank() {
    let rom = test_rom(0x1000, None);
    let mut gba = test_gba(&rom);
    // Force-blank so the PPU doesn't need tile/map data this test never sets up.
    gba.cpu.bus.write_byte(0x0400_0000, 0x80);

    let source = 0x0300_0000_usize; // IWRAM
    let dest = 0x0400_0010_usize; // BG0HOFS
    gba.cpu.bus.write_half_word(source, 0xBEEF);

    // DMA0: fixed source, fixed dest, one halfword, repeat on every HBlank.
    gba.cpu.bus.write_word(0x0400_00B0, source as u32);
    gba.cpu.bus.write_word(0x0400_00B4, dest as u32);
    gba.cpu.bus.write_half_word(0x0400_00B8, 1);
    let dest_fixed = 2 << 5;
    let source_fixed = 2 << 7;
    let start_on_hblank = 2 << 12;
    let repeat = 1 << 9;
    let enable = 1 << 15;
    let control = enable | repeat | start_on_hblank | dest_fixed | source_fixed;
    gba.cpu.bus.write_half_word(0x0400_00BA, control);

    let mut fires = 0;
    for _ in 0..50_000 {
        gba.step();
        if gba.cpu.bus.read_half_word(dest) == 0xBEEF {
            fires += 1;
            // Clear so the next HBlank pulse's rewrite is observable.
            gba.cpu.bus.write_half_word(dest, 0);
        }
        if fires >= 3 {
            break;
        }
    }
    assert!(fires >= 3, "DMA0 should re-arm and refire on each HBlank pulse");

    // Disable the channel; further HBlanks must leave the destination alone.
    gba.cpu.bus.write_half_word(0x0400_00BA, control & !enable);
    for _ in 0..5_000 {
        gba.step();
    }
    assert_eq!(
        gba.cpu.bus.read_half_word(dest),
        0,
        "disabling the channel should stop further HBlank-triggered transfers"
    );
}

#[test]
fn open_bus_read_reconstructs_from_pipeline_when_executing_iwram_thumb() {
    let rom = test_rom(0x1000, None);
    let mut gba = test_gba(&rom);

    // Two arbitrary Thumb halfwords, placed back to back in IWRAM.
    let pc = 0x0300_0000_usize;
    let op0 = 0x1C00_u16;
    let op1 = 0x1C09_u16;
    gba.cpu.bus.write_half_word(pc, op0);
    gba.cpu.bus.write_half_word(pc + 2, op1);
    gba.cpu.registers.set_program_counter(pc as u32);
    gba.cpu.cpsr.set_cpu_state(CpuState::Thumb);
    gba.cpu.flush_pipeline();

    // Exactly two fetches: the first pulls op0 into the pipeline, the second
    // pulls op1 in behind it. A third step would fetch past both and
    // overwrite the pipeline state this test is inspecting.
    for _ in 0..2 {
        gba.step();
    }

    // 0x0400_0800 is an unused I/O hole; with the CPU fetching Thumb code out
    // of IWRAM, the bus reconstructs a word from the last two fetched
    // halfwords in fetch order rather than duplicating the latest one.
    let value = gba.cpu.bus.read_word(0x0400_0800);
    assert_eq!(value, (u32::from(op1) << 16) | u32::from(op0));
}
