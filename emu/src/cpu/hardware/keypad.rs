//! `KEYINPUT`/`KEYCNT`: the ten-button keypad and its IRQ condition.

use serde::{Deserialize, Serialize};

use crate::device::Key;

#[derive(Default, Serialize, Deserialize)]
pub struct Keypad {
    /// `KEYINPUT` (0x04000130): active-low, 1 = released.
    pub key_input: u16,
    /// `KEYCNT` (0x04000132): bits 0-9 select which buttons participate,
    /// bit 14 enables the IRQ, bit 15 selects AND (all selected keys down)
    /// over OR (any selected key down).
    pub key_interrupt_control: u16,
}

impl Keypad {
    /// Reads every key from `input` and latches it into `KEYINPUT`.
    pub fn poll(&mut self, input: &mut dyn crate::device::InputDevice) {
        let mut pressed = 0u16;
        for key in Key::ALL {
            if input.poll(key) {
                pressed |= 1 << key.bit();
            }
        }
        // KEYINPUT is active-low: a 0 bit means the button is held.
        self.key_input = !pressed & 0x03FF;
    }

    /// Whether the current `KEYINPUT` state satisfies `KEYCNT` and should
    /// raise the keypad interrupt.
    #[must_use]
    pub const fn irq_condition_met(&self) -> bool {
        if self.key_interrupt_control & (1 << 14) == 0 {
            return false;
        }

        let selected = self.key_interrupt_control & 0x03FF;
        let held = !self.key_input & 0x03FF & selected;

        if self.key_interrupt_control & (1 << 15) != 0 {
            // AND mode: every selected key must be held.
            held == selected
        } else {
            // OR mode: any selected key held.
            held != 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllPressed;
    impl crate::device::InputDevice for AllPressed {
        fn poll(&mut self, _key: Key) -> bool {
            true
        }
    }

    struct NonePressed;
    impl crate::device::InputDevice for NonePressed {
        fn poll(&mut self, _key: Key) -> bool {
            false
        }
    }

    #[test]
    fn released_keypad_reads_all_ones() {
        let mut keypad = Keypad::default();
        keypad.poll(&mut NonePressed);
        assert_eq!(keypad.key_input & 0x03FF, 0x03FF);
    }

    #[test]
    fn pressed_keys_clear_their_bit() {
        let mut keypad = Keypad::default();
        keypad.poll(&mut AllPressed);
        assert_eq!(keypad.key_input & 0x03FF, 0);
    }

    #[test]
    fn or_mode_fires_on_any_selected_key() {
        let mut keypad = Keypad::default();
        keypad.key_interrupt_control = (1 << 14) | (1 << 0); // enable, select A
        keypad.poll(&mut AllPressed);
        assert!(keypad.irq_condition_met());
    }

    #[test]
    fn and_mode_requires_every_selected_key() {
        let mut keypad = Keypad::default();
        keypad.key_interrupt_control = (1 << 15) | (1 << 14) | 0b11; // AND, enable, A+B
        keypad.poll(&mut NonePressed);
        assert!(!keypad.irq_condition_met());
        keypad.poll(&mut AllPressed);
        assert!(keypad.irq_condition_met());
    }

    #[test]
    fn disabled_irq_never_fires() {
        let mut keypad = Keypad::default();
        keypad.key_interrupt_control = 0b11;
        keypad.poll(&mut AllPressed);
        assert!(!keypad.irq_condition_met());
    }
}
