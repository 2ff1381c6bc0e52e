//! Joybus bit symbols and the duration-based decode rule
//!
//! Every symbol spans four units. Its waveform is stored as a 4-bit pattern
//! read from bit 3 (first unit on the wire) down to bit 0, 1 meaning the
//! line is high for that unit.

use serde::{Deserialize, Serialize};

use crate::timer::UNITS_PER_BIT;

/// low, low, low, high
pub const BIT_ZERO: u8 = 0b0001;
/// low, high, high, high
pub const BIT_ONE: u8 = 0b0111;
/// Host stop bit held for the whole bit period: low, low, high, high
pub const CONSOLE_STOP: u8 = 0b0011;
/// Host stop bit when released early: one unit low, then high until
/// [`STOP_RELEASE_HIGH_UNITS`] have passed.
pub const CONSOLE_STOP_EARLY: u8 = 0b0111;
/// Device stop bit: two units low, then high.
pub const DEVICE_STOP: u8 = 0b0011;

/// Completed high units after which the console stop bit may be cut short.
pub const STOP_RELEASE_HIGH_UNITS: u8 = 2;

/// Default packing of response bits: the first bit on the wire lands in
/// the most significant position of byte 0.
pub const RESPONSE_BIT_ORDER: BitOrder = BitOrder::MsbFirst;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Zero,
    One,
    Stop,
}

impl Symbol {
    pub fn from_bit(bit: bool) -> Self {
        if bit { Symbol::One } else { Symbol::Zero }
    }

    pub fn pattern(self) -> u8 {
        match self {
            Symbol::Zero => BIT_ZERO,
            Symbol::One => BIT_ONE,
            Symbol::Stop => CONSOLE_STOP,
        }
    }

    /// Line level during the given quarter (3 is the first unit)
    pub fn level(self, quarter: u8) -> bool {
        pattern_level(self.pattern(), quarter)
    }
}

pub fn pattern_level(pattern: u8, quarter: u8) -> bool {
    debug_assert!(quarter < UNITS_PER_BIT);
    (pattern >> quarter) & 1 == 1
}

/// A bit is one when the line stayed high longer than it stayed low.
///
/// Equal durations decode as zero.
pub fn decode_bit(duration_low: u32, duration_high: u32) -> bool {
    duration_high > duration_low
}

/// Bits of `bytes`, byte 0 first, each byte most significant bit first
pub fn bits_msb_first(bytes: &[u8]) -> impl Iterator<Item = bool> + '_ {
    bytes
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |i| (byte >> i) & 1 == 1))
}

/// Full symbol stream for a command: data bits followed by one stop bit
pub fn encode_command(bytes: &[u8]) -> Vec<Symbol> {
    bits_msb_first(bytes)
        .map(Symbol::from_bit)
        .chain(std::iter::once(Symbol::Stop))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

impl BitOrder {
    /// Pack eight bits, in collection order, into a byte
    pub fn pack(self, bits: &[bool]) -> u8 {
        debug_assert_eq!(bits.len(), 8);
        bits.iter().enumerate().fold(0u8, |byte, (i, &bit)| {
            if !bit {
                return byte;
            }
            match self {
                BitOrder::MsbFirst => byte | (0x80 >> i),
                BitOrder::LsbFirst => byte | (1 << i),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform(symbol: Symbol) -> Vec<bool> {
        (0..UNITS_PER_BIT).rev().map(|q| symbol.level(q)).collect()
    }

    #[test]
    fn symbol_waveforms() {
        assert_eq!(waveform(Symbol::Zero), [false, false, false, true]);
        assert_eq!(waveform(Symbol::One), [false, true, true, true]);
        assert_eq!(waveform(Symbol::Stop), [false, false, true, true]);
        let device_stop: Vec<_> = (0..4).rev().map(|q| pattern_level(DEVICE_STOP, q)).collect();
        assert_eq!(device_stop, [false, false, true, true]);
    }

    #[test]
    fn decode_compares_durations() {
        assert!(decode_bit(1, 3));
        assert!(!decode_bit(3, 1));
        assert!(!decode_bit(2, 2));
        assert!(!decode_bit(0, 0));
    }

    #[test]
    fn command_bits_msb_first() {
        let symbols = encode_command(&[0x40, 0x03]);
        assert_eq!(symbols.len(), 17);
        assert_eq!(symbols[0], Symbol::Zero);
        assert_eq!(symbols[1], Symbol::One);
        assert_eq!(symbols[14], Symbol::One);
        assert_eq!(symbols[15], Symbol::One);
        assert_eq!(symbols[16], Symbol::Stop);
    }

    #[test]
    fn pack_orders() {
        let bits = [true, false, false, false, false, false, true, true];
        assert_eq!(BitOrder::MsbFirst.pack(&bits), 0b1000_0011);
        assert_eq!(BitOrder::LsbFirst.pack(&bits), 0b1100_0001);
    }
}
