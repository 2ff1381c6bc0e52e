use log::trace;

use crate::codec::{CONSOLE_STOP_EARLY, STOP_RELEASE_HIGH_UNITS, Symbol, encode_command, pattern_level};

/// Serializes a framed command into per-unit line levels.
#[derive(Debug, Clone)]
pub struct Transmitter {
    symbols: Vec<Symbol>,
    position: usize,
    // Completed high units within the current symbol
    high_units: u8,
    early_stop_release: bool,
}

impl Transmitter {
    pub fn new(early_stop_release: bool) -> Self {
        Self {
            symbols: Vec::new(),
            position: 0,
            high_units: 0,
            early_stop_release,
        }
    }

    pub fn load(&mut self, command: &[u8]) {
        self.symbols = encode_command(command);
        self.position = 0;
        self.high_units = 0;
    }

    pub fn symbol(&self) -> Option<Symbol> {
        self.symbols.get(self.position).copied()
    }

    /// Index of the symbol on the wire
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_done(&self) -> bool {
        self.position >= self.symbols.len()
    }

    /// Level to drive during `quarter` of the current symbol
    pub fn level(&self, quarter: u8) -> bool {
        self.symbol()
            .is_none_or(|symbol| pattern_level(self.pattern(symbol), quarter))
    }

    fn pattern(&self, symbol: Symbol) -> u8 {
        match symbol {
            Symbol::Stop if self.early_stop_release => CONSOLE_STOP_EARLY,
            _ => symbol.pattern(),
        }
    }

    /// Account for a finished unit. Returns `true` once the stop bit is out.
    pub fn unit_finished(&mut self, quarter: u8) -> bool {
        let Some(symbol) = self.symbol() else {
            return true;
        };

        if pattern_level(self.pattern(symbol), quarter) {
            self.high_units += 1;
        } else {
            self.high_units = 0;
        }

        let cut_short = symbol == Symbol::Stop
            && self.early_stop_release
            && self.high_units >= STOP_RELEASE_HIGH_UNITS;
        if quarter == 0 || cut_short {
            trace!("tx symbol {} {:?} sent", self.position, symbol);
            self.position += 1;
            self.high_units = 0;
        }

        self.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{Timing, UnitTimer};

    /// Drive the transmitter from a fresh unit timer and record one level
    /// per unit.
    fn run(command: &[u8], early: bool) -> Vec<bool> {
        let mut tx = Transmitter::new(early);
        let mut timer = UnitTimer::new(Timing::default());
        tx.load(command);
        timer.restart();

        let mut units = Vec::new();
        loop {
            units.push(tx.level(timer.quarter()));
            let finished = timer.tick().unwrap();
            if tx.unit_finished(finished) {
                return units;
            }
        }
    }

    #[test]
    fn zero_byte_with_early_stop() {
        let units = run(&[0x00], true);
        assert_eq!(units.len(), 8 * 4 + 3);
        assert_eq!(&units[..4], &[false, false, false, true]);
        assert_eq!(&units[32..], &[false, true, true]);
    }

    #[test]
    fn full_stop_bit() {
        let units = run(&[0xff], false);
        assert_eq!(units.len(), 9 * 4);
        assert_eq!(&units[..4], &[false, true, true, true]);
        // differs from a one bit in its second unit
        assert_eq!(&units[32..], &[false, false, true, true]);
    }

    #[test]
    fn symbols_follow_command() {
        let mut tx = Transmitter::new(true);
        tx.load(&[0x80]);
        assert_eq!(tx.symbol(), Some(Symbol::One));
        assert!(!tx.is_done());
        for _ in 0..4 {
            tx.unit_finished(3);
        }
        // quarter 3 never ends a symbol by itself
        assert_eq!(tx.position(), 0);
        for q in (0..4).rev() {
            tx.unit_finished(q);
        }
        assert_eq!(tx.position(), 1);
        assert_eq!(tx.symbol(), Some(Symbol::Zero));
    }
}
