//! Simulated GameCube controller
//!
//! The model listens on its own end of a [`Wire`](crate::line::Wire),
//! decodes the host command by pulse duration, and answers with a
//! response waveform paced by its own unit timer. Giving it a different
//! `ticks_per_unit` than the host models an unsynchronized device clock.

use log::{debug, trace};

use crate::codec::{DEVICE_STOP, Symbol, bits_msb_first, decode_bit, pattern_level};
use crate::line::{Line, WireEnd};
use crate::timer::{Timing, UnitTimer};

/// High time, in device units, after which the host is considered done
const COMMAND_IDLE_UNITS: u32 = 5;

/// How the device answers a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Respond,
    /// Never pulls the line low
    Silent,
    /// Sends only the first `bits` bits, then the stop bit
    Truncate { bits: usize },
}

#[derive(Debug, Clone)]
enum State {
    Listen,
    Delay { ticks_left: u64 },
    Reply { patterns: Vec<u8>, position: usize },
}

pub struct ControllerModel {
    line: WireEnd,
    timing: Timing,
    timer: UnitTimer,
    reply: Vec<u8>,
    behavior: Behavior,
    reply_delay_units: u32,
    state: State,

    // Command decoder
    last_level: bool,
    elapsed: u32,
    duration_low: Option<u32>,
    bits: Vec<bool>,
    commands: Vec<Vec<bool>>,
}

impl ControllerModel {
    pub fn new(line: WireEnd, timing: Timing, reply: &[u8]) -> Self {
        Self {
            line,
            timing,
            timer: UnitTimer::new(timing),
            reply: reply.to_vec(),
            behavior: Behavior::Respond,
            reply_delay_units: 2,
            state: State::Listen,
            last_level: true,
            elapsed: 0,
            duration_low: None,
            bits: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_reply_delay(mut self, units: u32) -> Self {
        self.reply_delay_units = units;
        self
    }

    /// Commands received so far, as bit sequences without the stop bit
    pub fn commands(&self) -> &[Vec<bool>] {
        &self.commands
    }

    /// Received command `idx` packed MSB-first, if it is whole bytes
    pub fn command_bytes(&self, idx: usize) -> Option<Vec<u8>> {
        let bits = self.commands.get(idx)?;
        if bits.len() % 8 != 0 {
            return None;
        }
        Some(
            bits.chunks(8)
                .map(|chunk| chunk.iter().fold(0u8, |byte, &bit| (byte << 1) | bit as u8))
                .collect(),
        )
    }

    /// Waiting to answer or answering
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, State::Listen)
    }

    /// Advance one host tick
    pub fn step(&mut self) {
        let level = self.line.sense();

        match &mut self.state {
            State::Listen => {
                if self.listen(level) {
                    let ticks_left = self.timing.units_to_ticks(self.reply_delay_units);
                    self.state = State::Delay { ticks_left };
                }
            }
            State::Delay { ticks_left } => {
                if *ticks_left > 0 {
                    *ticks_left -= 1;
                } else {
                    self.start_reply();
                }
            }
            State::Reply { patterns, position } => {
                if let Some(quarter) = self.timer.tick()
                    && quarter == 0
                {
                    *position += 1;
                }
                match patterns.get(*position) {
                    Some(&pattern) => {
                        let high = pattern_level(pattern, self.timer.quarter());
                        self.line.set_drive(!high, false);
                    }
                    None => {
                        trace!("device reply finished");
                        self.line.set_drive(false, true);
                        self.state = State::Listen;
                    }
                }
            }
        }

        self.last_level = level;
    }

    /// Decode host pulses. Returns `true` once a full command was heard.
    fn listen(&mut self, level: bool) -> bool {
        let falling = self.last_level && !level;
        let rising = !self.last_level && level;
        self.elapsed = self.elapsed.saturating_add(1);

        if falling {
            if let Some(duration_low) = self.duration_low.take() {
                let duration_high = self.elapsed - duration_low;
                self.bits.push(decode_bit(duration_low, duration_high));
            }
            self.elapsed = 0;
            return false;
        }

        if rising {
            self.duration_low = Some(self.elapsed);
            return false;
        }

        // A pulse that never closes is the stop bit
        let Some(duration_low) = self.duration_low else {
            return false;
        };
        let idle = self.elapsed - duration_low;
        if level && idle as u64 >= self.timing.units_to_ticks(COMMAND_IDLE_UNITS) {
            let bits = std::mem::take(&mut self.bits);
            debug!("device heard {}-bit command", bits.len());
            self.commands.push(bits);
            self.duration_low = None;
            return self.behavior != Behavior::Silent;
        }
        false
    }

    fn start_reply(&mut self) {
        let limit = match self.behavior {
            Behavior::Truncate { bits } => bits,
            _ => usize::MAX,
        };
        let patterns: Vec<u8> = bits_msb_first(&self.reply)
            .take(limit)
            .map(|bit| Symbol::from_bit(bit).pattern())
            .chain(std::iter::once(DEVICE_STOP))
            .collect();
        debug!("device replying with {} symbols", patterns.len());

        self.timer.restart();
        let high = pattern_level(patterns[0], self.timer.quarter());
        self.line.set_drive(!high, false);
        self.state = State::Reply {
            patterns,
            position: 0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Wire;

    /// Drive a command onto the wire one unit per `ticks` host ticks
    fn send(host: &mut WireEnd, device: &mut ControllerModel, bytes: &[u8], ticks: u32) {
        for symbol in crate::codec::encode_command(bytes) {
            for quarter in (0..4).rev() {
                host.set_drive(true, symbol.level(quarter));
                for _ in 0..ticks {
                    device.step();
                }
            }
        }
        host.set_drive(false, true);
    }

    #[test]
    fn hears_command_bytes() {
        let wire = Wire::new();
        let mut host = wire.attach();
        let mut device = ControllerModel::new(wire.attach(), Timing::new(3).unwrap(), &[0; 8])
            .with_behavior(Behavior::Silent);

        send(&mut host, &mut device, &[0x40, 0x03, 0x02], 3);
        for _ in 0..40 {
            device.step();
        }

        assert_eq!(device.commands().len(), 1);
        assert_eq!(device.command_bytes(0), Some(vec![0x40, 0x03, 0x02]));
        assert!(wire.level());
    }

    #[test]
    fn replies_after_delay() {
        let wire = Wire::new();
        let mut host = wire.attach();
        let mut device = ControllerModel::new(wire.attach(), Timing::default(), &[0xff; 8]);

        send(&mut host, &mut device, &[0x00], 1);
        let mut saw_low = false;
        for _ in 0..20 {
            device.step();
            saw_low |= !wire.level();
        }
        assert!(saw_low);
        assert!(device.is_busy());
    }
}
