//! Response decoder using duration-based bit timing
//!
//! The device clock is free-running relative to ours, so no fixed sample
//! point exists. Each pulse is delimited by its own falling edges: the low
//! phase runs from a falling edge to the rising edge, the high phase from
//! there to the next falling edge, and the bit is whichever phase was
//! longer.

use log::trace;

use crate::codec::decode_bit;
use crate::register::ResponseRegister;

#[derive(Debug, Clone, Default)]
pub struct Receiver {
    // Ticks since the falling edge that opened the current pulse
    elapsed: u32,
    duration_low: Option<u32>,
    // Ticks since the most recent edge of either polarity
    since_edge: u32,
    register: ResponseRegister,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing at the falling edge of the first pulse
    pub fn begin(&mut self) {
        self.elapsed = 0;
        self.since_edge = 0;
        self.duration_low = None;
        self.register.clear();
    }

    /// Feed one tick's sensed level. Returns the bit decoded when a pulse
    /// closes on a falling edge.
    pub fn sample(&mut self, level: bool) -> Option<bool> {
        // A stalled response with timeouts off must not wrap
        self.elapsed = self.elapsed.saturating_add(1);
        self.since_edge = self.since_edge.saturating_add(1);

        match (self.duration_low, level) {
            (None, true) => {
                self.duration_low = Some(self.elapsed);
                self.since_edge = 0;
                None
            }
            (Some(duration_low), false) => {
                let duration_high = self.elapsed - duration_low;
                let bit = decode_bit(duration_low, duration_high);
                trace!(
                    "rx bit {} = {} (low {} high {})",
                    self.register.position(),
                    bit as u8,
                    duration_low,
                    duration_high
                );
                self.register.push(bit);
                self.elapsed = 0;
                self.since_edge = 0;
                self.duration_low = None;
                Some(bit)
            }
            _ => None,
        }
    }

    pub fn ticks_since_edge(&self) -> u32 {
        self.since_edge
    }

    pub fn bits(&self) -> usize {
        self.register.position()
    }

    pub fn register(&self) -> &ResponseRegister {
        &self.register
    }

    pub fn reset(&mut self) {
        self.begin();
    }
}
