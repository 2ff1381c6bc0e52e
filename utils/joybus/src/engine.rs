use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::config::{COMMAND_SENT, EngineConfig};
use crate::error::{Error, Result};
use crate::framer::{CommandFramer, MAX_COMMAND_LEN};
use crate::line::Line;
use crate::receiver::Receiver;
use crate::register::{RESPONSE_BYTES, Response};
use crate::timer::{Timing, UnitTimer};
use crate::transmitter::Transmitter;

/// Units the line must stay high before a command may be driven.
///
/// Covers the device stop bit (two units high on the device clock) with
/// room for a device clock running up to 25% slow.
pub const LINE_IDLE_UNITS: u32 = 4;

/// Sequencer phase. Exactly one is active at any tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accumulate,
    Transmit,
    Turnaround,
    Receive,
    Emit,
}

impl Phase {
    /// Numeric encoding used in waveform traces
    pub fn code(self) -> u8 {
        match self {
            Phase::Accumulate => 0,
            Phase::Transmit => 1,
            Phase::Turnaround => 2,
            Phase::Receive => 3,
            Phase::Emit => 4,
        }
    }
}

/// Snapshot of the engine's debug signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub phase: Phase,
    pub quarter: u8,
    pub driving: bool,
    pub line: bool,
    pub command_len: usize,
    pub tx_position: usize,
    pub rx_bits: usize,
}

/// Joybus host engine.
///
/// One call to [`Engine::step`] is one host tick. Within a step the work
/// happens in a fixed order:
/// 1. sense the line,
/// 2. advance the tick counter and quarter countdown,
/// 3. run the active phase,
/// 4. drive or release the line for the phase now active.
pub struct Engine<L: Line> {
    line: L,
    config: EngineConfig,
    timing: Timing,
    timer: UnitTimer,
    phase: Phase,
    inbound: VecDeque<u8>,
    outbound: VecDeque<u8>,
    framer: CommandFramer,
    transmitter: Transmitter,
    receiver: Receiver,
    turnaround_ticks: u64,
    // Consecutive ticks the line was sensed high
    idle_ticks: u64,
    emitted: usize,
    ticks: u64,
}

impl<L: Line> Engine<L> {
    pub fn new(mut line: L, config: EngineConfig) -> Result<Self> {
        let timing = config.timing()?;
        debug!(
            "joybus engine: {} ticks per unit, sentinel {}, {:?}",
            timing.ticks_per_unit(),
            config.sentinel,
            config.bit_order
        );

        line.set_drive(false, true);

        Ok(Self {
            line,
            timer: UnitTimer::new(timing),
            transmitter: Transmitter::new(config.early_stop_release),
            timing,
            config,
            phase: Phase::Accumulate,
            inbound: VecDeque::new(),
            outbound: VecDeque::new(),
            framer: CommandFramer::new(),
            receiver: Receiver::new(),
            turnaround_ticks: 0,
            idle_ticks: 0,
            emitted: 0,
            ticks: 0,
        })
    }

    /// Append command bytes to the input queue
    pub fn queue_command(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    pub fn drain_output(&mut self) -> Vec<u8> {
        self.outbound.drain(..).collect()
    }

    pub fn output(&self) -> &VecDeque<u8> {
        &self.outbound
    }

    pub fn pending_input(&self) -> usize {
        self.inbound.len()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn command_len(&self) -> usize {
        self.framer.len()
    }

    pub fn response_position(&self) -> usize {
        self.receiver.bits()
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn probe(&self) -> Probe {
        Probe {
            phase: self.phase,
            quarter: self.timer.quarter(),
            driving: self.phase == Phase::Transmit,
            line: self.line.sense(),
            command_len: self.framer.len(),
            tx_position: self.transmitter.position(),
            rx_bits: self.receiver.bits(),
        }
    }

    /// Advance one host tick.
    ///
    /// Returns `Some` when a poll cycle ends, with the response or the
    /// reason the cycle was abandoned.
    pub fn step(&mut self) -> Option<Result<Response>> {
        let level = self.line.sense();
        let finished = self.timer.tick();
        self.ticks += 1;
        self.idle_ticks = if level {
            self.idle_ticks.saturating_add(1)
        } else {
            0
        };

        let outcome = match self.phase {
            Phase::Accumulate => {
                // Never start over a device still holding or finishing its stop bit
                let idle = self.idle_ticks >= self.timing.units_to_ticks(LINE_IDLE_UNITS);
                if idle && self.framer.pull(&mut self.inbound) {
                    debug!("framed command {:02x?}", self.framer.command());
                    self.transmitter.load(self.framer.command());
                    self.timer.restart();
                    self.enter(Phase::Transmit);
                }
                None
            }
            Phase::Transmit => {
                if let Some(quarter) = finished
                    && self.transmitter.unit_finished(quarter)
                {
                    if self.config.sentinel {
                        self.outbound.push_back(COMMAND_SENT);
                    }
                    self.turnaround_ticks = 0;
                    self.enter(Phase::Turnaround);
                }
                None
            }
            Phase::Turnaround => {
                if !level {
                    self.receiver.begin();
                    self.enter(Phase::Receive);
                    None
                } else {
                    self.turnaround_ticks += 1;
                    match self.config.turnaround_timeout_units {
                        Some(units) if self.turnaround_ticks >= self.timing.units_to_ticks(units) => {
                            Some(Err(self.abandon(Error::Timeout {
                                waited_units: units,
                            })))
                        }
                        _ => None,
                    }
                }
            }
            Phase::Receive => {
                self.receiver.sample(level);
                if self.receiver.register().is_full() {
                    self.emitted = 0;
                    self.enter(Phase::Emit);
                    None
                } else {
                    match self.config.edge_timeout_units {
                        Some(units)
                            if self.receiver.ticks_since_edge() as u64
                                >= self.timing.units_to_ticks(units) =>
                        {
                            let bits = self.receiver.bits();
                            Some(Err(self.abandon(Error::IncompleteResponse { bits })))
                        }
                        _ => None,
                    }
                }
            }
            Phase::Emit => {
                let register = self.receiver.register();
                self.outbound
                    .push_back(register.byte(self.emitted, self.config.bit_order));
                self.emitted += 1;

                if self.emitted == RESPONSE_BYTES {
                    let response = register.to_response(self.config.bit_order);
                    info!("response {}", response);
                    self.finish_cycle();
                    Some(Ok(response))
                } else {
                    None
                }
            }
        };

        self.apply_drive();
        outcome
    }

    /// Run one full poll cycle for `command`, stepping at most `max_ticks`.
    ///
    /// The sentinel and response bytes are still appended to the output
    /// queue. When the tick budget runs out the engine is left where it
    /// stalled; see [`Engine::abort_cycle`].
    pub fn poll(&mut self, command: &[u8], max_ticks: u64) -> Result<Response> {
        if command.is_empty() {
            return Err(Error::EmptyCommand);
        }
        if command.len() > MAX_COMMAND_LEN {
            return Err(Error::Truncated { len: command.len() });
        }
        if self.phase != Phase::Accumulate || !self.inbound.is_empty() {
            return Err(Error::Busy { phase: self.phase });
        }

        self.queue_command(command);
        for _ in 0..max_ticks {
            if let Some(outcome) = self.step() {
                return outcome;
            }
        }

        Err(Error::StepLimit { ticks: max_ticks })
    }

    /// Drop the cycle in progress and release the line
    pub fn abort_cycle(&mut self) {
        if self.phase != Phase::Accumulate {
            warn!("aborting poll cycle in {:?}", self.phase);
        }
        self.finish_cycle();
        self.apply_drive();
    }

    fn abandon(&mut self, err: Error) -> Error {
        warn!("poll cycle abandoned: {}", err);
        self.finish_cycle();
        err
    }

    fn finish_cycle(&mut self) {
        self.framer.reset();
        self.receiver.reset();
        self.emitted = 0;
        self.turnaround_ticks = 0;
        self.enter(Phase::Accumulate);
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("{:?} -> {:?} at tick {}", self.phase, phase, self.ticks);
            self.phase = phase;
        }
    }

    fn apply_drive(&mut self) {
        if self.phase == Phase::Transmit {
            let value = self.transmitter.level(self.timer.quarter());
            self.line.set_drive(true, value);
        } else {
            self.line.set_drive(false, true);
        }
    }
}
