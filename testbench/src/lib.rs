use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use joybus::trace::Recorder;
use joybus::{
    Behavior, ControllerModel, Engine, EngineConfig, Error, Phase, Response, Timing, Wire, WireEnd,
};
use log::{debug, warn};
use serde::Deserialize;

/// Ticks recorded per scenario trace
const TRACE_LIMIT: usize = 2_000_000;

/// Simulated controller settings of a scenario
#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSpec {
    /// Controller ticks per unit; the host's when absent
    pub ticks_per_unit: Option<u32>,
    pub reply: String,
    pub silent: bool,
    pub truncate_bits: Option<usize>,
    pub reply_delay_units: u32,
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self {
            ticks_per_unit: None,
            reply: "00 80 80 80 80 80 00 00".into(),
            silent: false,
            truncate_bits: None,
            reply_delay_units: 2,
        }
    }
}

impl DeviceSpec {
    pub fn behavior(&self) -> Behavior {
        if self.silent {
            Behavior::Silent
        } else if let Some(bits) = self.truncate_bits {
            Behavior::Truncate { bits }
        } else {
            Behavior::Respond
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Expectation {
    /// Full output queue in hex
    pub output: Option<String>,
    /// One entry per finished or stalled cycle: `response <hex>`,
    /// `timeout`, `incomplete <bits>` or `stall <phase>`
    pub outcomes: Vec<String>,
    /// Engine phase once the scenario ends
    pub phase: Option<String>,
    /// Commands the controller decoded, in hex
    pub heard: Option<Vec<String>>,
}

/// One end-to-end test case, loaded from YAML
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub device: DeviceSpec,
    /// Byte strings queued one after another, in hex
    #[serde(default)]
    pub commands: Vec<String>,
    /// Tick budget per queued command, and idle ticks when none are queued
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    /// Wait for the controller to go quiet between commands
    #[serde(default = "default_settle")]
    pub settle: bool,
    #[serde(default)]
    pub expect: Expectation,
}

fn default_max_ticks() -> u64 {
    100_000
}

fn default_settle() -> bool {
    true
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        serde_yaml::from_str(&text).context("Failed to parse scenario")
    }
}

/// How one poll cycle ended
#[derive(Debug)]
pub enum Outcome {
    Cycle(joybus::Result<Response>),
    /// Tick budget ran out with the engine stuck in this phase
    Stalled(Phase),
}

impl Outcome {
    /// Canonical text form, matching the scenario `outcomes` syntax
    pub fn describe(&self) -> String {
        match self {
            Outcome::Cycle(Ok(response)) => format!("response {}", response),
            Outcome::Cycle(Err(Error::Timeout { .. })) => "timeout".into(),
            Outcome::Cycle(Err(Error::IncompleteResponse { bits })) => {
                format!("incomplete {}", bits)
            }
            Outcome::Cycle(Err(e)) => format!("error {}", e),
            Outcome::Stalled(phase) => format!("stall {}", phase_name(*phase)),
        }
    }
}

pub fn phase_name(phase: Phase) -> String {
    format!("{:?}", phase).to_lowercase()
}

#[derive(Debug)]
pub struct BenchResult {
    pub outcomes: Vec<Outcome>,
    pub output: Vec<u8>,
    pub phase: Phase,
    pub heard: Vec<Vec<u8>>,
    pub ticks: u64,
}

/// Engine and simulated controller sharing one wire
pub struct Bench {
    pub engine: Engine<WireEnd>,
    pub device: ControllerModel,
    wire: Wire,
    recorder: Option<Recorder>,
    settle: bool,
}

impl Bench {
    pub fn new(config: EngineConfig, device: &DeviceSpec) -> Result<Self> {
        let wire = Wire::new();
        let engine = Engine::new(wire.attach(), config).context("Failed to create engine")?;
        let device_timing = match device.ticks_per_unit {
            Some(ticks) => Timing::new(ticks)?,
            None => engine.timing(),
        };
        let reply = parse_hex(&device.reply).context("Invalid device reply")?;
        let device = ControllerModel::new(wire.attach(), device_timing, &reply)
            .with_behavior(device.behavior())
            .with_reply_delay(device.reply_delay_units);

        Ok(Bench {
            engine,
            device,
            wire,
            recorder: None,
            settle: true,
        })
    }

    /// Queue each command as soon as the previous cycle ends, without
    /// waiting for the controller's stop bit
    pub fn without_settle(mut self) -> Self {
        self.settle = false;
        self
    }

    /// Record every following tick for a VCD dump
    pub fn enable_trace(&mut self) {
        self.recorder = Some(Recorder::new(TRACE_LIMIT));
    }

    pub fn tick(&mut self) -> Option<joybus::Result<Response>> {
        let outcome = self.engine.step();
        self.device.step();
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(self.engine.ticks(), self.wire.level(), self.engine.probe());
        }
        outcome
    }

    /// Queue `command` and step until the input queue is consumed and the
    /// engine is back in Accumulate. Stops early on a stall.
    pub fn run_command(&mut self, command: &[u8], max_ticks: u64) -> Vec<Outcome> {
        self.engine.queue_command(command);

        let mut outcomes = Vec::new();
        let mut budget = max_ticks;
        loop {
            if self.engine.pending_input() == 0 && self.engine.phase() == Phase::Accumulate {
                break;
            }
            if budget == 0 {
                warn!("no progress within {} ticks, stuck in {:?}", max_ticks, self.engine.phase());
                outcomes.push(Outcome::Stalled(self.engine.phase()));
                return outcomes;
            }
            budget -= 1;
            if let Some(outcome) = self.tick() {
                outcomes.push(Outcome::Cycle(outcome));
            }
        }

        // Let the controller finish its stop bit before the next command
        while self.settle && self.device.is_busy() && budget > 0 {
            budget -= 1;
            self.tick();
        }
        outcomes
    }

    pub fn run_idle(&mut self, ticks: u64) -> Vec<Outcome> {
        (0..ticks)
            .filter_map(|_| self.tick().map(Outcome::Cycle))
            .collect()
    }

    pub fn write_vcd(&self, path: &Path) -> Result<()> {
        let Some(recorder) = &self.recorder else {
            return Ok(());
        };
        let tick_ns = 1_000 / self.engine.timing().ticks_per_unit() as u64;
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        recorder
            .write_vcd(BufWriter::new(file), tick_ns)
            .context("Failed to write VCD trace")
    }

    fn heard(&self) -> Vec<Vec<u8>> {
        (0..self.device.commands().len())
            .filter_map(|idx| self.device.command_bytes(idx))
            .collect()
    }
}

/// Run a scenario, optionally dumping its waveform to `vcd_path`
pub fn run_scenario(scenario: &Scenario, vcd_path: Option<&Path>) -> Result<BenchResult> {
    let mut bench = Bench::new(scenario.engine.clone(), &scenario.device)?;
    if !scenario.settle {
        bench = bench.without_settle();
    }
    if vcd_path.is_some() {
        bench.enable_trace();
    }

    let mut outcomes = Vec::new();
    if scenario.commands.is_empty() {
        outcomes.extend(bench.run_idle(scenario.max_ticks));
    }
    for command in &scenario.commands {
        let bytes = parse_hex(command).with_context(|| format!("Invalid command '{}'", command))?;
        outcomes.extend(bench.run_command(&bytes, scenario.max_ticks));
        if matches!(outcomes.last(), Some(Outcome::Stalled(_))) {
            break;
        }
    }

    debug!("{} cycles in {} ticks", outcomes.len(), bench.engine.ticks());
    if let Some(path) = vcd_path {
        bench.write_vcd(path)?;
    }

    Ok(BenchResult {
        outcomes,
        output: bench.engine.drain_output(),
        phase: bench.engine.phase(),
        heard: bench.heard(),
        ticks: bench.engine.ticks(),
    })
}

/// Compare a bench run against the scenario's expectations
pub fn check_expectations(expect: &Expectation, result: &BenchResult) -> Result<()> {
    let mut mismatches = Vec::new();

    if let Some(output) = &expect.output {
        let expected = parse_hex(output).context("Invalid expected output")?;
        if expected != result.output {
            mismatches.push(format!(
                "output: expected [{}], got [{}]",
                format_hex(&expected),
                format_hex(&result.output)
            ));
        }
    }

    let actual: Vec<String> = result.outcomes.iter().map(Outcome::describe).collect();
    let expected: Vec<String> = expect.outcomes.iter().map(|o| normalize(o)).collect();
    if actual != expected {
        mismatches.push(format!(
            "outcomes: expected {:?}, got {:?}",
            expected, actual
        ));
    }

    if let Some(phase) = &expect.phase {
        if normalize(phase) != phase_name(result.phase) {
            mismatches.push(format!(
                "phase: expected {}, got {}",
                phase,
                phase_name(result.phase)
            ));
        }
    }

    if let Some(heard) = &expect.heard {
        let expected = heard
            .iter()
            .map(|command| parse_hex(command))
            .collect::<Result<Vec<_>>>()
            .context("Invalid expected command")?;
        if expected != result.heard {
            let show = |commands: &[Vec<u8>]| {
                commands
                    .iter()
                    .map(|c| format_hex(c))
                    .collect::<Vec<_>>()
                    .join(" | ")
            };
            mismatches.push(format!(
                "heard: expected {}, got {}",
                show(&expected),
                show(&result.heard)
            ));
        }
    }

    if !mismatches.is_empty() {
        anyhow::bail!(
            "Scenario mismatches after {} ticks:\n{}",
            result.ticks,
            mismatches.join("\n")
        );
    }

    Ok(())
}

/// Parse hex bytes, ignoring whitespace and an optional `0x` prefix
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if let Some(c) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        anyhow::bail!("'{}' is not a hex digit in '{}'", c, text);
    }
    if digits.len() % 2 != 0 {
        anyhow::bail!("odd number of hex digits in '{}'", text);
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("bad hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_spacing() {
        assert_eq!(parse_hex("40 03 02").unwrap(), vec![0x40, 0x03, 0x02]);
        assert_eq!(parse_hex("0x400302").unwrap(), vec![0x40, 0x03, 0x02]);
        assert!(parse_hex("").unwrap().is_empty());
        assert!(parse_hex("403").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("é1").is_err());
        assert!(parse_hex("4ü").is_err());
    }

    #[test]
    fn scenario_defaults() {
        let scenario: Scenario = serde_yaml::from_str("commands: [\"41\"]\n").unwrap();
        assert_eq!(scenario.max_ticks, 100_000);
        assert!(scenario.settle);
        assert_eq!(scenario.device.behavior(), Behavior::Respond);
        assert!(scenario.engine.sentinel);
        assert!(scenario.expect.outcomes.is_empty());
    }

    #[test]
    fn outcome_descriptions() {
        let ok = Outcome::Cycle(Ok(Response::from(0xffu64)));
        assert_eq!(ok.describe(), "response 00 00 00 00 00 00 00 ff");
        let timeout = Outcome::Cycle(Err(Error::Timeout { waited_units: 5 }));
        assert_eq!(timeout.describe(), "timeout");
        assert_eq!(Outcome::Stalled(Phase::Turnaround).describe(), "stall turnaround");
    }

    #[test]
    fn mismatch_is_reported() {
        let result = BenchResult {
            outcomes: vec![Outcome::Stalled(Phase::Turnaround)],
            output: vec![0x55],
            phase: Phase::Turnaround,
            heard: vec![vec![0x00]],
            ticks: 10,
        };
        let expect = Expectation {
            output: Some("55".into()),
            outcomes: vec!["stall turnaround".into()],
            phase: Some("Turnaround".into()),
            heard: Some(vec!["00".into()]),
        };
        check_expectations(&expect, &result).unwrap();

        let wrong = Expectation {
            output: Some("55 00".into()),
            ..expect
        };
        let err = check_expectations(&wrong, &result).unwrap_err();
        assert!(format!("{:#}", err).contains("output"));
    }
}
