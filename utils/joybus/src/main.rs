use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use joybus::trace::Recorder;
use joybus::{
    Behavior, ControllerModel, Engine, EngineConfig, MAX_COMMAND_LEN, Phase, Response, Timing,
    Wire, WireEnd,
};
use log::LevelFilter;
use std::fs::File;
use std::io::BufWriter;

#[derive(Parser)]
#[command(name = "joybus-sim")]
#[command(about = "Joybus host engine against a simulated GameCube controller")]
#[command(version)]
struct Args {
    /// Engine configuration (YAML)
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Command bytes to send each cycle, in hex
    #[arg(long, default_value = "400302", value_parser = parse_hex_bytes)]
    command: HexBytes,

    /// Bytes the simulated controller answers with, in hex
    #[arg(long, default_value = "0080808080800000", value_parser = parse_hex_bytes)]
    response: HexBytes,

    /// Controller clock deviation from the host, in percent
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    skew: i32,

    /// Controller reply delay in units
    #[arg(long, default_value_t = 2)]
    reply_delay: u32,

    /// Controller never answers
    #[arg(long)]
    silent: bool,

    /// Controller stops after this many response bits
    #[arg(long, conflicts_with = "silent")]
    stall_after: Option<usize>,

    /// Enable turnaround and edge timeouts
    #[arg(long)]
    hardened: bool,

    /// Number of poll cycles to run
    #[arg(long, default_value_t = 1)]
    cycles: usize,

    /// Tick budget per poll cycle
    #[arg(long, default_value_t = 100_000)]
    max_ticks: u64,

    /// Write a VCD waveform trace
    #[arg(long)]
    vcd: Option<Utf8PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Debug)]
struct HexBytes(Vec<u8>);

fn parse_hex_bytes(s: &str) -> Result<HexBytes, String> {
    let digits: String = s
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != ',')
        .collect();
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not hex", s));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", s));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()
        .map(HexBytes)
}

/// One poll cycle carries one whole command
fn check_command(command: &[u8]) -> Result<()> {
    if command.is_empty() {
        anyhow::bail!("--command needs at least one byte");
    }
    if command.len() > MAX_COMMAND_LEN {
        anyhow::bail!(
            "--command of {} bytes exceeds the {}-byte frame",
            command.len(),
            MAX_COMMAND_LEN
        );
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}

fn device_timing(host: Timing, skew: i32) -> Result<Timing> {
    let ticks = (host.ticks_per_unit() as i64 * (100 + skew as i64) + 50) / 100;
    let ticks = u32::try_from(ticks.max(1)).context("Controller clock out of range")?;
    Ok(Timing::new(ticks)?)
}

/// One host tick of engine and controller, captured into the trace
fn tick(
    engine: &mut Engine<WireEnd>,
    device: &mut ControllerModel,
    wire: &Wire,
    recorder: &mut Option<Recorder>,
) -> Option<joybus::Result<Response>> {
    let outcome = engine.step();
    device.step();
    if let Some(recorder) = recorder.as_mut() {
        recorder.record(engine.ticks(), wire.level(), engine.probe());
    }
    outcome
}

fn main() -> Result<()> {
    let args = Args::parse();
    check_command(&args.command.0)?;

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => EngineConfig::default(),
    };
    if args.hardened {
        let hardened = EngineConfig::hardened();
        config.turnaround_timeout_units = hardened.turnaround_timeout_units;
        config.edge_timeout_units = hardened.edge_timeout_units;
    }

    let wire = Wire::new();
    let mut engine =
        Engine::new(wire.attach(), config).context("Failed to create engine")?;

    let behavior = if args.silent {
        Behavior::Silent
    } else if let Some(bits) = args.stall_after {
        Behavior::Truncate { bits }
    } else {
        Behavior::Respond
    };
    let mut device = ControllerModel::new(
        wire.attach(),
        device_timing(engine.timing(), args.skew)?,
        &args.response.0,
    )
    .with_behavior(behavior)
    .with_reply_delay(args.reply_delay);

    let mut recorder = args.vcd.as_ref().map(|_| Recorder::new(10_000_000));

    println!(
        "Polling with {} ({} ticks per unit)",
        hex(&args.command.0),
        engine.timing().ticks_per_unit()
    );

    for cycle in 0..args.cycles {
        engine.queue_command(&args.command.0);

        let mut outcome = None;
        for _ in 0..args.max_ticks {
            outcome = tick(&mut engine, &mut device, &wire, &mut recorder);
            if outcome.is_some() {
                break;
            }
        }

        match outcome {
            Some(Ok(response)) => println!("cycle {}: {}", cycle, response),
            Some(Err(e)) => println!("cycle {}: {}", cycle, e),
            None => {
                println!(
                    "cycle {}: stalled in {:?} after {} ticks",
                    cycle,
                    engine.phase(),
                    args.max_ticks
                );
                engine.abort_cycle();
            }
        }

        // Let the controller finish its stop bit before the next command
        while device.is_busy() || engine.phase() != Phase::Accumulate {
            tick(&mut engine, &mut device, &wire, &mut recorder);
        }
    }

    println!("Output queue: {}", hex(&engine.drain_output()));

    if let (Some(path), Some(recorder)) = (&args.vcd, &recorder) {
        let tick_ns = 1_000 / engine.timing().ticks_per_unit() as u64;
        let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
        recorder
            .write_vcd(BufWriter::new(file), tick_ns)
            .context("Failed to write VCD trace")?;
        println!("Trace written to {}", path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_arguments() {
        assert_eq!(parse_hex_bytes("40 03 02").unwrap().0, vec![0x40, 0x03, 0x02]);
        assert_eq!(parse_hex_bytes("0x40_03").unwrap().0, vec![0x40, 0x03]);
        assert!(parse_hex_bytes("403").is_err());
        assert!(parse_hex_bytes("é1").is_err());
        assert!(parse_hex_bytes("4g").is_err());
    }

    #[test]
    fn command_must_fit_one_frame() {
        assert!(check_command(&[0x40, 0x03, 0x02]).is_ok());
        assert!(check_command(&[0; MAX_COMMAND_LEN]).is_ok());
        assert!(check_command(&[0; MAX_COMMAND_LEN + 1]).is_err());
        assert!(check_command(&[]).is_err());
    }

    #[test]
    fn skewed_device_timing() {
        let host = Timing::new(16).unwrap();
        assert_eq!(device_timing(host, 25).unwrap().ticks_per_unit(), 20);
        assert_eq!(device_timing(host, -25).unwrap().ticks_per_unit(), 12);
        assert_eq!(device_timing(host, -100).unwrap().ticks_per_unit(), 1);
    }
}
