//! Per-tick waveform capture and VCD export

use std::io::{self, Write};

use crate::engine::Probe;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub tick: u64,
    pub wire: bool,
    pub probe: Probe,
}

/// Bounded per-tick recording of the wire and the engine's probe
#[derive(Debug, Clone)]
pub struct Recorder {
    samples: Vec<Sample>,
    limit: usize,
}

impl Recorder {
    pub fn new(limit: usize) -> Self {
        Self {
            samples: Vec::new(),
            limit,
        }
    }

    /// Store a sample; silently ignored once the limit is reached
    pub fn record(&mut self, tick: u64, wire: bool, probe: Probe) {
        if self.samples.len() < self.limit {
            self.samples.push(Sample { tick, wire, probe });
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Write the recording as a value change dump, one tick per `tick_ns`
    pub fn write_vcd<W: Write>(&self, mut out: W, tick_ns: u64) -> io::Result<()> {
        writeln!(out, "$timescale {}ns $end", tick_ns.max(1))?;
        writeln!(out, "$scope module joybus $end")?;
        writeln!(out, "$var wire 1 ! line $end")?;
        writeln!(out, "$var wire 1 \" drive $end")?;
        writeln!(out, "$var wire 3 # phase $end")?;
        writeln!(out, "$var wire 2 $ quarter $end")?;
        writeln!(out, "$var wire 7 % rx_bits $end")?;
        writeln!(out, "$upscope $end")?;
        writeln!(out, "$enddefinitions $end")?;

        let mut prev: Option<&Sample> = None;
        for sample in &self.samples {
            let mut changes = Vec::new();
            let probe = &sample.probe;
            let before = prev.map(|p| (p.wire, p.probe));

            if before.is_none_or(|(wire, _)| wire != sample.wire) {
                changes.push(format!("{}!", sample.wire as u8));
            }
            if before.is_none_or(|(_, p)| p.driving != probe.driving) {
                changes.push(format!("{}\"", probe.driving as u8));
            }
            if before.is_none_or(|(_, p)| p.phase != probe.phase) {
                changes.push(format!("b{:b} #", probe.phase.code()));
            }
            if before.is_none_or(|(_, p)| p.quarter != probe.quarter) {
                changes.push(format!("b{:b} $", probe.quarter));
            }
            if before.is_none_or(|(_, p)| p.rx_bits != probe.rx_bits) {
                changes.push(format!("b{:b} %", probe.rx_bits));
            }

            if !changes.is_empty() {
                writeln!(out, "#{}", sample.tick)?;
                for change in changes {
                    writeln!(out, "{}", change)?;
                }
            }
            prev = Some(sample);
        }
        Ok(())
    }
}

/// Split a sampled waveform into `(low, high)` pulse widths.
///
/// Sampling starts at the first falling edge. The final pulse is reported
/// even if no falling edge closes it.
pub fn pulse_widths(levels: &[bool]) -> Vec<(u32, u32)> {
    let Some(start) = levels.iter().position(|level| !level) else {
        return Vec::new();
    };

    let mut pulses = Vec::new();
    let (mut low, mut high) = (0u32, 0u32);
    for &level in &levels[start..] {
        match (level, high) {
            (false, 0) => low += 1,
            (false, _) => {
                pulses.push((low, high));
                low = 1;
                high = 0;
            }
            (true, _) => high += 1,
        }
    }
    pulses.push((low, high));
    pulses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Phase;

    fn probe(phase: Phase, quarter: u8) -> Probe {
        Probe {
            phase,
            quarter,
            driving: phase == Phase::Transmit,
            line: true,
            command_len: 0,
            tx_position: 0,
            rx_bits: 0,
        }
    }

    #[test]
    fn pulse_widths_split_on_falling_edges() {
        let levels = [true, true, false, true, true, true, false, false, false, true, false, true, true];
        assert_eq!(pulse_widths(&levels), vec![(1, 3), (3, 1), (1, 2)]);
        assert!(pulse_widths(&[true, true]).is_empty());
    }

    #[test]
    fn vcd_records_changes_only() {
        let mut recorder = Recorder::new(8);
        recorder.record(0, true, probe(Phase::Accumulate, 3));
        recorder.record(1, true, probe(Phase::Accumulate, 3));
        recorder.record(2, false, probe(Phase::Transmit, 3));

        let mut out = Vec::new();
        recorder.write_vcd(&mut out, 250).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("$timescale 250ns $end"));
        assert!(text.contains("#0\n1!\n0\"\nb0 #\nb11 $\nb0 %\n"));
        assert!(!text.contains("#1\n"));
        assert!(text.contains("#2\n0!\n1\"\nb1 #\n"));
    }

    #[test]
    fn recorder_is_bounded() {
        let mut recorder = Recorder::new(2);
        for tick in 0..5 {
            recorder.record(tick, true, probe(Phase::Accumulate, 0));
        }
        assert_eq!(recorder.samples().len(), 2);
    }
}
