use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{BitOrder, RESPONSE_BIT_ORDER};
use crate::error::{Error, Result};
use crate::timer::Timing;

/// Sentinel written to the output queue once a command is on the wire
pub const COMMAND_SENT: u8 = 0x55;

/// Engine settings.
///
/// Defaults: sentinel on, early stop release on, no timeouts.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Host ticks per one-microsecond unit
    pub ticks_per_unit: Option<u32>,
    /// Host tick frequency; used when `ticks_per_unit` is absent
    pub host_clock_hz: Option<u64>,
    /// Emit the 0x55 marker after each command
    pub sentinel: bool,
    pub bit_order: BitOrder,
    /// Release the line once the stop bit has been high for two units
    pub early_stop_release: bool,
    /// Units to wait for the device to start answering
    pub turnaround_timeout_units: Option<u32>,
    /// Units without an edge tolerated while a response is in flight
    pub edge_timeout_units: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ticks_per_unit: None,
            host_clock_hz: None,
            sentinel: true,
            bit_order: RESPONSE_BIT_ORDER,
            early_stop_release: true,
            turnaround_timeout_units: None,
            edge_timeout_units: None,
        }
    }
}

impl EngineConfig {
    /// Settings with both timeouts enabled
    pub fn hardened() -> Self {
        Self {
            turnaround_timeout_units: Some(100),
            edge_timeout_units: Some(16),
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.timing()?;
        Ok(config)
    }

    pub fn timing(&self) -> Result<Timing> {
        match (self.ticks_per_unit, self.host_clock_hz) {
            (Some(_), Some(_)) => Err(Error::Config(
                "set either ticks_per_unit or host_clock_hz, not both".into(),
            )),
            (Some(ticks), None) => Timing::new(ticks),
            (None, Some(hz)) => Timing::from_host_clock(hz),
            (None, None) => Ok(Timing::default()),
        }
    }
}
