use thiserror::Error;

/// Errors surfaced by the engine and its configuration layer
#[derive(Debug, Error)]
pub enum Error {
    /// The device never pulled the line low after the stop bit
    #[error("no response from device after {waited_units} units")]
    Timeout { waited_units: u32 },

    /// The response stopped before all 64 bits were timed
    #[error("response ended after {bits} of 64 bits")]
    IncompleteResponse { bits: usize },

    #[error("command of {len} bytes exceeds the 7-byte frame")]
    Truncated { len: usize },

    #[error("command is empty")]
    EmptyCommand,

    #[error("engine is busy in the {phase:?} phase")]
    Busy { phase: crate::engine::Phase },

    #[error("poll cycle did not finish within {ticks} ticks")]
    StepLimit { ticks: u64 },

    #[error("host clock of {host_hz} Hz is slower than one tick per microsecond")]
    ClockTooSlow { host_hz: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
