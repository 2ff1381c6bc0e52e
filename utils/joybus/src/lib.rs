pub mod codec;
pub mod config;
pub mod device;
mod engine;
mod error;
mod framer;
pub mod line;
mod receiver;
mod register;
pub mod timer;
pub mod trace;
mod transmitter;

// Re-export public API
pub use codec::{BitOrder, RESPONSE_BIT_ORDER};
pub use config::{COMMAND_SENT, EngineConfig};
pub use device::{Behavior, ControllerModel};
pub use engine::{Engine, LINE_IDLE_UNITS, Phase, Probe};
pub use error::{Error, Result};
pub use framer::{CommandFramer, MAX_COMMAND_LEN};
pub use line::{Line, Wire, WireEnd};
pub use receiver::Receiver;
pub use register::{RESPONSE_BITS, RESPONSE_BYTES, Response, ResponseRegister};
pub use timer::{Timing, UnitTimer};
pub use transmitter::Transmitter;
