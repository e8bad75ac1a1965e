//! THICC Core - nonlinear saturation and clipping engine
//!
//! Per-sample signal chain: input gain, optional band split, waveshaping at
//! an oversampled rate, DC removal, dry/wet recombination, output gain and
//! block-rate peak metering.

pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod params;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Engine, GateState, MeterFeed, MeterPoint, MeterReader, ProcessSpec};
pub use error::{EngineError, EngineResult};
pub use params::{ParamId, ParamInfo, ParameterSnapshot, SharedParams, WaveType};
pub use types::*;
