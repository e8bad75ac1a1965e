//! Processing engine - prepare/process lifecycle, silence gate, metering
//!
//! - Engine: the per-block signal chain and its state machine
//! - Meter: peak tracking, display history and the lock-free display feed
//! - Denormal: scoped flush-to-zero for the processing path

mod denormal;
mod engine;
mod meter;

pub use denormal::ScopedFlushDenormals;
pub use engine::*;
pub use meter::{
    blocks_per_update, meter_channel, normalize_peak, MeterFeed, MeterPoint, MeterReader,
    PeakHistory, PeakMeter, METER_FLOOR, METER_FLOOR_DB, METER_SCALE_DB, METER_WINDOW_SAMPLES,
    PEAK_HISTORY_LEN,
};
