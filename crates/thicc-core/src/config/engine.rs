//! Engine run configuration

use serde::{Deserialize, Serialize};

use crate::engine::{ProcessSpec, DEFAULT_BLOCK_SIZE};
use crate::params::ParameterSnapshot;
use crate::types::SAMPLE_RATE;

/// Layout and starting parameter values for an engine run
///
/// Every field is optional in YAML; omitted fields take their defaults:
///
/// ```yaml
/// sample_rate: 44100.0
/// block_size: 256
/// params:
///   drive_db: 12.0
///   wave_type: Tanh
///   oversample_factor_index: 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host sample rate in Hz (a renderer uses the file's rate instead)
    pub sample_rate: f64,
    /// Samples per processed block
    pub block_size: usize,
    /// Processed channel count
    pub channels: usize,
    /// Initial control values
    pub params: ParameterSnapshot,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE as f64,
            block_size: DEFAULT_BLOCK_SIZE,
            channels: 2,
            params: ParameterSnapshot::default(),
        }
    }
}

impl EngineConfig {
    /// Layout to prepare an engine with
    ///
    /// The oversampling factor comes from the parameter values, since it is
    /// only applied at prepare time.
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            channels: self.channels,
            oversample_factor_index: self.params.oversample_factor_index,
        }
    }
}
