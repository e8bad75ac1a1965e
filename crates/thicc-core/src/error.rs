//! Engine error types
//!
//! The per-sample path never fails. These errors cover the prepare/process
//! contract and are checked once per call.

use thiserror::Error;

use crate::types::MAX_CHANNELS;

/// Errors that can occur when preparing or driving the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Sample rate must be positive and finite
    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(f64),

    /// Block size must be non-zero
    #[error("Block size must be at least one sample")]
    InvalidBlockSize,

    /// Channel count outside the supported range
    #[error("Unsupported channel count {0} (supported: 1..={max})", max = MAX_CHANNELS)]
    UnsupportedChannelCount(usize),

    /// Oversampling factor index outside 0..=4
    #[error("Oversampling factor index {index} out of range (max {max})")]
    OversampleIndexOutOfRange { index: usize, max: usize },

    /// `process` was called before `prepare`
    #[error("Engine used before prepare")]
    NotPrepared,

    /// Buffer carries fewer channels than the engine was prepared for
    #[error("Buffer has {found} channels, engine prepared for {expected}")]
    ChannelMismatch { expected: usize, found: usize },

    /// Buffer is longer than the prepared block size
    #[error("Block of {found} samples exceeds prepared block size {max}")]
    BlockTooLarge { max: usize, found: usize },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EngineError::UnsupportedChannelCount(12).to_string(),
            "Unsupported channel count 12 (supported: 1..=8)"
        );
        assert_eq!(
            EngineError::BlockTooLarge { max: 512, found: 1024 }.to_string(),
            "Block of 1024 samples exceeds prepared block size 512"
        );
    }
}
