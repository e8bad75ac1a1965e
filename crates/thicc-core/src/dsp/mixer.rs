//! Gain staging and dry/wet recombination
//!
//! Linear gains are computed once per block from the snapshot; the per-sample
//! work is a handful of multiplies.

use crate::params::ParameterSnapshot;
use crate::types::db_to_gain;

use super::crossover::Bands;

/// Per-block gain and mix factors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    /// Pre-shaper drive (linear)
    pub drive: f32,
    /// Post-shaper, pre-mix gain (linear)
    pub output_pre: f32,
    /// Wet proportion (mix / 100)
    pub wet: f32,
    /// Buffer-level gain before processing (linear)
    pub input: f32,
    /// Buffer-level gain after processing (linear)
    pub output_post: f32,
}

impl GainStage {
    pub fn from_snapshot(params: &ParameterSnapshot) -> Self {
        Self {
            drive: db_to_gain(params.drive_db),
            output_pre: db_to_gain(params.output_gain_pre_db),
            wet: params.mix_pct / 100.0,
            input: db_to_gain(params.input_gain_db),
            output_post: db_to_gain(params.output_gain_post_db),
        }
    }

    /// Apply drive ahead of the waveshaper
    #[inline]
    pub fn drive(&self, sample: f32) -> f32 {
        sample * self.drive
    }

    /// Recombine a shaped sample with the dry signal
    ///
    /// Undoes the drive, applies the pre-mix gain and blends with the dry
    /// main band (plus the untouched bypassed bands) when splitting is
    /// active, or with the original sample otherwise.
    #[inline]
    pub fn recombine(&self, shaped: f32, original: f32, bands: Option<&Bands>) -> f32 {
        let mut sample = shaped / self.drive;
        sample *= self.output_pre;

        match bands {
            Some(bands) => {
                sample * self.wet + bands.main * (1.0 - self.wet) + bands.bypassed_sum()
            }
            None => sample * self.wet + original * (1.0 - self.wet),
        }
    }
}

impl Default for GainStage {
    fn default() -> Self {
        Self::from_snapshot(&ParameterSnapshot::default())
    }
}
