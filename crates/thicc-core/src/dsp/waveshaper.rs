//! Waveshaper - the nonlinear core
//!
//! [`shape`] is a pure, odd-symmetric transfer function: it works on |x|
//! and reapplies the sign. Four families are available, each linear below
//! the knee (a dead zone where output equals input magnitude) and
//! compressing above it. `softness` blends the shaped value with the input
//! magnitude clamped to unity.
//!
//! [`Saturator`] wraps the transfer function in the mode logic:
//!
//! - **Saturate** (clip mode off): add [`BIAS`], shape, remove [`BIAS`],
//!   reshape symmetrically unless even harmonics are requested, then block
//!   the injected DC.
//! - **Clip** (clip mode on): symmetric shaping, or shaping of the positive
//!   half only (followed by DC blocking) when even harmonics are requested.
//!
//! A fixed tanh stage (softness 1) always follows as a final soft limiter.
//! Its knee comes from the knee control.

use crate::params::{ParameterSnapshot, WaveType};
use crate::types::MAX_CHANNELS;

use super::dc_blocker::DcBlocker;

/// Offset added before and removed after shaping in saturate mode.
///
/// Shaping the biased signal makes the transfer asymmetric, which is what
/// produces the even-order harmonics. The add -> shape -> subtract ->
/// reshape order is part of the sound and must not change.
pub const BIAS: f32 = 0.4;

/// Apply a transfer function to one sample
///
/// `softness` = 1 gives the fully shaped curve, 0 gives `min(|x|, 1)` with
/// the sign restored. With `clip_peaks` the shaped magnitude is limited to
/// 1 for every family; the sine family additionally snaps to exactly 1 from
/// `asin(1 - knee) + knee` upward, where the sine would turn back down.
#[inline]
pub fn shape(x: f32, wave: WaveType, softness: f32, knee: f32, clip_peaks: bool) -> f32 {
    let magnitude = x.abs();
    let mut shaped = magnitude;

    match wave {
        WaveType::Sine => {
            if clip_peaks && magnitude >= (1.0 - knee).asin() + knee {
                shaped = 1.0;
            } else if magnitude > knee {
                shaped = (magnitude - knee).sin() + knee;
            }
        }
        WaveType::Exponential => {
            if magnitude > knee {
                shaped = -(-(magnitude - knee)).exp() + knee + 1.0;
            }
        }
        WaveType::Logarithmic => {
            if magnitude > knee {
                shaped = (magnitude - knee + 1.0).ln() + knee;
            }
        }
        WaveType::Tanh => {
            if magnitude > knee {
                shaped = (magnitude - knee).tanh() + knee;
            }
        }
    }

    if clip_peaks {
        shaped = shaped.min(1.0);
    }

    let blended = softness * shaped + (1.0 - softness) * magnitude.min(1.0);

    if x > 0.0 {
        blended
    } else {
        -blended
    }
}

/// Per-block shaping settings derived from a parameter snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaperSettings {
    pub wave: WaveType,
    /// Blend of shaped vs linear output for the primary stage (0..1)
    pub softness: f32,
    /// Knee of the final tanh stage (1 - knee control)
    pub limiter_knee: f32,
    pub clip_peaks: bool,
    /// Clip mode (true) or saturate mode (false)
    pub clip_mode: bool,
    /// Asymmetric shaping for even-order harmonics
    pub even_harmonics: bool,
}

impl ShaperSettings {
    pub fn from_snapshot(params: &ParameterSnapshot) -> Self {
        Self {
            wave: params.wave_type,
            softness: params.softness,
            limiter_knee: 1.0 - params.knee,
            clip_peaks: params.clip_peaks,
            clip_mode: params.clip_mode,
            even_harmonics: params.even_harmonics,
        }
    }
}

impl Default for ShaperSettings {
    fn default() -> Self {
        Self::from_snapshot(&ParameterSnapshot::default())
    }
}

/// Mode logic around [`shape`], with the stage-one DC blockers
///
/// The primary stage always runs with knee 0.
pub struct Saturator {
    dc_blockers: [DcBlocker; MAX_CHANNELS],
}

impl Saturator {
    pub fn new() -> Self {
        Self {
            dc_blockers: [DcBlocker::new(); MAX_CHANNELS],
        }
    }

    /// Shape one (already driven) sample of channel `ch`
    #[inline]
    pub fn process(&mut self, ch: usize, input: f32, settings: &ShaperSettings) -> f32 {
        let ShaperSettings {
            wave,
            softness,
            clip_peaks,
            ..
        } = *settings;
        let mut sample = input;

        if settings.clip_mode {
            if !settings.even_harmonics {
                sample = shape(sample, wave, softness, 0.0, clip_peaks);
            } else {
                if sample > 0.0 {
                    sample = shape(sample, wave, softness, 0.0, clip_peaks);
                }
                sample = self.dc_blockers[ch].process(sample);
            }
        } else {
            sample += BIAS;
            sample = shape(sample, wave, softness, 0.0, clip_peaks);
            sample -= BIAS;

            if !settings.even_harmonics {
                sample = shape(sample, wave, softness, 0.0, clip_peaks);
            }

            sample = self.dc_blockers[ch].process(sample);
        }

        shape(sample, WaveType::Tanh, 1.0, settings.limiter_knee, clip_peaks)
    }

    /// Clear the DC blocker state of every channel
    pub fn reset(&mut self) {
        for blocker in &mut self.dc_blockers {
            blocker.reset();
        }
    }
}

impl Default for Saturator {
    fn default() -> Self {
        Self::new()
    }
}
