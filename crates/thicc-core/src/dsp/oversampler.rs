//! Polyphase IIR half-band oversampler
//!
//! Nonlinear shaping generates harmonics far above the input bandwidth.
//! Running the shaper at 2^k times the host rate keeps those harmonics below
//! the (raised) Nyquist frequency; they are then filtered out before
//! decimating back down.
//!
//! # Structure
//!
//! Each 2x stage is a half-band lowpass split into two polyphase branches,
//! each a cascade of first-order allpass sections running at the lower rate:
//!
//! ```text
//! H(z) = ½ · (A(z²) + z⁻¹ · B(z²))
//! ```
//!
//! - **Up**: every input sample yields two outputs, `A(x)` then `B(x)`
//!   (zero stuffing and the x2 gain fold into the polyphase form).
//! - **Down**: even samples feed `A`, odd samples feed `B`; the output is
//!   `½ · (A(even[n]) + B(odd[n-1]))`.
//!
//! Factors above 2x cascade stages. Factor index 0 (1x) is a plain copy.

use crate::types::{AudioBuffer, MAX_CHANNELS};

/// Highest supported factor index (2^4 = 16x)
pub const MAX_FACTOR_INDEX: usize = 4;

/// Sections per allpass branch
const SECTIONS: usize = 6;

/// Steep 12th-order half-band coefficients, undelayed branch
const COEFFS_A: [f32; SECTIONS] = [
    0.036_681_502,
    0.274_631_76,
    0.561_098_97,
    0.769_741_83,
    0.892_260_8,
    0.962_094_55,
];

/// Steep 12th-order half-band coefficients, delayed branch
const COEFFS_B: [f32; SECTIONS] = [
    0.136_547_62,
    0.423_138_62,
    0.677_540_05,
    0.839_889_6,
    0.931_541_96,
    0.987_816_37,
];

/// First-order allpass `(a + z⁻¹) / (1 + a·z⁻¹)`
#[derive(Clone, Copy, Default)]
struct AllpassSection {
    x1: f32,
    y1: f32,
}

/// One branch (cascade of allpass sections) for every channel
#[derive(Clone)]
struct AllpassChain {
    coeffs: [f32; SECTIONS],
    state: [[AllpassSection; SECTIONS]; MAX_CHANNELS],
}

impl AllpassChain {
    fn new(coeffs: [f32; SECTIONS]) -> Self {
        Self {
            coeffs,
            state: [[AllpassSection::default(); SECTIONS]; MAX_CHANNELS],
        }
    }

    #[inline]
    fn process(&mut self, ch: usize, input: f32) -> f32 {
        let mut x = input;
        for (section, &a) in self.state[ch].iter_mut().zip(self.coeffs.iter()) {
            let y = a * (x - section.y1) + section.x1;
            section.x1 = x;
            section.y1 = y;
            x = y;
        }
        x
    }

    fn reset(&mut self) {
        self.state = [[AllpassSection::default(); SECTIONS]; MAX_CHANNELS];
    }

    /// Group delay at DC in samples of the branch's own rate
    fn dc_group_delay(&self) -> f32 {
        self.coeffs.iter().map(|a| (1.0 - a) / (1.0 + a)).sum()
    }
}

/// One 2x stage: separate filter state for the up and down directions
#[derive(Clone)]
struct HalfBandStage {
    up_a: AllpassChain,
    up_b: AllpassChain,
    down_a: AllpassChain,
    down_b: AllpassChain,
    /// Previous B-branch output per channel (the z⁻¹ of the down path)
    down_delay: [f32; MAX_CHANNELS],
}

impl HalfBandStage {
    fn new() -> Self {
        Self {
            up_a: AllpassChain::new(COEFFS_A),
            up_b: AllpassChain::new(COEFFS_B),
            down_a: AllpassChain::new(COEFFS_A),
            down_b: AllpassChain::new(COEFFS_B),
            down_delay: [0.0; MAX_CHANNELS],
        }
    }

    fn upsample(&mut self, ch: usize, input: &[f32], output: &mut [f32]) {
        for (pair, &x) in output.chunks_exact_mut(2).zip(input.iter()) {
            pair[0] = self.up_a.process(ch, x);
            pair[1] = self.up_b.process(ch, x);
        }
    }

    fn downsample(&mut self, ch: usize, input: &[f32], output: &mut [f32]) {
        for (y, pair) in output.iter_mut().zip(input.chunks_exact(2)) {
            let a = self.down_a.process(ch, pair[0]);
            *y = 0.5 * (a + self.down_delay[ch]);
            self.down_delay[ch] = self.down_b.process(ch, pair[1]);
        }
    }

    fn reset(&mut self) {
        self.up_a.reset();
        self.up_b.reset();
        self.down_a.reset();
        self.down_b.reset();
        self.down_delay = [0.0; MAX_CHANNELS];
    }

    /// Delay of one direction in samples at the stage's high rate
    fn high_rate_delay(&self) -> f32 {
        // A branch: 2·τA, B branch: 2·τB + 1; the two match closely
        self.up_a.dc_group_delay() + self.up_b.dc_group_delay() + 0.5
    }
}

/// Multi-stage oversampler with pre-allocated per-rate buffers
///
/// `levels[k]` holds the block at 2^k times the host rate. The factor is
/// fixed for a prepare cycle.
pub struct Oversampler {
    factor_index: usize,
    num_channels: usize,
    stages: Vec<HalfBandStage>,
    levels: Vec<AudioBuffer>,
}

impl Oversampler {
    /// Allocate stages and buffers for `factor_index` (factor = 2^index)
    pub fn new(factor_index: usize, num_channels: usize, max_block_size: usize) -> Self {
        let factor_index = factor_index.min(MAX_FACTOR_INDEX);
        let num_channels = num_channels.min(MAX_CHANNELS);
        Self {
            factor_index,
            num_channels,
            stages: (0..factor_index).map(|_| HalfBandStage::new()).collect(),
            levels: (0..=factor_index)
                .map(|k| AudioBuffer::silence(num_channels, max_block_size << k))
                .collect(),
        }
    }

    pub fn factor_index(&self) -> usize {
        self.factor_index
    }

    /// Oversampling factor (1, 2, 4, 8 or 16)
    pub fn factor(&self) -> usize {
        1 << self.factor_index
    }

    /// Round-trip latency (up + down) in host-rate samples
    pub fn latency_samples(&self) -> f32 {
        self.stages
            .iter()
            .enumerate()
            .map(|(k, stage)| 2.0 * stage.high_rate_delay() / (2 << k) as f32)
            .sum()
    }

    /// Upsample the first `num_channels` channels of `input`
    ///
    /// Returns the oversampled block, to be processed in place before
    /// calling [`Oversampler::downsample`].
    pub fn upsample(&mut self, input: &AudioBuffer) -> &mut AudioBuffer {
        let len = input.num_samples();
        self.levels[0].copy_from(input, self.num_channels);

        for (k, stage) in self.stages.iter_mut().enumerate() {
            let (lower, upper) = self.levels.split_at_mut(k + 1);
            let src = &lower[k];
            let dst = &mut upper[0];
            dst.set_len_from_capacity(len << (k + 1));
            for ch in 0..self.num_channels {
                stage.upsample(ch, src.channel(ch), dst.channel_mut(ch));
            }
        }

        &mut self.levels[self.factor_index]
    }

    /// Filter and decimate the oversampled block back into `output`
    pub fn downsample(&mut self, output: &mut AudioBuffer) {
        for (k, stage) in self.stages.iter_mut().enumerate().rev() {
            let (lower, upper) = self.levels.split_at_mut(k + 1);
            let dst = &mut lower[k];
            let src = &upper[0];
            dst.set_len_from_capacity(src.num_samples() / 2);
            for ch in 0..self.num_channels {
                stage.downsample(ch, src.channel(ch), dst.channel_mut(ch));
            }
        }

        let len = self.levels[0].num_samples();
        for ch in 0..self.num_channels {
            output.channel_mut(ch)[..len].copy_from_slice(self.levels[0].channel(ch));
        }
    }

    /// Clear all filter state
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}
