//! Linkwitz-Riley band splitter
//!
//! Splits the signal so that only one band (the "main" band) is driven into
//! the waveshaper while the others bypass it and are added back at the mix
//! stage.
//!
//! ## How it works
//!
//! Each [`LinkwitzRiley`] filter is an LR4 (24dB/oct) section: two cascaded
//! 2-pole Butterworth state-variable stages with Q = 1/√2. A lowpass and a
//! highpass at the same cutoff sum to an allpass, so bands reconstruct at
//! unity magnitude.
//!
//! The three-band split also sends the low band through the upper crossover
//! (as a low/high pair) so every path sees the same allpass phase:
//!
//! ```text
//! x ─┬─ LP(hp) ─┬─ LP(lp) ───────────── low  (bypass)
//!    │          └─ HP(lp) ───────────── low' (bypass)
//!    └─ HP(hp) ─┬─ LP(lp) ───────────── mid  (main)
//!               └─ HP(lp) ───────────── high (bypass)
//! ```
//!
//! The regime is picked from the cutoffs against fixed guard literals
//! (`highPass < 21` and `lowPass > 19999`) rather than by comparing the two
//! cutoffs to each other.

use crate::types::MAX_CHANNELS;

/// √2 damping for Butterworth stages (Q = 1/√2)
const R2: f32 = std::f32::consts::SQRT_2;

/// Neutral high-pass setting: below this the high-pass is considered off
pub const HIGH_PASS_GUARD_HZ: f32 = 21.0;

/// Neutral low-pass setting: above this the low-pass is considered off
pub const LOW_PASS_GUARD_HZ: f32 = 19999.0;

/// Parameter values at which filtering is disabled entirely
pub const HIGH_PASS_NEUTRAL_HZ: f32 = 20.0;
pub const LOW_PASS_NEUTRAL_HZ: f32 = 20000.0;

/// Response of a [`LinkwitzRiley`] filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
}

/// LR4 filter with per-channel state
///
/// Both Butterworth stages share the same coefficients; state is four
/// integrator values per channel.
#[derive(Clone)]
pub struct LinkwitzRiley {
    kind: FilterKind,
    sample_rate: f32,
    cutoff: f32,
    // Coefficients
    g: f32,
    h: f32,
    /// [s1, s2, s3, s4] per channel
    state: [[f32; 4]; MAX_CHANNELS],
}

impl LinkwitzRiley {
    pub fn new(kind: FilterKind, sample_rate: f32, cutoff: f32) -> Self {
        let mut filter = Self {
            kind,
            sample_rate,
            cutoff: 0.0,
            g: 0.0,
            h: 0.0,
            state: [[0.0; 4]; MAX_CHANNELS],
        };
        filter.update_coefficients(cutoff);
        filter
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Set the cutoff frequency; coefficients are only recomputed on change
    #[inline]
    pub fn set_cutoff(&mut self, cutoff: f32) {
        if cutoff != self.cutoff {
            self.update_coefficients(cutoff);
        }
    }

    fn update_coefficients(&mut self, cutoff: f32) {
        self.cutoff = cutoff;
        // Keep the prewarp below Nyquist when running without oversampling
        let fc = cutoff.clamp(10.0, self.sample_rate * 0.49);
        self.g = (std::f32::consts::PI * fc / self.sample_rate).tan();
        self.h = 1.0 / (1.0 + R2 * self.g + self.g * self.g);
    }

    /// Process one sample of channel `ch`
    #[inline]
    pub fn process(&mut self, ch: usize, input: f32) -> f32 {
        let g = self.g;
        let h = self.h;
        let [s1, s2, s3, s4] = &mut self.state[ch];

        // First Butterworth stage
        let yh = (input - (R2 + g) * *s1 - *s2) * h;
        let yb = g * yh + *s1;
        *s1 = g * yh + yb;
        let yl = g * yb + *s2;
        *s2 = g * yb + yl;

        let stage_two_in = match self.kind {
            FilterKind::LowPass => yl,
            FilterKind::HighPass => yh,
        };

        // Second Butterworth stage (cascade)
        let yh2 = (stage_two_in - (R2 + g) * *s3 - *s4) * h;
        let yb2 = g * yh2 + *s3;
        *s3 = g * yh2 + yb2;
        let yl2 = g * yb2 + *s4;
        *s4 = g * yb2 + yl2;

        match self.kind {
            FilterKind::LowPass => yl2,
            FilterKind::HighPass => yh2,
        }
    }

    pub fn reset(&mut self) {
        self.state = [[0.0; 4]; MAX_CHANNELS];
    }
}

/// Active splitting regime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// No filtering: the whole signal is the main band
    Bypass,
    /// Low-pass only: main = low band, high band bypasses
    LowPassOnly,
    /// High-pass only: main = high band, low band bypasses
    HighPassOnly,
    /// Main = mid band between both cutoffs, low and high bands bypass
    ThreeBand,
}

impl SplitMode {
    /// Pick the regime for a pair of cutoffs
    pub fn select(high_pass_hz: f32, low_pass_hz: f32) -> Self {
        if high_pass_hz == HIGH_PASS_NEUTRAL_HZ && low_pass_hz == LOW_PASS_NEUTRAL_HZ {
            SplitMode::Bypass
        } else if high_pass_hz < HIGH_PASS_GUARD_HZ {
            SplitMode::LowPassOnly
        } else if low_pass_hz > LOW_PASS_GUARD_HZ {
            SplitMode::HighPassOnly
        } else {
            SplitMode::ThreeBand
        }
    }
}

/// Output of one split: the band to shape plus the bypassed bands
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bands {
    /// Band routed through the waveshaper
    pub main: f32,
    /// Bands added back unmodified at the mix stage (unused slots are 0)
    pub bypassed: [f32; 3],
}

impl Bands {
    /// Whole signal as main band, nothing bypassed
    #[inline]
    pub fn passthrough(input: f32) -> Self {
        Self {
            main: input,
            bypassed: [0.0; 3],
        }
    }

    /// Sum of the bypassed bands
    #[inline]
    pub fn bypassed_sum(&self) -> f32 {
        self.bypassed[0] + self.bypassed[1] + self.bypassed[2]
    }

    /// Sum of all bands (reconstruction of the input)
    #[inline]
    pub fn sum(&self) -> f32 {
        self.main + self.bypassed_sum()
    }
}

/// Filter network for each regime, holding only the filters it needs
#[derive(Clone)]
enum Topology {
    Bypass,
    LowPassOnly {
        low: LinkwitzRiley,
        high: LinkwitzRiley,
    },
    HighPassOnly {
        low: LinkwitzRiley,
        high: LinkwitzRiley,
    },
    ThreeBand {
        /// LP at the high-pass cutoff
        low: LinkwitzRiley,
        /// Low band re-split at the low-pass cutoff
        low_split_lo: LinkwitzRiley,
        low_split_hi: LinkwitzRiley,
        /// HP at the high-pass cutoff
        mid_hp: LinkwitzRiley,
        /// Mid band split at the low-pass cutoff
        mid_lp: LinkwitzRiley,
        high: LinkwitzRiley,
    },
}

/// 1/2/3-way crossover feeding the waveshaper
///
/// Only the main band is shaped; the others are summed back in the mixer.
pub struct BandSplitter {
    sample_rate: f32,
    topology: Topology,
}

impl BandSplitter {
    /// Create a splitter running at `sample_rate` (the oversampled rate)
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            topology: Topology::Bypass,
        }
    }

    /// Current regime
    pub fn mode(&self) -> SplitMode {
        match self.topology {
            Topology::Bypass => SplitMode::Bypass,
            Topology::LowPassOnly { .. } => SplitMode::LowPassOnly,
            Topology::HighPassOnly { .. } => SplitMode::HighPassOnly,
            Topology::ThreeBand { .. } => SplitMode::ThreeBand,
        }
    }

    /// Whether any band is bypassing the waveshaper
    pub fn is_active(&self) -> bool {
        !matches!(self.topology, Topology::Bypass)
    }

    /// Apply a pair of cutoffs
    ///
    /// Staying in the same regime only retunes the filters and keeps their
    /// state; switching regime builds the new network from clean state.
    pub fn configure(&mut self, high_pass_hz: f32, low_pass_hz: f32) {
        let mode = SplitMode::select(high_pass_hz, low_pass_hz);
        if mode != self.mode() {
            self.topology = self.build(mode, high_pass_hz, low_pass_hz);
            return;
        }

        match &mut self.topology {
            Topology::Bypass => {}
            Topology::LowPassOnly { low, high } => {
                low.set_cutoff(low_pass_hz);
                high.set_cutoff(low_pass_hz);
            }
            Topology::HighPassOnly { low, high } => {
                low.set_cutoff(high_pass_hz);
                high.set_cutoff(high_pass_hz);
            }
            Topology::ThreeBand {
                low,
                low_split_lo,
                low_split_hi,
                mid_hp,
                mid_lp,
                high,
            } => {
                low.set_cutoff(high_pass_hz);
                mid_hp.set_cutoff(high_pass_hz);
                low_split_lo.set_cutoff(low_pass_hz);
                low_split_hi.set_cutoff(low_pass_hz);
                mid_lp.set_cutoff(low_pass_hz);
                high.set_cutoff(low_pass_hz);
            }
        }
    }

    fn build(&self, mode: SplitMode, high_pass_hz: f32, low_pass_hz: f32) -> Topology {
        let sr = self.sample_rate;
        let lp = |cutoff| LinkwitzRiley::new(FilterKind::LowPass, sr, cutoff);
        let hp = |cutoff| LinkwitzRiley::new(FilterKind::HighPass, sr, cutoff);

        match mode {
            SplitMode::Bypass => Topology::Bypass,
            SplitMode::LowPassOnly => Topology::LowPassOnly {
                low: lp(low_pass_hz),
                high: hp(low_pass_hz),
            },
            SplitMode::HighPassOnly => Topology::HighPassOnly {
                low: lp(high_pass_hz),
                high: hp(high_pass_hz),
            },
            SplitMode::ThreeBand => Topology::ThreeBand {
                low: lp(high_pass_hz),
                low_split_lo: lp(low_pass_hz),
                low_split_hi: hp(low_pass_hz),
                mid_hp: hp(high_pass_hz),
                mid_lp: lp(low_pass_hz),
                high: hp(low_pass_hz),
            },
        }
    }

    /// Split one sample of channel `ch`
    #[inline]
    pub fn split(&mut self, ch: usize, input: f32) -> Bands {
        match &mut self.topology {
            Topology::Bypass => Bands::passthrough(input),
            Topology::LowPassOnly { low, high } => Bands {
                main: low.process(ch, input),
                bypassed: [high.process(ch, input), 0.0, 0.0],
            },
            Topology::HighPassOnly { low, high } => Bands {
                main: high.process(ch, input),
                bypassed: [low.process(ch, input), 0.0, 0.0],
            },
            Topology::ThreeBand {
                low,
                low_split_lo,
                low_split_hi,
                mid_hp,
                mid_lp,
                high,
            } => {
                let low_band = low.process(ch, input);
                let low_upper = low_split_hi.process(ch, low_band);
                let low_lower = low_split_lo.process(ch, low_band);

                let mid_band = mid_hp.process(ch, input);
                let high_band = high.process(ch, mid_band);
                let main = mid_lp.process(ch, mid_band);

                Bands {
                    main,
                    bypassed: [low_lower, high_band, low_upper],
                }
            }
        }
    }

    /// Clear all filter state, keeping the regime and cutoffs
    pub fn reset(&mut self) {
        match &mut self.topology {
            Topology::Bypass => {}
            Topology::LowPassOnly { low, high } | Topology::HighPassOnly { low, high } => {
                low.reset();
                high.reset();
            }
            Topology::ThreeBand {
                low,
                low_split_lo,
                low_split_hi,
                mid_hp,
                mid_lp,
                high,
            } => {
                for filter in [low, low_split_lo, low_split_hi, mid_hp, mid_lp, high] {
                    filter.reset();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 96000.0;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * std::f64::consts::PI * freq as f64 * n as f64 / SR as f64).sin() as f32)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
        (sum / samples.len() as f64).sqrt() as f32
    }

    /// Run a sine through the splitter and compare steady-state RMS of the
    /// reconstructed sum against the input (allpass -> same magnitude)
    fn reconstruction_error_db(splitter: &mut BandSplitter, freq: f32) -> f32 {
        let input = sine(freq, 48000);
        let output: Vec<f32> = input.iter().map(|&x| splitter.split(0, x).sum()).collect();
        let settle = 24000;
        let ratio = rms(&output[settle..]) / rms(&input[settle..]);
        (20.0 * ratio.log10()).abs()
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(SplitMode::select(20.0, 20000.0), SplitMode::Bypass);
        assert_eq!(SplitMode::select(20.0, 5000.0), SplitMode::LowPassOnly);
        assert_eq!(SplitMode::select(300.0, 20000.0), SplitMode::HighPassOnly);
        assert_eq!(SplitMode::select(300.0, 5000.0), SplitMode::ThreeBand);
        // Guard literals, not a cutoff comparison
        assert_eq!(SplitMode::select(20.5, 19999.5), SplitMode::LowPassOnly);
        assert_eq!(SplitMode::select(21.0, 19999.5), SplitMode::HighPassOnly);
        // Reversed cutoffs still produce a three-band network
        assert_eq!(SplitMode::select(8000.0, 200.0), SplitMode::ThreeBand);
    }

    #[test]
    fn test_lowpass_passes_dc_highpass_blocks_it() {
        let mut lp = LinkwitzRiley::new(FilterKind::LowPass, SR, 1000.0);
        let mut hp = LinkwitzRiley::new(FilterKind::HighPass, SR, 1000.0);
        let mut low = 0.0;
        let mut high = 0.0;
        for _ in 0..20000 {
            low = lp.process(0, 1.0);
            high = hp.process(0, 1.0);
        }
        assert!((low - 1.0).abs() < 1e-4);
        assert!(high.abs() < 1e-4);
    }

    #[test]
    fn test_crossover_point_is_minus_six_db() {
        let mut lp = LinkwitzRiley::new(FilterKind::LowPass, SR, 1000.0);
        let input = sine(1000.0, 48000);
        let output: Vec<f32> = input.iter().map(|&x| lp.process(0, x)).collect();
        let gain_db = 20.0 * (rms(&output[24000..]) / rms(&input[24000..])).log10();
        assert!((gain_db + 6.02).abs() < 0.1, "gain at crossover {}", gain_db);
    }

    #[test]
    fn test_three_band_reconstruction() {
        let mut splitter = BandSplitter::new(SR);
        splitter.configure(200.0, 2000.0);
        assert_eq!(splitter.mode(), SplitMode::ThreeBand);

        for freq in [50.0, 200.0, 700.0, 2000.0, 9000.0] {
            splitter.reset();
            let err = reconstruction_error_db(&mut splitter, freq);
            // -60 dB residual corresponds to ~0.0087 dB magnitude error
            assert!(err < 0.01, "{}Hz reconstruction off by {}dB", freq, err);
        }
    }

    #[test]
    fn test_three_band_impulse_energy_preserved() {
        let mut splitter = BandSplitter::new(SR);
        splitter.configure(200.0, 2000.0);

        let mut energy = 0.0_f64;
        for n in 0..96000 {
            let x = if n == 0 { 1.0 } else { 0.0 };
            let y = splitter.split(0, x).sum() as f64;
            energy += y * y;
        }
        assert!((energy - 1.0).abs() < 1e-3, "impulse energy {}", energy);
    }

    #[test]
    fn test_two_band_reconstruction() {
        let mut splitter = BandSplitter::new(SR);
        splitter.configure(20.0, 3000.0);
        assert_eq!(splitter.mode(), SplitMode::LowPassOnly);
        assert!(reconstruction_error_db(&mut splitter, 3000.0) < 0.01);

        splitter.configure(500.0, 20000.0);
        assert_eq!(splitter.mode(), SplitMode::HighPassOnly);
        assert!(reconstruction_error_db(&mut splitter, 500.0) < 0.01);
    }

    #[test]
    fn test_main_band_selection() {
        // High-pass only: main band carries the highs
        let mut splitter = BandSplitter::new(SR);
        splitter.configure(1000.0, 20000.0);
        let input = sine(10000.0, 9600);
        let mains: Vec<f32> = input.iter().map(|&x| splitter.split(0, x).main).collect();
        assert!(rms(&mains[4800..]) > 0.69);

        // Low-pass only: main band carries the lows
        splitter.configure(20.0, 1000.0);
        let input = sine(10000.0, 9600);
        let mains: Vec<f32> = input.iter().map(|&x| splitter.split(0, x).main).collect();
        assert!(rms(&mains[4800..]) < 0.01);
    }

    #[test]
    fn test_bypass_is_passthrough() {
        let mut splitter = BandSplitter::new(SR);
        splitter.configure(20.0, 20000.0);
        assert!(!splitter.is_active());
        let bands = splitter.split(0, 0.3);
        assert_eq!(bands.main, 0.3);
        assert_eq!(bands.bypassed_sum(), 0.0);
    }

    #[test]
    fn test_retune_keeps_state_and_reset_clears_it() {
        let mut splitter = BandSplitter::new(SR);
        splitter.configure(200.0, 2000.0);
        let mut cold = BandSplitter::new(SR);
        cold.configure(300.0, 2000.0);

        for _ in 0..100 {
            splitter.split(0, 1.0);
        }
        splitter.configure(300.0, 2000.0);
        assert_eq!(splitter.mode(), SplitMode::ThreeBand);
        assert_ne!(splitter.split(0, 0.0), cold.split(0, 0.0));

        splitter.reset();
        cold.reset();
        assert_eq!(splitter.split(0, 0.5), cold.split(0, 0.5));
    }
}
