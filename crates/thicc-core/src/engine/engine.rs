//! Main processing engine - ties the signal chain together
//!
//! Per block:
//!
//! 1. Clear channels beyond the prepared layout, apply input gain.
//! 2. Silence gate: if the block peak is at or below [`SILENCE_THRESHOLD`]
//!    the chain is skipped; the first such block after activity resets all
//!    filter, DC-blocker and peak state exactly once.
//! 3. Otherwise upsample, then per sample: split → drive → shape → undo
//!    drive → pre-mix gain → recombine → output DC blocker, and downsample.
//! 4. Count the block for the peak meter, apply output gain.
//!
//! Only the meter history and DC-blocker/filter state survive across
//! blocks. `prepare` must be called before processing and again after any
//! change of sample rate, block size, channel count or oversampling factor.

use serde::{Deserialize, Serialize};

use crate::dsp::{Bands, BandSplitter, DcBlocker, GainStage, Oversampler, Saturator, ShaperSettings};
use crate::error::{EngineError, EngineResult};
use crate::params::{ParameterSnapshot, MAX_OVERSAMPLE_INDEX};
use crate::types::{AudioBuffer, MAX_CHANNELS, SAMPLE_RATE};

use super::denormal::ScopedFlushDenormals;
use super::meter::{MeterReader, PeakMeter, PEAK_HISTORY_LEN};

/// Default host block size
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Block peak (after input gain) at or below which processing is skipped.
/// About -90.46 dBFS.
pub const SILENCE_THRESHOLD: f32 = 0.00003;

/// Audio layout the engine is prepared for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSpec {
    /// Host sample rate in Hz
    pub sample_rate: f64,
    /// Maximum samples per block
    pub block_size: usize,
    /// Number of input (= processed) channels
    pub channels: usize,
    /// Oversampling factor = 2^index, fixed until the next prepare
    pub oversample_factor_index: usize,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE as f64,
            block_size: DEFAULT_BLOCK_SIZE,
            channels: 2,
            oversample_factor_index: ParameterSnapshot::default().oversample_factor_index,
        }
    }
}

impl ProcessSpec {
    /// Check the layout before allocating anything for it
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(EngineError::InvalidSampleRate(self.sample_rate));
        }
        if self.block_size == 0 {
            return Err(EngineError::InvalidBlockSize);
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(EngineError::UnsupportedChannelCount(self.channels));
        }
        if self.oversample_factor_index > MAX_OVERSAMPLE_INDEX {
            return Err(EngineError::OversampleIndexOutOfRange {
                index: self.oversample_factor_index,
                max: MAX_OVERSAMPLE_INDEX,
            });
        }
        Ok(())
    }

    /// Oversampling factor (1, 2, 4, 8 or 16)
    pub fn oversample_factor(&self) -> usize {
        1 << self.oversample_factor_index
    }

    /// Rate the nonlinear chain runs at
    pub fn oversampled_rate(&self) -> f64 {
        self.sample_rate * self.oversample_factor() as f64
    }
}

/// Silence gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Processing every sample
    Active,
    /// Bypassing the chain; state has been cleared
    Idle,
}

/// The nonlinear processing engine
pub struct Engine {
    spec: Option<ProcessSpec>,
    oversampler: Oversampler,
    splitter: BandSplitter,
    saturator: Saturator,
    /// DC blockers after the final mix, independent of the shaper's
    output_dc: [DcBlocker; MAX_CHANNELS],
    meter: PeakMeter,
    gate: GateState,
}

impl Engine {
    /// Create an unprepared engine
    pub fn new() -> Self {
        Self {
            spec: None,
            oversampler: Oversampler::new(0, 1, 0),
            splitter: BandSplitter::new(SAMPLE_RATE as f32),
            saturator: Saturator::new(),
            output_dc: [DcBlocker::new(); MAX_CHANNELS],
            meter: PeakMeter::new(),
            gate: GateState::Active,
        }
    }

    /// Create and prepare an engine in one step
    pub fn with_spec(spec: ProcessSpec) -> EngineResult<Self> {
        let mut engine = Self::new();
        engine.prepare(spec)?;
        Ok(engine)
    }

    /// Allocate and reset everything for a new layout
    ///
    /// Must not overlap a `process` call. The peak history restarts from
    /// the floor.
    pub fn prepare(&mut self, spec: ProcessSpec) -> EngineResult<()> {
        spec.validate()?;

        self.oversampler =
            Oversampler::new(spec.oversample_factor_index, spec.channels, spec.block_size);
        self.splitter = BandSplitter::new(spec.oversampled_rate() as f32);
        self.saturator.reset();
        for blocker in &mut self.output_dc {
            blocker.reset();
        }
        self.meter.prepare(spec.block_size);
        self.gate = GateState::Active;
        self.spec = Some(spec);

        log::info!(
            "Engine prepared: {}Hz, {} samples, {} channels, {}x oversampling ({:.2} samples latency)",
            spec.sample_rate,
            spec.block_size,
            spec.channels,
            spec.oversample_factor(),
            self.latency_samples()
        );
        Ok(())
    }

    /// Layout from the last successful prepare
    pub fn spec(&self) -> Option<&ProcessSpec> {
        self.spec.as_ref()
    }

    pub fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    pub fn gate_state(&self) -> GateState {
        self.gate
    }

    /// Latency introduced by oversampling, in host-rate samples
    pub fn latency_samples(&self) -> f32 {
        self.oversampler.latency_samples()
    }

    /// Latency rounded for hosts that take whole samples
    pub fn latency_samples_rounded(&self) -> u32 {
        self.latency_samples().round() as u32
    }

    /// Copy of the input peak history (index 0 = newest)
    pub fn input_peak_history(&self) -> [f32; PEAK_HISTORY_LEN] {
        *self.meter.history().input()
    }

    /// Copy of the output peak history (index 0 = newest)
    pub fn output_peak_history(&self) -> [f32; PEAK_HISTORY_LEN] {
        *self.meter.history().output()
    }

    /// Connect a display-side reader that mirrors the peak history
    ///
    /// The reader starts from a copy of the current history and follows
    /// later prepares. Replaces any previously connected reader.
    pub fn meter_reader(&mut self) -> MeterReader {
        self.meter.connect_reader()
    }

    /// Clear all filter, oversampler, DC-blocker and block-peak state
    pub fn reset(&mut self) {
        self.splitter.reset();
        self.oversampler.reset();
        self.saturator.reset();
        for blocker in &mut self.output_dc {
            blocker.reset();
        }
        self.meter.reset_peaks();
    }

    /// Process one block in place
    ///
    /// `buffer` needs at least the prepared channel count and at most the
    /// prepared block size; extra channels are cleared.
    pub fn process(
        &mut self,
        buffer: &mut AudioBuffer,
        params: &ParameterSnapshot,
    ) -> EngineResult<()> {
        let spec = self.spec.ok_or(EngineError::NotPrepared)?;
        if buffer.num_channels() < spec.channels {
            return Err(EngineError::ChannelMismatch {
                expected: spec.channels,
                found: buffer.num_channels(),
            });
        }
        if buffer.num_samples() > spec.block_size {
            return Err(EngineError::BlockTooLarge {
                max: spec.block_size,
                found: buffer.num_samples(),
            });
        }

        let _denormals = ScopedFlushDenormals::new();
        let channels = spec.channels;

        for ch in channels..buffer.num_channels() {
            buffer.clear_channel(ch);
        }

        let gains = GainStage::from_snapshot(params);
        buffer.scale_channels(channels, gains.input);

        if buffer.magnitude_channels(channels) > SILENCE_THRESHOLD {
            if self.gate == GateState::Idle {
                log::debug!("Engine: signal above silence floor, resuming processing");
            }
            self.gate = GateState::Active;
            self.process_active(buffer, channels, params, &gains);
        } else if self.gate == GateState::Active {
            log::debug!("Engine: block below silence floor, resetting state");
            self.reset();
            self.gate = GateState::Idle;
        }

        self.meter.end_block();
        buffer.scale_channels(channels, gains.output_post);
        Ok(())
    }

    fn process_active(
        &mut self,
        buffer: &mut AudioBuffer,
        channels: usize,
        params: &ParameterSnapshot,
        gains: &GainStage,
    ) {
        let settings = ShaperSettings::from_snapshot(params);
        self.splitter.configure(params.high_pass_hz, params.low_pass_hz);
        let split_active = self.splitter.is_active();

        let block = self.oversampler.upsample(buffer);

        for ch in 0..channels {
            for sample in block.channel_mut(ch).iter_mut() {
                let original = *sample;
                self.meter.track_input(original);

                let bands = if split_active {
                    self.splitter.split(ch, original)
                } else {
                    Bands::passthrough(original)
                };

                let driven = gains.drive(bands.main);
                let shaped = self.saturator.process(ch, driven, &settings);
                let mixed = gains.recombine(shaped, original, split_active.then_some(&bands));

                self.meter.track_output(mixed);
                *sample = self.output_dc[ch].process(mixed);
            }
        }

        self.oversampler.downsample(buffer);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::meter::METER_FLOOR;
    use crate::params::WaveType;

    fn spec(block_size: usize, channels: usize, oversample_factor_index: usize) -> ProcessSpec {
        ProcessSpec {
            sample_rate: 48000.0,
            block_size,
            channels,
            oversample_factor_index,
        }
    }

    fn impulse_block(channels: usize, len: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::silence(channels, len);
        for ch in 0..channels {
            buffer.channel_mut(ch)[0] = 1.0;
        }
        buffer
    }

    fn noise_block(channels: usize, len: usize, seed: u32) -> AudioBuffer {
        let mut state = seed;
        let mut buffer = AudioBuffer::silence(channels, len);
        for ch in 0..channels {
            for s in buffer.channel_mut(ch) {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                *s = (state >> 8) as f32 / (1u32 << 24) as f32 * 1.6 - 0.8;
            }
        }
        buffer
    }

    #[test]
    fn test_process_before_prepare_fails() {
        let mut engine = Engine::new();
        let mut buffer = AudioBuffer::silence(2, 64);
        assert_eq!(
            engine.process(&mut buffer, &ParameterSnapshot::default()),
            Err(EngineError::NotPrepared)
        );
    }

    #[test]
    fn test_prepare_validation() {
        let mut engine = Engine::new();
        assert_eq!(
            engine.prepare(ProcessSpec { block_size: 0, ..spec(512, 2, 1) }),
            Err(EngineError::InvalidBlockSize)
        );
        assert_eq!(
            engine.prepare(spec(512, 0, 1)),
            Err(EngineError::UnsupportedChannelCount(0))
        );
        assert_eq!(
            engine.prepare(spec(512, MAX_CHANNELS + 1, 1)),
            Err(EngineError::UnsupportedChannelCount(MAX_CHANNELS + 1))
        );
        assert_eq!(
            engine.prepare(spec(512, 2, 5)),
            Err(EngineError::OversampleIndexOutOfRange { index: 5, max: 4 })
        );
        assert!(matches!(
            engine.prepare(ProcessSpec { sample_rate: 0.0, ..spec(512, 2, 1) }),
            Err(EngineError::InvalidSampleRate(_))
        ));
        assert!(!engine.is_prepared());
        assert!(engine.prepare(spec(512, 2, 1)).is_ok());
        assert!(engine.is_prepared());
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let mut engine = Engine::with_spec(spec(128, 2, 1)).unwrap();
        let params = ParameterSnapshot::default();

        let mut mono = AudioBuffer::silence(1, 128);
        assert_eq!(
            engine.process(&mut mono, &params),
            Err(EngineError::ChannelMismatch { expected: 2, found: 1 })
        );

        let mut long = AudioBuffer::silence(2, 256);
        assert_eq!(
            engine.process(&mut long, &params),
            Err(EngineError::BlockTooLarge { max: 128, found: 256 })
        );

        // Shorter blocks are fine
        let mut short = noise_block(2, 100, 1);
        assert!(engine.process(&mut short, &params).is_ok());
    }

    #[test]
    fn test_extra_channels_cleared() {
        let mut engine = Engine::with_spec(spec(64, 1, 0)).unwrap();
        let mut buffer = noise_block(2, 64, 7);
        engine.process(&mut buffer, &ParameterSnapshot::default()).unwrap();
        assert!(buffer.channel(1).iter().all(|&s| s == 0.0));
        assert!(buffer.channel(0).iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_peak_history_cadence() {
        let mut engine = Engine::with_spec(spec(512, 2, 0)).unwrap();
        let params = ParameterSnapshot {
            mix_pct: 0.0,
            ..Default::default()
        };

        for block in 0..4 {
            let mut buffer = impulse_block(2, 512);
            engine.process(&mut buffer, &params).unwrap();
            if block < 3 {
                assert_eq!(engine.output_peak_history()[0], METER_FLOOR);
            }
        }

        let output = engine.output_peak_history();
        assert!(output[0].abs() < 1e-6, "newest output entry {}", output[0]);
        assert!(output[1..].iter().all(|&v| v == METER_FLOOR));
        assert!(engine.input_peak_history()[0].abs() < 1e-6);
    }

    #[test]
    fn test_idle_reset_matches_cold_start() {
        let split_spec = spec(256, 2, 1);
        let params = ParameterSnapshot {
            drive_db: 9.0,
            high_pass_hz: 150.0,
            low_pass_hz: 6000.0,
            clip_mode: false,
            even_harmonics: true,
            wave_type: WaveType::Exponential,
            mix_pct: 70.0,
            ..Default::default()
        };

        let mut warm = Engine::with_spec(split_spec).unwrap();
        for seed in 0..4 {
            let mut buffer = noise_block(2, 256, seed);
            warm.process(&mut buffer, &params).unwrap();
        }
        assert_eq!(warm.gate_state(), GateState::Active);

        let mut silence = AudioBuffer::silence(2, 256);
        warm.process(&mut silence, &params).unwrap();
        assert_eq!(warm.gate_state(), GateState::Idle);
        assert!(silence.channel(0).iter().all(|&s| s == 0.0));

        let mut warm_out = impulse_block(2, 256);
        warm.process(&mut warm_out, &params).unwrap();
        assert_eq!(warm.gate_state(), GateState::Active);

        let mut cold = Engine::with_spec(split_spec).unwrap();
        let mut cold_out = impulse_block(2, 256);
        cold.process(&mut cold_out, &params).unwrap();

        for ch in 0..2 {
            for (w, c) in warm_out.channel(ch).iter().zip(cold_out.channel(ch)) {
                assert!((w - c).abs() < 1e-7, "stale state leaked: {} vs {}", w, c);
            }
        }
    }

    #[test]
    fn test_idle_blocks_only_get_gain() {
        let mut engine = Engine::with_spec(spec(64, 1, 1)).unwrap();
        let params = ParameterSnapshot {
            output_gain_post_db: 6.0,
            drive_db: 24.0,
            ..Default::default()
        };
        let mut buffer = AudioBuffer::from_channels(&[&[0.00002; 64]]);
        engine.process(&mut buffer, &params).unwrap();

        assert_eq!(engine.gate_state(), GateState::Idle);
        let expected = 0.00002 * crate::types::db_to_gain(6.0);
        assert!(buffer.channel(0).iter().all(|&s| (s - expected).abs() < 1e-9));
    }

    #[test]
    fn test_input_gain_applies_before_gate() {
        let mut engine = Engine::with_spec(spec(64, 1, 0)).unwrap();
        let params = ParameterSnapshot {
            input_gain_db: 12.0,
            ..Default::default()
        };
        // 2e-5 is below the floor, +12 dB lifts it above
        let mut buffer = AudioBuffer::from_channels(&[&[0.00002; 64]]);
        engine.process(&mut buffer, &params).unwrap();
        assert_eq!(engine.gate_state(), GateState::Active);
    }

    #[test]
    fn test_dry_mix_is_dc_blocked_input() {
        let mut engine = Engine::with_spec(spec(128, 1, 0)).unwrap();
        let params = ParameterSnapshot {
            mix_pct: 0.0,
            drive_db: 18.0,
            ..Default::default()
        };
        let input = noise_block(1, 128, 3);
        let mut buffer = input.clone();
        engine.process(&mut buffer, &params).unwrap();

        let mut reference = DcBlocker::new();
        for (&x, &y) in input.channel(0).iter().zip(buffer.channel(0)) {
            assert!((reference.process(x) - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dry_bands_reconstruct_input_level() {
        let mut engine = Engine::with_spec(spec(512, 1, 0)).unwrap();
        let params = ParameterSnapshot {
            high_pass_hz: 200.0,
            low_pass_hz: 5000.0,
            mix_pct: 0.0,
            ..Default::default()
        };

        let mut input_energy = 0.0_f64;
        let mut output_energy = 0.0_f64;
        for block in 0..8 {
            let mut buffer = AudioBuffer::silence(1, 512);
            for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
                let n = (block * 512 + i) as f64;
                *s = (0.5 * (2.0 * std::f64::consts::PI * 1000.0 * n / 48000.0).sin()) as f32;
            }
            let input = buffer.clone();
            engine.process(&mut buffer, &params).unwrap();
            if block >= 4 {
                input_energy += input.channel(0).iter().map(|&s| (s as f64).powi(2)).sum::<f64>();
                output_energy += buffer.channel(0).iter().map(|&s| (s as f64).powi(2)).sum::<f64>();
            }
        }

        let diff_db = 10.0 * (output_energy / input_energy).log10();
        assert!(diff_db.abs() < 0.1, "band sum off by {} dB", diff_db);
    }

    #[test]
    fn test_drive_is_limited() {
        let mut engine = Engine::with_spec(spec(512, 1, 2)).unwrap();
        let params = ParameterSnapshot {
            drive_db: 24.0,
            clip_peaks: true,
            ..Default::default()
        };

        let mut peak = 0.0_f32;
        for block in 0..8 {
            let mut buffer = AudioBuffer::silence(1, 512);
            for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
                let n = (block * 512 + i) as f32;
                *s = 0.9 * (2.0 * std::f32::consts::PI * 220.0 * n / 48000.0).sin();
            }
            engine.process(&mut buffer, &params).unwrap();
            peak = peak.max(buffer.magnitude());
        }
        // Shaped output is at most unity before the drive is taken back out
        assert!(peak < 0.2, "peak {}", peak);
    }

    #[test]
    fn test_latency_follows_factor() {
        let engine = Engine::with_spec(spec(64, 2, 0)).unwrap();
        assert_eq!(engine.latency_samples_rounded(), 0);

        let engine = Engine::with_spec(spec(64, 2, 1)).unwrap();
        assert_eq!(engine.latency_samples_rounded(), 4);
    }

    #[test]
    fn test_meter_reader_follows_engine() {
        let mut engine = Engine::with_spec(spec(1024, 2, 1)).unwrap();
        let mut reader = engine.meter_reader();
        let params = ParameterSnapshot::default();

        for seed in 0..6 {
            let mut buffer = noise_block(2, 1024, seed);
            engine.process(&mut buffer, &params).unwrap();
        }

        assert!(reader.update());
        assert_eq!(reader.input_history(), engine.input_peak_history());
        assert_eq!(reader.output_history(), engine.output_peak_history());
        assert!(reader.input_history()[0] > METER_FLOOR);
    }

    #[test]
    fn test_reader_follows_prepare() {
        let mut engine = Engine::with_spec(spec(2048, 1, 0)).unwrap();
        let mut reader = engine.meter_reader();

        let mut buffer = AudioBuffer::from_channels(&[&[0.5; 2048]]);
        engine.process(&mut buffer, &ParameterSnapshot::default()).unwrap();
        assert!(reader.update());
        assert!(reader.input_history()[0] > METER_FLOOR);

        engine.prepare(spec(2048, 1, 0)).unwrap();
        assert!(reader.update());
        assert_eq!(reader.input_history(), engine.input_peak_history());
        assert_eq!(reader.output_history(), engine.output_peak_history());
        assert!(reader.input_history().iter().all(|&v| v == METER_FLOOR));
    }

    #[test]
    fn test_late_reader_sees_existing_history() {
        let mut engine = Engine::with_spec(spec(2048, 2, 1)).unwrap();
        for seed in 0..3 {
            let mut buffer = noise_block(2, 2048, seed);
            engine.process(&mut buffer, &ParameterSnapshot::default()).unwrap();
        }

        let mut reader = engine.meter_reader();
        assert_eq!(reader.input_history(), engine.input_peak_history());
        assert!(reader.input_history()[2] > METER_FLOOR);

        let mut buffer = noise_block(2, 2048, 9);
        engine.process(&mut buffer, &ParameterSnapshot::default()).unwrap();
        assert!(reader.update());
        assert_eq!(reader.output_history(), engine.output_peak_history());
    }

    #[test]
    fn test_prepare_resets_history() {
        let mut engine = Engine::with_spec(spec(2048, 1, 0)).unwrap();
        let mut buffer = impulse_block(1, 2048);
        engine.process(&mut buffer, &ParameterSnapshot::default()).unwrap();
        assert!(engine.input_peak_history()[0] > METER_FLOOR);

        engine.prepare(spec(2048, 1, 0)).unwrap();
        assert!(engine.input_peak_history().iter().all(|&v| v == METER_FLOOR));
    }
}
