//! Parameters - descriptors, per-block snapshot and the lock-free store
//!
//! The control layer writes values into [`SharedParams`] from any thread;
//! the audio thread reads a [`ParameterSnapshot`] once per block. Each value
//! is an independent relaxed atomic, so a snapshot may combine values from
//! slightly different moments. That is accepted: a one-block-stale
//! combination is inaudible.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Number of parameters exposed by the engine
pub const PARAM_COUNT: usize = 14;

/// Highest oversampling factor index (16x)
pub const MAX_OVERSAMPLE_INDEX: usize = 4;

/// Waveshaper transfer-function family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum WaveType {
    /// `sin(x - knee) + knee`
    #[default]
    Sine = 1,
    /// `-e^-(x - knee) + knee + 1`
    Exponential = 2,
    /// `ln(x - knee + 1) + knee`
    Logarithmic = 3,
    /// `tanh(x - knee) + knee`
    Tanh = 4,
}

impl WaveType {
    /// All wave types in parameter order
    pub const ALL: [WaveType; 4] = [
        WaveType::Sine,
        WaveType::Exponential,
        WaveType::Logarithmic,
        WaveType::Tanh,
    ];

    /// Convert from the 1-based parameter value
    pub fn from_index(idx: u8) -> Option<Self> {
        match idx {
            1 => Some(WaveType::Sine),
            2 => Some(WaveType::Exponential),
            3 => Some(WaveType::Logarithmic),
            4 => Some(WaveType::Tanh),
            _ => None,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            WaveType::Sine => "Sine",
            WaveType::Exponential => "Exponential",
            WaveType::Logarithmic => "Logarithmic",
            WaveType::Tanh => "Tanh",
        }
    }
}

/// Immutable per-block view of every control value
///
/// `softness` and `knee` are fractions in [0, 1]; `mix_pct` stays in
/// percent. Cutoffs may arrive in either order, the band splitter copes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSnapshot {
    pub drive_db: f32,
    pub output_gain_pre_db: f32,
    pub softness: f32,
    pub knee: f32,
    pub input_gain_db: f32,
    pub output_gain_post_db: f32,
    pub low_pass_hz: f32,
    pub high_pass_hz: f32,
    pub mix_pct: f32,
    pub clip_mode: bool,
    pub clip_peaks: bool,
    pub wave_type: WaveType,
    pub even_harmonics: bool,
    /// Oversampling factor = 2^index; only read at prepare time
    pub oversample_factor_index: usize,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            drive_db: 0.0,
            output_gain_pre_db: 0.0,
            softness: 1.0,
            knee: 0.0,
            input_gain_db: 0.0,
            output_gain_post_db: 0.0,
            low_pass_hz: 20000.0,
            high_pass_hz: 20.0,
            mix_pct: 100.0,
            clip_mode: true,
            clip_peaks: false,
            wave_type: WaveType::Sine,
            even_harmonics: false,
            oversample_factor_index: 1,
        }
    }
}

impl ParameterSnapshot {
    /// Oversampling factor (1, 2, 4, 8 or 16)
    pub fn oversample_factor(&self) -> usize {
        1 << self.oversample_factor_index.min(MAX_OVERSAMPLE_INDEX)
    }
}

/// Parameter identifiers, in host order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ParamId {
    Drive = 0,
    OutputGainPre = 1,
    Softness = 2,
    Knee = 3,
    InputGain = 4,
    OutputGainPost = 5,
    LowPass = 6,
    HighPass = 7,
    Mix = 8,
    ClipMode = 9,
    ClipPeaks = 10,
    WaveType = 11,
    EvenHarmonics = 12,
    OversampleFactor = 13,
}

impl ParamId {
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::Drive,
        ParamId::OutputGainPre,
        ParamId::Softness,
        ParamId::Knee,
        ParamId::InputGain,
        ParamId::OutputGainPost,
        ParamId::LowPass,
        ParamId::HighPass,
        ParamId::Mix,
        ParamId::ClipMode,
        ParamId::ClipPeaks,
        ParamId::WaveType,
        ParamId::EvenHarmonics,
        ParamId::OversampleFactor,
    ];

    /// Look a parameter up by its stable key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.info().key == key)
    }

    /// Descriptor for this parameter
    pub fn info(&self) -> ParamInfo {
        match self {
            ParamId::Drive => ParamInfo::new("drive", "Drive", 0.0)
                .with_range(-24.0, 24.0)
                .with_step(0.1)
                .with_unit("dB"),
            ParamId::OutputGainPre => ParamInfo::new("outputGainPre", "Gain (pre-mix)", 0.0)
                .with_range(-24.0, 24.0)
                .with_step(0.1)
                .with_unit("dB"),
            ParamId::Softness => ParamInfo::new("softness", "Softness", 100.0)
                .with_range(0.0, 100.0)
                .with_step(1.0)
                .with_unit("%"),
            ParamId::Knee => ParamInfo::new("knee", "Knee", 0.0)
                .with_range(0.0, 100.0)
                .with_step(1.0)
                .with_unit("%"),
            ParamId::InputGain => ParamInfo::new("inputGain", "Input Gain", 0.0)
                .with_range(-30.0, 30.0)
                .with_step(0.1)
                .with_unit("dB"),
            ParamId::OutputGainPost => ParamInfo::new("outputGainPost", "Output Gain", 0.0)
                .with_range(-30.0, 30.0)
                .with_step(0.1)
                .with_unit("dB"),
            ParamId::LowPass => ParamInfo::new("lowPass", "Low Pass", 20000.0)
                .with_range(40.0, 20000.0)
                .with_step(1.0)
                .with_unit("Hz"),
            ParamId::HighPass => ParamInfo::new("highPass", "High Pass", 20.0)
                .with_range(20.0, 15000.0)
                .with_step(1.0)
                .with_unit("Hz"),
            ParamId::Mix => ParamInfo::new("mix", "Mix", 100.0)
                .with_range(0.0, 100.0)
                .with_step(0.1)
                .with_unit("%"),
            ParamId::ClipMode => ParamInfo::toggle("clip", "Clip Mode", true),
            ParamId::ClipPeaks => ParamInfo::toggle("peak", "Hard Clip Peaks", false),
            ParamId::WaveType => ParamInfo::new("type", "Saturation Type", 1.0)
                .with_range(1.0, 4.0)
                .with_step(1.0),
            ParamId::EvenHarmonics => ParamInfo::toggle("even", "Even Harmonics", false),
            // Exposed as the 1..5 choice; the engine uses choice - 1 as the factor index
            ParamId::OversampleFactor => ParamInfo::new("OSFactor", "Oversampling Factor", 2.0)
                .with_range(1.0, 5.0)
                .with_step(1.0),
        }
    }
}

/// Descriptor of one ranged parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// Stable key used by the control layer
    pub key: &'static str,
    /// Display name
    pub name: &'static str,
    /// Default value (in parameter units)
    pub default: f32,
    pub min: f32,
    pub max: f32,
    /// Snapping interval (0.0 = continuous)
    pub step: f32,
    /// Unit label (e.g. "dB", "%", "Hz")
    pub unit: &'static str,
}

impl ParamInfo {
    /// Create a continuous parameter over [0, 1]
    pub fn new(key: &'static str, name: &'static str, default: f32) -> Self {
        Self {
            key,
            name,
            default,
            min: 0.0,
            max: 1.0,
            step: 0.0,
            unit: "",
        }
    }

    /// Create an on/off parameter (stored as 0.0 / 1.0)
    pub fn toggle(key: &'static str, name: &'static str, default: bool) -> Self {
        Self::new(key, name, if default { 1.0 } else { 0.0 }).with_step(1.0)
    }

    /// Set the value range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the snapping interval
    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// Set the unit label
    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Clamp to range and snap to the step grid
    pub fn constrain(&self, value: f32) -> f32 {
        let value = if value.is_nan() { self.default } else { value };
        let clamped = value.clamp(self.min, self.max);
        if self.step > 0.0 {
            let snapped = self.min + ((clamped - self.min) / self.step).round() * self.step;
            snapped.clamp(self.min, self.max)
        } else {
            clamped
        }
    }

    /// Map a normalized 0..1 value onto the range
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        self.constrain(self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min))
    }

    /// Map a value in range to 0..1
    pub fn to_normalized(&self, value: f32) -> f32 {
        if self.max > self.min {
            ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Lock-free parameter store shared between control and audio threads
///
/// Values are kept in parameter units (dB, %, Hz, 0/1 toggles, 1-based
/// choices) as f32 bit patterns. All operations use `Ordering::Relaxed`
/// since only visibility matters, not ordering between parameters.
pub struct SharedParams {
    values: [AtomicU32; PARAM_COUNT],
}

impl SharedParams {
    /// Create a store holding every parameter's default
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|i| AtomicU32::new(ParamId::ALL[i].info().default.to_bits())),
        }
    }

    /// Create a store holding the values of an existing snapshot
    pub fn from_snapshot(snapshot: &ParameterSnapshot) -> Self {
        let params = Self::new();
        params.store_snapshot(snapshot);
        params
    }

    /// Set a parameter, clamping and snapping it to its declared range
    pub fn set(&self, id: ParamId, value: f32) {
        let info = id.info();
        let constrained = info.constrain(value);
        if constrained != value {
            log::debug!(
                "SharedParams: {} value {} constrained to {}",
                info.key,
                value,
                constrained
            );
        }
        self.values[id as usize].store(constrained.to_bits(), Ordering::Relaxed);
    }

    /// Set a toggle parameter
    pub fn set_bool(&self, id: ParamId, value: bool) {
        self.set(id, if value { 1.0 } else { 0.0 });
    }

    /// Set a parameter from a normalized 0..1 value
    pub fn set_normalized(&self, id: ParamId, normalized: f32) {
        self.set(id, id.info().from_normalized(normalized));
    }

    /// Read a parameter in its own units (lock-free)
    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        f32::from_bits(self.values[id as usize].load(Ordering::Relaxed))
    }

    #[inline]
    fn get_bool(&self, id: ParamId) -> bool {
        self.get(id) > 0.5
    }

    /// Read every parameter into an engine snapshot
    pub fn snapshot(&self) -> ParameterSnapshot {
        let wave_type = WaveType::from_index(self.get(ParamId::WaveType).round() as u8)
            .unwrap_or_default();
        let oversample_choice = self.get(ParamId::OversampleFactor).round().max(1.0) as usize;

        ParameterSnapshot {
            drive_db: self.get(ParamId::Drive),
            output_gain_pre_db: self.get(ParamId::OutputGainPre),
            softness: self.get(ParamId::Softness) / 100.0,
            knee: self.get(ParamId::Knee) / 100.0,
            input_gain_db: self.get(ParamId::InputGain),
            output_gain_post_db: self.get(ParamId::OutputGainPost),
            low_pass_hz: self.get(ParamId::LowPass),
            high_pass_hz: self.get(ParamId::HighPass),
            mix_pct: self.get(ParamId::Mix),
            clip_mode: self.get_bool(ParamId::ClipMode),
            clip_peaks: self.get_bool(ParamId::ClipPeaks),
            wave_type,
            even_harmonics: self.get_bool(ParamId::EvenHarmonics),
            oversample_factor_index: (oversample_choice - 1).min(MAX_OVERSAMPLE_INDEX),
        }
    }

    /// Write every value of a snapshot into the store
    pub fn store_snapshot(&self, snapshot: &ParameterSnapshot) {
        self.set(ParamId::Drive, snapshot.drive_db);
        self.set(ParamId::OutputGainPre, snapshot.output_gain_pre_db);
        self.set(ParamId::Softness, snapshot.softness * 100.0);
        self.set(ParamId::Knee, snapshot.knee * 100.0);
        self.set(ParamId::InputGain, snapshot.input_gain_db);
        self.set(ParamId::OutputGainPost, snapshot.output_gain_post_db);
        self.set(ParamId::LowPass, snapshot.low_pass_hz);
        self.set(ParamId::HighPass, snapshot.high_pass_hz);
        self.set(ParamId::Mix, snapshot.mix_pct);
        self.set_bool(ParamId::ClipMode, snapshot.clip_mode);
        self.set_bool(ParamId::ClipPeaks, snapshot.clip_peaks);
        self.set(ParamId::WaveType, snapshot.wave_type as u8 as f32);
        self.set_bool(ParamId::EvenHarmonics, snapshot.even_harmonics);
        self.set(
            ParamId::OversampleFactor,
            (snapshot.oversample_factor_index + 1) as f32,
        );
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_snapshot_default() {
        let params = SharedParams::new();
        assert_eq!(params.snapshot(), ParameterSnapshot::default());
    }

    #[test]
    fn test_set_clamps_and_snaps() {
        let params = SharedParams::new();

        params.set(ParamId::Drive, 40.0);
        assert_eq!(params.get(ParamId::Drive), 24.0);

        params.set(ParamId::WaveType, 2.6);
        assert_eq!(params.snapshot().wave_type, WaveType::Logarithmic);

        params.set(ParamId::HighPass, 5.0);
        assert_eq!(params.get(ParamId::HighPass), 20.0);
    }

    #[test]
    fn test_snapshot_unit_conversion() {
        let params = SharedParams::new();
        params.set(ParamId::Softness, 50.0);
        params.set(ParamId::Knee, 25.0);
        params.set(ParamId::OversampleFactor, 5.0);
        params.set_bool(ParamId::EvenHarmonics, true);

        let snapshot = params.snapshot();
        assert!((snapshot.softness - 0.5).abs() < 1e-6);
        assert!((snapshot.knee - 0.25).abs() < 1e-6);
        assert_eq!(snapshot.oversample_factor_index, 4);
        assert_eq!(snapshot.oversample_factor(), 16);
        assert!(snapshot.even_harmonics);
    }

    #[test]
    fn test_store_snapshot_roundtrip() {
        let snapshot = ParameterSnapshot {
            drive_db: 6.0,
            mix_pct: 40.0,
            clip_mode: false,
            wave_type: WaveType::Tanh,
            oversample_factor_index: 3,
            ..Default::default()
        };
        let params = SharedParams::from_snapshot(&snapshot);
        assert_eq!(params.snapshot(), snapshot);
    }

    #[test]
    fn test_param_lookup_and_normalization() {
        assert_eq!(ParamId::from_key("OSFactor"), Some(ParamId::OversampleFactor));
        assert_eq!(ParamId::from_key("missing"), None);

        let info = ParamId::InputGain.info();
        assert_eq!(info.from_normalized(0.5), 0.0);
        assert_eq!(info.to_normalized(30.0), 1.0);
    }

    #[test]
    fn test_wave_type_from_index() {
        assert_eq!(WaveType::from_index(3), Some(WaveType::Logarithmic));
        assert_eq!(WaveType::from_index(0), None);
        assert_eq!(WaveType::from_index(5), None);
    }
}
