//! DSP building blocks for the THICC signal chain
//!
//! Everything here is allocation-free after construction and safe to run
//! on the audio thread.

pub mod crossover;
pub mod dc_blocker;
pub mod mixer;
pub mod oversampler;
pub mod waveshaper;

pub use crossover::{BandSplitter, Bands, FilterKind, LinkwitzRiley, SplitMode};
pub use dc_blocker::DcBlocker;
pub use mixer::GainStage;
pub use oversampler::Oversampler;
pub use waveshaper::{shape, Saturator, ShaperSettings, BIAS};
