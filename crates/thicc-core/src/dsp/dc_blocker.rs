//! One-pole DC blocker
//!
//! `y[n] = x[n] - x[n-1] + R * y[n-1]` with `R = 0.999`. Removes the offset
//! left behind by biased or half-wave shaping.

/// Feedback coefficient of the blocker pole
pub const DC_BLOCKER_POLE: f32 = 0.999;

/// Single-channel DC blocker state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DcBlocker {
    /// Previous input sample
    x1: f32,
    /// Previous output sample
    y1: f32,
}

impl DcBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.y1 = input - self.x1 + DC_BLOCKER_POLE * self.y1;
        self.x1 = input;
        self.y1
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}
