//! Peak metering - block-rate peak tracking and display history
//!
//! The audio thread accumulates input/output peaks per block. Every
//! `round(2048 / block_size)` blocks the history shifts by one (newest at
//! index 0) and the accumulators restart, giving a display rate that does
//! not depend on the host block size.
//!
//! History values are normalized: `max(20·log10(peak), -96) / 18`, so the
//! range is roughly [-5.33, 1] for peaks up to +18 dBFS.
//!
//! # Sharing with a display
//!
//! The engine-owned history can be copied out directly between blocks.
//! For a display running on another thread, [`meter_channel`] creates a
//! wait-free SPSC queue: the audio thread pushes one [`MeterPoint`] per
//! shift (and a reset on prepare) and the [`MeterReader`] replays them into
//! its own mirror history, so the display never observes a half-shifted
//! buffer.

use crate::types::gain_to_db;

/// Number of entries in each history
pub const PEAK_HISTORY_LEN: usize = 256;

/// Lowest displayed level in dB
pub const METER_FLOOR_DB: f32 = -96.0;

/// dB per display unit
pub const METER_SCALE_DB: f32 = 18.0;

/// Samples (at the host rate) between history updates
pub const METER_WINDOW_SAMPLES: usize = 2048;

/// Normalized floor value every history starts from
pub const METER_FLOOR: f32 = METER_FLOOR_DB / METER_SCALE_DB;

/// Capacity of the audio -> display queue (~11 s at 48kHz)
const METER_QUEUE_CAPACITY: usize = PEAK_HISTORY_LEN;

/// Convert a linear peak to a normalized history value
#[inline]
pub fn normalize_peak(peak: f32) -> f32 {
    gain_to_db(peak).max(METER_FLOOR_DB) / METER_SCALE_DB
}

/// Blocks between history updates for a given block size (at least 1)
pub fn blocks_per_update(block_size: usize) -> usize {
    let blocks = (METER_WINDOW_SAMPLES as f64 / block_size.max(1) as f64).round() as usize;
    blocks.max(1)
}

/// One history update, as sent to a display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterPoint {
    /// Normalized input peak
    pub input: f32,
    /// Normalized output peak
    pub output: f32,
}

/// Fixed-length input/output peak histories (index 0 = newest)
#[derive(Debug, Clone, PartialEq)]
pub struct PeakHistory {
    input: [f32; PEAK_HISTORY_LEN],
    output: [f32; PEAK_HISTORY_LEN],
}

impl PeakHistory {
    /// Histories filled with the floor value
    pub fn new() -> Self {
        Self {
            input: [METER_FLOOR; PEAK_HISTORY_LEN],
            output: [METER_FLOOR; PEAK_HISTORY_LEN],
        }
    }

    /// Shift right by one (dropping the oldest) and insert at index 0
    pub fn push(&mut self, point: MeterPoint) {
        self.input.copy_within(0..PEAK_HISTORY_LEN - 1, 1);
        self.output.copy_within(0..PEAK_HISTORY_LEN - 1, 1);
        self.input[0] = point.input;
        self.output[0] = point.output;
    }

    pub fn reset(&mut self) {
        self.input.fill(METER_FLOOR);
        self.output.fill(METER_FLOOR);
    }

    pub fn input(&self) -> &[f32; PEAK_HISTORY_LEN] {
        &self.input
    }

    pub fn output(&self) -> &[f32; PEAK_HISTORY_LEN] {
        &self.output
    }
}

impl Default for PeakHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Message on the audio -> display queue
#[derive(Debug, Clone, Copy, PartialEq)]
enum MeterMessage {
    /// One history shift
    Point(MeterPoint),
    /// History restarted from the floor (engine prepared)
    Reset,
}

/// Audio-thread side of the meter queue
pub struct MeterFeed {
    producer: rtrb::Producer<MeterMessage>,
}

/// Display-side mirror of the engine's peak history
pub struct MeterReader {
    consumer: rtrb::Consumer<MeterMessage>,
    history: PeakHistory,
}

impl MeterReader {
    /// Drain pending messages into the mirror history
    ///
    /// Returns true if anything changed.
    pub fn update(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.consumer.pop() {
            match message {
                MeterMessage::Point(point) => self.history.push(point),
                MeterMessage::Reset => self.history.reset(),
            }
            changed = true;
        }
        changed
    }

    /// Copy of the input history (index 0 = newest)
    pub fn input_history(&self) -> [f32; PEAK_HISTORY_LEN] {
        *self.history.input()
    }

    /// Copy of the output history (index 0 = newest)
    pub fn output_history(&self) -> [f32; PEAK_HISTORY_LEN] {
        *self.history.output()
    }
}

/// Create a connected feed/reader pair, the reader starting at the floor
pub fn meter_channel() -> (MeterFeed, MeterReader) {
    let (producer, consumer) = rtrb::RingBuffer::new(METER_QUEUE_CAPACITY);
    (
        MeterFeed { producer },
        MeterReader {
            consumer,
            history: PeakHistory::new(),
        },
    )
}

/// Block-rate peak meter owned by the engine
pub struct PeakMeter {
    history: PeakHistory,
    /// Max |x| seen before shaping since the last update
    input_peak: f32,
    /// Max |x| seen after mixing since the last update
    output_peak: f32,
    counter: usize,
    counter_max: usize,
    feed: Option<MeterFeed>,
    /// A reset still has to reach the reader; points wait behind it
    reset_pending: bool,
    /// Messages not delivered because the display fell behind
    dropped: u64,
}

impl PeakMeter {
    pub fn new() -> Self {
        Self {
            history: PeakHistory::new(),
            input_peak: 0.0,
            output_peak: 0.0,
            counter: 0,
            counter_max: blocks_per_update(crate::engine::DEFAULT_BLOCK_SIZE),
            feed: None,
            reset_pending: false,
            dropped: 0,
        }
    }

    /// Attach a display feed (replaces any previous one)
    ///
    /// The reader is assumed to be in sync with the current history.
    pub fn set_feed(&mut self, feed: MeterFeed) {
        self.feed = Some(feed);
        self.reset_pending = false;
    }

    /// Create a reader seeded with the current history and attach its feed
    pub fn connect_reader(&mut self) -> MeterReader {
        let (feed, mut reader) = meter_channel();
        reader.history = self.history.clone();
        self.set_feed(feed);
        reader
    }

    /// Reset history and cadence for a new block size
    ///
    /// A connected reader is told to restart from the floor as well.
    pub fn prepare(&mut self, block_size: usize) {
        self.counter_max = blocks_per_update(block_size);
        self.counter = 0;
        self.history.reset();
        self.reset_peaks();

        if self.feed.is_some() {
            self.reset_pending = true;
            self.send_pending_reset();
        }
    }

    /// Blocks between history updates
    pub fn counter_max(&self) -> usize {
        self.counter_max
    }

    #[inline]
    pub fn track_input(&mut self, sample: f32) {
        self.input_peak = self.input_peak.max(sample.abs());
    }

    #[inline]
    pub fn track_output(&mut self, sample: f32) {
        self.output_peak = self.output_peak.max(sample.abs());
    }

    /// Zero the block-level accumulators
    pub fn reset_peaks(&mut self) {
        self.input_peak = 0.0;
        self.output_peak = 0.0;
    }

    /// Count one block; shifts the history when the window completes
    pub fn end_block(&mut self) {
        self.counter += 1;
        if self.counter < self.counter_max {
            return;
        }

        let point = MeterPoint {
            input: normalize_peak(self.input_peak),
            output: normalize_peak(self.output_peak),
        };
        self.history.push(point);
        self.publish(point);

        self.reset_peaks();
        self.counter = 0;
    }

    /// Try to deliver a queued reset; false if it is still pending
    fn send_pending_reset(&mut self) -> bool {
        if !self.reset_pending {
            return true;
        }
        let Some(feed) = &mut self.feed else {
            self.reset_pending = false;
            return true;
        };
        if feed.producer.push(MeterMessage::Reset).is_ok() {
            self.reset_pending = false;
            true
        } else {
            false
        }
    }

    fn publish(&mut self, point: MeterPoint) {
        if self.feed.is_none() {
            return;
        }
        if !self.send_pending_reset() {
            self.dropped += 1;
            return;
        }
        if let Some(feed) = &mut self.feed {
            if feed.producer.push(MeterMessage::Point(point)).is_err() {
                self.dropped += 1;
            }
        }
    }

    pub fn history(&self) -> &PeakHistory {
        &self.history
    }

    /// Points dropped because the display queue was full
    pub fn dropped_points(&self) -> u64 {
        self.dropped
    }
}

impl Default for PeakMeter {
    fn default() -> Self {
        Self::new()
    }
}
