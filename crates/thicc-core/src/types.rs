//! Common types for THICC
//!
//! Fundamental audio types shared by the engine and its hosts: the sample
//! type, channel limits and the planar multi-channel buffer.

/// Default sample rate (48kHz - standard professional audio rate)
pub const SAMPLE_RATE: u32 = 48000;

/// Maximum channel count the engine can be prepared for.
///
/// Per-channel filter, DC-blocker and oversampler state lives in fixed
/// arrays of this size so nothing is allocated after `prepare`.
pub const MAX_CHANNELS: usize = 8;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Convert decibels to a linear gain factor
#[inline]
pub fn db_to_gain(db: Sample) -> Sample {
    10.0_f32.powf(db * 0.05)
}

/// Convert a linear magnitude to decibels (`-inf` for silence)
#[inline]
pub fn gain_to_db(gain: Sample) -> Sample {
    20.0 * gain.log10()
}

/// A planar buffer of multi-channel samples
///
/// Each channel is stored contiguously. Buffers are allocated once at
/// prepare time with a fixed capacity; the working length can then be
/// changed per block without allocating.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<Sample>>,
}

impl AudioBuffer {
    /// Create a silent buffer with `num_channels` channels of `len` samples
    pub fn silence(num_channels: usize, len: usize) -> Self {
        Self {
            channels: vec![vec![0.0; len]; num_channels],
        }
    }

    /// Create a buffer from separate channel slices
    pub fn from_channels(channels: &[&[Sample]]) -> Self {
        if let Some(first) = channels.first() {
            assert!(
                channels.iter().all(|c| c.len() == first.len()),
                "Channel lengths must match"
            );
        }
        Self {
            channels: channels.iter().map(|c| c.to_vec()).collect(),
        }
    }

    /// Create a buffer from interleaved samples [c0, c1, ..., c0, c1, ...]
    pub fn from_interleaved(interleaved: &[Sample], num_channels: usize) -> Self {
        assert!(num_channels > 0, "Buffer needs at least one channel");
        assert!(
            interleaved.len() % num_channels == 0,
            "Interleaved length must be a multiple of the channel count"
        );
        let len = interleaved.len() / num_channels;
        let mut buffer = Self::silence(num_channels, len);
        for (frame_idx, frame) in interleaved.chunks_exact(num_channels).enumerate() {
            for (ch, &value) in frame.iter().enumerate() {
                buffer.channels[ch][frame_idx] = value;
            }
        }
        buffer
    }

    /// Copy samples to an interleaved output buffer
    pub fn to_interleaved(&self, output: &mut [Sample]) {
        let num_channels = self.num_channels();
        assert!(output.len() >= self.num_samples() * num_channels);
        for (ch, samples) in self.channels.iter().enumerate() {
            for (i, &value) in samples.iter().enumerate() {
                output[i * num_channels + ch] = value;
            }
        }
    }

    /// Number of channels in the buffer
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Check if the buffer holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Set the working length of every channel (real-time safe)
    ///
    /// Never allocates as long as `len` stays within the capacity the buffer
    /// was created with. Newly exposed samples are silent.
    #[inline]
    pub fn set_len_from_capacity(&mut self, len: usize) {
        for channel in &mut self.channels {
            debug_assert!(
                len <= channel.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            if len > channel.len() {
                channel.resize(len, 0.0);
            } else {
                channel.truncate(len);
            }
        }
    }

    /// Get one channel's samples
    #[inline]
    pub fn channel(&self, ch: usize) -> &[Sample] {
        &self.channels[ch]
    }

    /// Get one channel's samples mutably
    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [Sample] {
        &mut self.channels[ch]
    }

    /// Fill one channel with silence
    pub fn clear_channel(&mut self, ch: usize) {
        self.channels[ch].fill(0.0);
    }

    /// Fill the whole buffer with silence
    pub fn fill_silence(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Scale the first `num_channels` channels by a factor
    pub fn scale_channels(&mut self, num_channels: usize, factor: Sample) {
        for channel in self.channels.iter_mut().take(num_channels) {
            for sample in channel.iter_mut() {
                *sample *= factor;
            }
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        self.scale_channels(self.num_channels(), factor);
    }

    /// Peak magnitude across the first `num_channels` channels
    pub fn magnitude_channels(&self, num_channels: usize) -> Sample {
        self.channels
            .iter()
            .take(num_channels)
            .flat_map(|c| c.iter())
            .fold(0.0, |peak, s| peak.max(s.abs()))
    }

    /// Peak magnitude across all channels
    pub fn magnitude(&self) -> Sample {
        self.magnitude_channels(self.num_channels())
    }

    /// Copy the first `num_channels` channels from another buffer
    ///
    /// The working length becomes `other.num_samples()`; real-time safe if
    /// this buffer was created with enough capacity.
    pub fn copy_from(&mut self, other: &AudioBuffer, num_channels: usize) {
        let len = other.num_samples();
        self.set_len_from_capacity(len);
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()).take(num_channels) {
            dst[..len].copy_from_slice(&src[..len]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversion() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
        assert!((gain_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_buffer_from_interleaved() {
        let interleaved = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buffer = AudioBuffer::from_interleaved(&interleaved, 2);

        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_samples(), 3);
        assert_eq!(buffer.channel(0), &[1.0, 3.0, 5.0]);
        assert_eq!(buffer.channel(1), &[2.0, 4.0, 6.0]);

        let mut output = [0.0; 6];
        buffer.to_interleaved(&mut output);
        assert_eq!(output, interleaved);
    }

    #[test]
    fn test_buffer_magnitude_and_scale() {
        let mut buffer = AudioBuffer::from_channels(&[&[0.25, -0.5], &[0.1, 0.2]]);
        assert_eq!(buffer.magnitude(), 0.5);
        assert_eq!(buffer.magnitude_channels(1), 0.5);

        buffer.scale_channels(1, 2.0);
        assert_eq!(buffer.channel(0), &[0.5, -1.0]);
        assert_eq!(buffer.channel(1), &[0.1, 0.2]);
    }

    #[test]
    fn test_set_len_within_capacity() {
        let mut buffer = AudioBuffer::silence(2, 8);
        buffer.channel_mut(0)[7] = 1.0;
        buffer.set_len_from_capacity(4);
        assert_eq!(buffer.num_samples(), 4);
        buffer.set_len_from_capacity(8);
        // Regrown tail is silent
        assert_eq!(buffer.channel(0)[7], 0.0);
    }
}
