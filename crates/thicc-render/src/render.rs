//! WAV I/O and block-wise rendering

use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thicc_core::config::EngineConfig;
use thicc_core::{gain_to_db, AudioBuffer, Engine};

/// Decoded WAV file, planar
pub struct WavAudio {
    pub sample_rate: u32,
    pub buffer: AudioBuffer,
}

/// Summary of a render run
#[derive(Debug, Clone, Copy)]
pub struct RenderReport {
    pub frames: usize,
    pub blocks: usize,
    /// Peak of the whole input file (linear)
    pub input_peak: f32,
    /// Peak of the whole output file (linear)
    pub output_peak: f32,
    /// Oversampling latency in samples
    pub latency_samples: f32,
}

impl RenderReport {
    pub fn log(&self) {
        log::info!(
            "Rendered {} frames in {} blocks: input peak {:.2} dBFS, output peak {:.2} dBFS, latency {:.2} samples",
            self.frames,
            self.blocks,
            gain_to_db(self.input_peak),
            gain_to_db(self.output_peak),
            self.latency_samples
        );
    }
}

/// Read a WAV file, converting integer PCM to [-1, 1] floats
pub fn read_wav(path: &Path) -> Result<WavAudio> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV file: {:?}", path))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("WAV file {:?} has no channels", path);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Failed to decode samples from {:?}", path))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Failed to decode samples from {:?}", path))?
        }
    };

    if interleaved.len() % channels != 0 {
        bail!("WAV file {:?} ends with a partial frame", path);
    }

    log::info!(
        "Read {:?}: {} channels, {} Hz, {} bit {:?}",
        path,
        channels,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    Ok(WavAudio {
        sample_rate: spec.sample_rate,
        buffer: AudioBuffer::from_interleaved(&interleaved, channels),
    })
}

/// Write a planar buffer as 32-bit float WAV
pub fn write_wav(path: &Path, sample_rate: u32, buffer: &AudioBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    let mut interleaved = vec![0.0; buffer.num_samples() * buffer.num_channels()];
    buffer.to_interleaved(&mut interleaved);
    for sample in interleaved {
        writer
            .write_sample(sample)
            .with_context(|| format!("Failed to write to {:?}", path))?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {:?}", path))?;

    log::info!("Wrote {:?}", path);
    Ok(())
}

/// Run `input` through a freshly prepared engine, block by block
///
/// The engine is prepared from `config`; its parameter values stay fixed
/// for the whole render.
pub fn render(input: &AudioBuffer, config: &EngineConfig) -> Result<(AudioBuffer, RenderReport)> {
    let spec = config.process_spec();
    let mut engine = Engine::with_spec(spec).context("Failed to prepare engine")?;

    let channels = spec.channels;
    let frames = input.num_samples();
    let mut output = AudioBuffer::silence(channels, frames);
    let mut block = AudioBuffer::silence(channels, spec.block_size);
    let mut blocks = 0;

    for start in (0..frames).step_by(spec.block_size) {
        let len = spec.block_size.min(frames - start);
        block.set_len_from_capacity(len);
        for ch in 0..channels {
            block
                .channel_mut(ch)
                .copy_from_slice(&input.channel(ch)[start..start + len]);
        }

        engine.process(&mut block, &config.params)?;

        for ch in 0..channels {
            output.channel_mut(ch)[start..start + len].copy_from_slice(block.channel(ch));
        }
        blocks += 1;
    }

    let report = RenderReport {
        frames,
        blocks,
        input_peak: input.magnitude(),
        output_peak: output.magnitude(),
        latency_samples: engine.latency_samples(),
    };
    Ok((output, report))
}
