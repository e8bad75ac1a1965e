//! THICC offline renderer
//!
//! Runs a WAV file through the engine block by block, the way a host
//! callback would, and writes the result as 32-bit float WAV.
//!
//! ```text
//! thicc-render <input.wav> <output.wav> [--config file.yaml] [--block-size N] [--oversample 1..5]
//! ```
//!
//! `--oversample` takes the factor choice as shown to users (1 = off,
//! 2 = 2x, ... 5 = 16x). Set `RUST_LOG=debug` for gate transitions.

mod render;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use thicc_core::config::{read_config, EngineConfig};
use thicc_core::params::ParamId;

const USAGE: &str = "usage: thicc-render <input.wav> <output.wav> [--config file.yaml] [--block-size N] [--oversample 1..5]";

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    block_size: Option<usize>,
    /// Oversampling choice (1..=5)
    oversample: Option<usize>,
}

impl Args {
    fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut positional = Vec::new();
        let mut config = None;
        let mut block_size = None;
        let mut oversample = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = Some(PathBuf::from(flag_value(&mut args, "--config")?));
                }
                "--block-size" => {
                    let value = flag_value(&mut args, "--block-size")?;
                    block_size = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid block size: {}", value))?,
                    );
                }
                "--oversample" => {
                    let value = flag_value(&mut args, "--oversample")?;
                    let choice: usize = value
                        .parse()
                        .with_context(|| format!("Invalid oversampling choice: {}", value))?;
                    let info = ParamId::OversampleFactor.info();
                    if !(info.min as usize..=info.max as usize).contains(&choice) {
                        bail!(
                            "Oversampling choice must be {}..={}, got {}",
                            info.min,
                            info.max,
                            choice
                        );
                    }
                    oversample = Some(choice);
                }
                flag if flag.starts_with("--") => bail!("Unknown flag: {}\n{}", flag, USAGE),
                _ => positional.push(PathBuf::from(arg)),
            }
        }

        let [input, output]: [PathBuf; 2] = positional
            .try_into()
            .map_err(|_| anyhow::anyhow!("Expected an input and an output file\n{}", USAGE))?;

        Ok(Self {
            input,
            output,
            config,
            block_size,
            oversample,
        })
    }

    /// Config file values with command line overrides applied
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => EngineConfig::default(),
        };
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(choice) = self.oversample {
            config.params.oversample_factor_index = choice - 1;
        }
        Ok(config)
    }
}

fn flag_value<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .with_context(|| format!("{} needs a value\n{}", flag, USAGE))
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let mut config = args.engine_config()?;

    let audio = render::read_wav(&args.input)?;
    config.sample_rate = audio.sample_rate as f64;
    config.channels = audio.buffer.num_channels();

    let (output, report) = render::render(&audio.buffer, &config)?;
    report.log();

    render::write_wav(&args.output, audio.sample_rate, &output)?;
    Ok(())
}
