//! Render/run configuration
//!
//! - Generic YAML loading and saving for any serde config type
//! - [`EngineConfig`]: processing layout plus the parameter values a run
//!   starts with
//!
//! ```ignore
//! use thicc_core::config::{load_config, save_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&path);
//! let mut engine = Engine::with_spec(config.process_spec())?;
//! save_config(&config, &path)?;
//! ```

mod engine;
mod io;

pub use engine::EngineConfig;
pub use io::{load_config, read_config, save_config};
