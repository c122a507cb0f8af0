//! Configuration system for Cadence.
//!
//! One explicit `Config` object is built at process start and passed by
//! reference into the dispatcher and every agent. Nothing looks it up globally.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{AgentConfig, Config, SchedulerConfig};

mod global;

/// Load configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. .cadence.yml in current directory (project config)
/// 3. ~/.config/cadence/cadence.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<Config> {
    Config::load(explicit_path)
}
