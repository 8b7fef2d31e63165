use std::path::PathBuf;

use cartoon_client::ClientConfig;
use cartoon_core::ConfigError;
use cartoon_pipeline::PollIntervals;

/// Default directory for downloaded files.
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Everything the binary reads from the environment.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub client: ClientConfig,
    pub intervals: PollIntervals,
    /// Where `character_<id>.<ext>` and `cartoon_<id>.mp4` are written.
    pub output_dir: PathBuf,
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `CARTOON_OUTPUT_DIR` | `.`     |
    ///
    /// plus the variables read by [`ClientConfig::from_env`] and
    /// [`PollIntervals::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let output_dir = std::env::var("CARTOON_OUTPUT_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Ok(Self {
            client: ClientConfig::from_env()?,
            intervals: PollIntervals::from_env()?,
            output_dir: PathBuf::from(output_dir),
        })
    }
}
