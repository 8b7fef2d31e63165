use std::time::Duration;

use cartoon_core::config::parse_var_or;
use cartoon_core::{ConfigError, JobKind};

/// Default character-phase poll interval.
pub const DEFAULT_CHARACTER_POLL_MS: u64 = 1_500;
/// Default story-phase poll interval.
pub const DEFAULT_STORY_POLL_MS: u64 = 2_000;

/// Poll intervals per job kind.
///
/// Character jobs resolve faster than story jobs, so they are polled more
/// often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub character: Duration,
    pub story: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            character: Duration::from_millis(DEFAULT_CHARACTER_POLL_MS),
            story: Duration::from_millis(DEFAULT_STORY_POLL_MS),
        }
    }
}

impl PollIntervals {
    pub fn for_kind(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Character => self.character,
            JobKind::Story => self.story,
        }
    }

    /// Load intervals from environment variables.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `CARTOON_CHARACTER_POLL_MS` | `1500`  |
    /// | `CARTOON_STORY_POLL_MS`     | `2000`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let character = parse_var_or("CARTOON_CHARACTER_POLL_MS", DEFAULT_CHARACTER_POLL_MS)?;
        let story = parse_var_or("CARTOON_STORY_POLL_MS", DEFAULT_STORY_POLL_MS)?;

        for (var, value) in [
            ("CARTOON_CHARACTER_POLL_MS", character),
            ("CARTOON_STORY_POLL_MS", story),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    reason: "interval must be positive".to_string(),
                });
            }
        }

        Ok(Self {
            character: Duration::from_millis(character),
            story: Duration::from_millis(story),
        })
    }
}
