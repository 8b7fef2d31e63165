//! Command-line argument parsing.

use std::path::PathBuf;

use cartoon_core::JobId;

pub const USAGE: &str = "\
Usage:
  cartoon character <prompt...>
  cartoon story [--character <job_id>] <story...|@file>
  cartoon run <prompt...> -- <story...|@file>

Environment:
  CARTOON_API_URL               job service base URL (required)
  CARTOON_REQUEST_TIMEOUT_SECS  per-request timeout (default 30)
  CARTOON_CHARACTER_POLL_MS     character poll interval (default 1500)
  CARTOON_STORY_POLL_MS         story poll interval (default 2000)
  CARTOON_OUTPUT_DIR            where files are written (default .)";

/// Exit code for bad arguments (`EX_USAGE`).
pub const EXIT_USAGE: i32 = 64;

/// What the binary should do with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Execute(Command),
    /// Print [`USAGE`] and exit successfully.
    ShowUsage,
    /// Print `message` and [`USAGE`] to stderr, then exit with `code`.
    Reject { code: i32, message: String },
}

/// Decide between running a command, printing usage and rejecting the
/// arguments.
pub fn invocation<I, S>(args: I) -> Invocation
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    match parse_args(args) {
        Ok(Command::Help) => Invocation::ShowUsage,
        Ok(command) => Invocation::Execute(command),
        Err(e) => Invocation::Reject {
            code: EXIT_USAGE,
            message: e.to_string(),
        },
    }
}

/// Story text given inline or as `@path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryInput {
    Text(String),
    File(PathBuf),
}

impl StoryInput {
    fn from_words(words: &[String]) -> Result<Self, UsageError> {
        match words {
            [] => Err(UsageError::MissingStory),
            [single] if single.len() > 1 && single.starts_with('@') => {
                Ok(Self::File(PathBuf::from(&single[1..])))
            }
            _ => Ok(Self::Text(words.join(" "))),
        }
    }

    pub async fn load(&self) -> std::io::Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::File(path) => tokio::fs::read_to_string(path).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate a character only.
    Character { prompt: String },
    /// Generate a story, optionally linked to an existing character job.
    Story {
        character: Option<JobId>,
        story: StoryInput,
    },
    /// Character first, then the story using it.
    Run { prompt: String, story: StoryInput },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("missing command")]
    MissingCommand,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("missing character prompt")]
    MissingPrompt,
    #[error("missing story text")]
    MissingStory,
    #[error("{0} requires a value")]
    MissingValue(&'static str),
    #[error("`run` needs `--` between the prompt and the story")]
    MissingSeparator,
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I, S>(args: I) -> Result<Command, UsageError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let Some((command, rest)) = args.split_first() else {
        return Err(UsageError::MissingCommand);
    };

    match command.as_str() {
        "character" => Ok(Command::Character {
            prompt: prompt_from(rest)?,
        }),
        "story" => {
            let (character, rest) = match rest {
                [flag, id, rest @ ..] if flag == "--character" => {
                    (Some(JobId::new(id.as_str())), rest)
                }
                [flag] if flag == "--character" => {
                    return Err(UsageError::MissingValue("--character"))
                }
                _ => (None, rest),
            };
            Ok(Command::Story {
                character,
                story: StoryInput::from_words(rest)?,
            })
        }
        "run" => {
            let split = rest
                .iter()
                .position(|a| a == "--")
                .ok_or(UsageError::MissingSeparator)?;
            Ok(Command::Run {
                prompt: prompt_from(&rest[..split])?,
                story: StoryInput::from_words(&rest[split + 1..])?,
            })
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => Err(UsageError::UnknownCommand(other.to_string())),
    }
}

fn prompt_from(words: &[String]) -> Result<String, UsageError> {
    let prompt = words.join(" ");
    if prompt.trim().is_empty() {
        return Err(UsageError::MissingPrompt);
    }
    Ok(prompt)
}
