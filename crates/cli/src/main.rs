//! `cartoon` -- terminal client for the story-to-cartoon job service.
//!
//! Submits a character and/or story job, polls it to completion while
//! printing the production stages, then saves the character image and
//! the finished video.
//!
//! # Environment variables
//!
//! | Variable                       | Required | Default | Description                         |
//! |--------------------------------|----------|---------|-------------------------------------|
//! | `CARTOON_API_URL`              | yes      | --      | Job service base URL                |
//! | `CARTOON_REQUEST_TIMEOUT_SECS` | no       | `30`    | Per-request timeout                 |
//! | `CARTOON_CHARACTER_POLL_MS`    | no       | `1500`  | Character poll interval             |
//! | `CARTOON_STORY_POLL_MS`        | no       | `2000`  | Story poll interval                 |
//! | `CARTOON_OUTPUT_DIR`           | no       | `.`     | Where images and videos are written |

use cartoon_cli::args::{invocation, Command, Invocation, USAGE};
use cartoon_cli::config::CliConfig;
use cartoon_cli::runner::{Outcome, Runner};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cartoon_cli=info,cartoon_pipeline=info,cartoon_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = match invocation(std::env::args().skip(1)) {
        Invocation::Execute(command) => command,
        Invocation::ShowUsage => {
            println!("{USAGE}");
            return;
        }
        Invocation::Reject { code, message } => {
            eprintln!("error: {message}\n\n{USAGE}");
            std::process::exit(code);
        }
    };

    let config = CliConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        api_url = %config.client.base_url,
        output_dir = %config.output_dir.display(),
        "Starting cartoon",
    );

    let code = match run(&config, command).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "cartoon failed");
            1
        }
    };
    std::process::exit(code);
}

async fn run(config: &CliConfig, command: Command) -> anyhow::Result<Outcome> {
    let mut runner = Runner::new(config)?;

    let shutdown = runner.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    runner.check_health().await?;
    runner.execute(command).await
}
