mod render;

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use intent_tracker::{IntentTracker, SessionState, TrackerConfig, TrackerError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "intent-watch")]
#[command(about = "Follow the execution progress of one intent")]
struct Cli {
    /// Identifier of the intent to follow.
    intent_id: String,

    /// Base URL of the progress service; overrides INTENT_TRACKER_BASE_URL and `--config`.
    #[arg(long)]
    base_url: Option<String>,

    /// TOML tracker configuration (`base_url`, `stream_path`, reconnect and grace settings).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print every accepted event as one JSON object per line.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug)]
enum Outcome {
    Complete,
    Failed(String),
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Failed(message)) => {
            eprintln!("intent failed: {message}");
            ExitCode::from(1)
        }
        Ok(Outcome::Interrupted) => ExitCode::from(130),
        Err(err) => {
            eprintln!("intent-watch: {err}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<TrackerConfig, TrackerError> {
    let config = match &cli.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    }
    .with_env_overrides()?;
    match &cli.base_url {
        Some(url) => config.with_base_url(url),
        None => Ok(config),
    }
}

async fn run(cli: Cli) -> Result<Outcome, Error> {
    let config = load_config(&cli)?;
    let mut tracker = IntentTracker::from_config(&config)?;
    let mut updates = tracker.subscribe();
    tracker.start(&cli.intent_id, true)?;

    let mut printed = 0;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        let snapshot = updates.borrow_and_update().clone();
        for event in snapshot.events.iter().skip(printed) {
            if cli.json {
                println!("{}", serde_json::to_string(event)?);
            } else {
                println!("{}", render::human_line(event));
            }
        }
        printed = snapshot.events.len();

        if snapshot.is_complete() {
            return Ok(Outcome::Complete);
        }
        if snapshot.has_error() {
            let message = snapshot
                .error()
                .unwrap_or_else(|| "unknown error".to_string());
            return Ok(Outcome::Failed(message));
        }
        if snapshot.state == SessionState::Closed {
            return Ok(Outcome::Failed("progress session closed".to_string()));
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(Outcome::Failed("tracker stopped".to_string()));
                }
            }
            _ = &mut interrupt => {
                debug!(intent_id = %cli.intent_id, "interrupted");
                tracker.close();
                return Ok(Outcome::Interrupted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("intent-watch").chain(args.iter().copied()))
    }

    #[test]
    fn base_url_flag_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"http://from-file.test\"").unwrap();
        writeln!(file, "max_reconnect_attempts = 1").unwrap();
        let path = file.path().to_str().unwrap();

        let config = load_config(&cli(&["intent-1", "--config", path])).unwrap();
        assert_eq!(
            config.endpoint.stream_url("intent-1").unwrap().as_str(),
            "http://from-file.test/api/intents/intent-1/stream"
        );

        let config = load_config(&cli(&[
            "intent-1",
            "--config",
            path,
            "--base-url",
            "http://from-flag.test",
        ]))
        .unwrap();
        assert_eq!(
            config.endpoint.base_url.as_ref().map(|url| url.host_str()),
            Some(Some("from-flag.test"))
        );
        assert_eq!(config.policy.max_reconnect_attempts, 1);
    }

    #[test]
    fn missing_config_file_is_a_tracker_error() {
        let err = load_config(&cli(&["intent-1", "--config", "/nonexistent/tracker.toml"]))
            .unwrap_err();
        assert!(matches!(err, TrackerError::ConfigRead { .. }));
    }
}
