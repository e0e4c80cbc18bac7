//! Replays a JSON intent script against a session and prints the result.
//!
//! Run with: cargo run --bin court_queue -- script.json
//!
//! The script is a JSON array of intents, e.g.
//! `[{"start_session":{"court_count":2,"player_count":8}}, "add_player", "undo"]`.
//! Set COURT_QUEUE_STATE to keep the session in a snapshot file between runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Duration, Utc};
use clap::Parser;
use court_queue_state::{Intent, JsonFilePersistence, Persistence, Session, SessionConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON array of intents to apply in order
    script: PathBuf,

    /// Session config (JSON); missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Snapshot file to restore from and save to
    #[arg(long, env = "COURT_QUEUE_STATE")]
    state_file: Option<PathBuf>,

    /// Pretty-print the final state
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid script {}: {source}", .path.display())]
    Script {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(cli: &Cli) -> Result<SessionConfig, CliError> {
    match &cli.config {
        Some(path) => SessionConfig::from_json_str(&read(path)?).map_err(|source| CliError::Config {
            path: path.clone(),
            source,
        }),
        None => Ok(SessionConfig::default()),
    }
}

fn load_script(cli: &Cli) -> Result<Vec<Intent>, CliError> {
    serde_json::from_str(&read(&cli.script)?).map_err(|source| CliError::Script {
        path: cli.script.clone(),
        source,
    })
}

fn replay<P: Persistence>(mut session: Session<P>, script: Vec<Intent>, pretty: bool) -> Result<(), CliError> {
    let total = script.len();
    let mut rejected = 0;
    for (index, intent) in script.into_iter().enumerate() {
        let name = intent.name();
        if let Err(e) = session.dispatch(intent) {
            rejected += 1;
            log::warn!("#{} {} rejected ({}): {}", index, name, e.kind(), e);
        }
    }

    // resolve pending settle timers so the printed queue is final
    let delay = session.config().settle_delay();
    session.tick_at(Utc::now() + delay + Duration::milliseconds(1));

    log::info!("Applied {} of {} intents", total - rejected, total);

    let state = session.state();
    let json = if pretty {
        serde_json::to_string_pretty(state)
    } else {
        serde_json::to_string(state)
    }?;
    println!("{}", json);
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    let script = load_script(&cli)?;

    match &cli.state_file {
        Some(path) => {
            log::info!("Using snapshot file {}", path.display());
            let persistence = JsonFilePersistence::new(path, config.snapshot_max_age());
            replay(Session::restore(config, persistence), script, cli.pretty)
        }
        None => replay(Session::new(config), script, cli.pretty),
    }
}

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
