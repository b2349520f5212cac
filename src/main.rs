//! # Aetherium CLI
//!
//! Validate automata definitions and run them locally, optionally recording
//! the run to a session archive for later replay.

use aetherium::archive::SessionArchive;
use aetherium::config::{EngineConfig, Mode};
use aetherium::engine::{Fleet, GuardActionHost, LiteralHost};
use aetherium::model::{Automata, DefinitionError};
use aetherium::runtime::{LoopbackGateway, Station};
use aetherium::snapshot::ExecutionSnapshot;
use aetherium::timetravel::TimeTravel;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Detached,
    Network,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Detached => Mode::Detached,
            ModeArg::Network => Mode::Network,
        }
    }
}

#[derive(Parser)]
#[command(name = "aetherium", version)]
#[command(about = "Run and validate networked automata", long_about = None)]
struct Cli {
    /// Validate an automata definition (JSON, or YAML by .yaml/.yml extension) and exit
    #[arg(long, value_name = "FILE", conflicts_with = "run")]
    validate: Option<PathBuf>,

    /// Run an automata definition (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    run: Option<PathBuf>,

    /// Number of cycles to run
    #[arg(long, default_value_t = 10)]
    ticks: u64,

    /// Engine mode, defaults to the config file's or detached
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Engine configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write a session archive of the run (.json for JSON, otherwise binary)
    #[arg(long, value_name = "PATH", requires = "run")]
    record: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = match &cli.config {
        Some(path) if !path.exists() => {
            println!("File not found: {}", path.display());
            return Ok(ExitCode::FAILURE);
        }
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }

    if let Some(path) = &cli.validate {
        return Ok(validate(path));
    }
    if let Some(path) = &cli.run {
        let Some(automata) = load(path) else {
            return Ok(ExitCode::FAILURE);
        };
        let automata = Arc::new(automata);
        let host: Arc<dyn GuardActionHost> = Arc::new(LiteralHost);
        let (latest, archive) = match config.mode {
            Mode::Detached => run_detached(&config, automata, host.as_ref(), &cli),
            Mode::Network => run_network(&config, automata, host, &cli).await,
        }?;

        println!("{}", serde_json::to_string_pretty(&*latest)?);
        if let (Some(path), Some(archive)) = (&cli.record, archive) {
            archive
                .write_to(path)
                .with_context(|| format!("writing archive {}", path.display()))?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    Cli::command().print_help()?;
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Load a definition, printing the problem for the user on failure.
fn load(path: &Path) -> Option<Automata> {
    match Automata::from_path(path) {
        Ok(automata) => Some(automata),
        Err(err @ DefinitionError::NotFound(_)) => {
            println!("{err}");
            None
        }
        Err(err) => {
            eprintln!("error: {err}");
            None
        }
    }
}

fn validate(path: &Path) -> ExitCode {
    match load(path) {
        Some(automata) => {
            println!(
                "{} is valid: {} states, {} transitions",
                automata.id(),
                automata.states().count(),
                automata.transitions().count()
            );
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}

type RunResult = Result<(Arc<ExecutionSnapshot>, Option<SessionArchive>)>;

fn run_detached(
    config: &EngineConfig,
    automata: Arc<Automata>,
    host: &dyn GuardActionHost,
    cli: &Cli,
) -> RunResult {
    let mut fleet = Fleet::new();
    fleet.add_device(config.device_id.clone());
    let key = fleet.deploy(&config.device_id, automata)?;
    fleet.start(&key)?;

    let mut time_travel = TimeTravel::new();
    let session = match cli.record {
        Some(_) => Some(time_travel.start_recording(config.recording_options())?),
        None => None,
    };

    for _ in 0..cli.ticks {
        fleet.tick(host);
        if let Some(id) = session {
            time_travel.capture(id, fleet.take_frame())?;
        }
    }

    let latest = fleet
        .instance(&key)
        .map(|instance| instance.latest())
        .context("instance disappeared during run")?;
    let archive = match session {
        Some(id) => {
            time_travel.stop_recording(id)?;
            Some(time_travel.export(id)?)
        }
        None => None,
    };
    Ok((latest, archive))
}

async fn run_network(
    config: &EngineConfig,
    automata: Arc<Automata>,
    host: Arc<dyn GuardActionHost>,
    cli: &Cli,
) -> RunResult {
    let gateway = Arc::new(LoopbackGateway::new());
    let mut station = Station::new(host, gateway, config.tick_interval());
    let key = station.spawn(&config.device_id, automata).await?;

    let session = match cli.record {
        Some(_) => Some(station.start_recording(config.recording_options()).await?),
        None => None,
    };

    let run_for = config.tick_interval().saturating_mul(u32::try_from(cli.ticks).unwrap_or(u32::MAX));
    tokio::time::sleep(run_for).await;

    let latest = station
        .latest(&key)
        .await
        .context("instance disappeared during run")?;
    let archive = match session {
        Some(id) => {
            station.stop_recording(id).await?;
            Some(station.time_travel().await.export(id)?)
        }
        None => None,
    };
    station.shutdown().await;
    Ok((latest, archive))
}
