//! Pyrun CLI - screened, time-boxed Python snippets
//!
//! Usage:
//!   pyrun submit [FILE]  - Screen and store a snippet, print its id
//!   pyrun check <ID>     - Compile-only check
//!   pyrun run <ID>       - Execute a stored snippet
//!   pyrun exec [FILE]    - Submit, check and run in one go
//!   pyrun sweep          - Reclaim stale units until interrupted

mod render;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pyrun_core::{Pipeline, PipelineError, PyrunConfig};
use render::Outcome;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pyrun")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Screened, time-boxed execution of Python snippets", long_about = None)]
struct Cli {
    /// Storage root for submitted units
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Python interpreter to run
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Per-run deadline in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen and store a snippet (reads stdin without FILE)
    Submit { file: Option<PathBuf> },

    /// Check a stored snippet compiles
    Check { id: String },

    /// Run a stored snippet
    Run { id: String },

    /// Submit, check and run a snippet, then discard it
    Exec { file: Option<PathBuf> },

    /// Remove a stored snippet now
    Discard { id: String },

    /// List stored snippets
    List,

    /// Reclaim units older than the retention window, once
    Reclaim,

    /// Keep reclaiming stale units until Ctrl-C
    Sweep {
        /// Seconds between sweeps
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging; stdout belongs to snippet output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = PyrunConfig::load().context("loading configuration")?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(python) = cli.python {
        config.interpreter = python;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if let Commands::Sweep {
        interval: Some(interval),
    } = cli.command
    {
        config.sweep_interval_secs = interval;
    }

    let pipeline = Pipeline::new(config)?;
    tracing::debug!(
        root = %pipeline.config().root.display(),
        interpreter = %pipeline.config().interpreter.display(),
        "pipeline ready"
    );

    let outcome = match cli.command {
        Commands::Submit { file } => {
            let source = read_source(file.as_ref())?;
            pipeline
                .submit(&source)
                .map(|unit| Outcome::Submitted { id: unit.id() })
                .unwrap_or_else(Outcome::from)
        }

        Commands::Check { id } => match pipeline.open(&id) {
            Ok(unit) => Outcome::Checked(pipeline.check_syntax(&unit).await),
            Err(e) => e.into(),
        },

        Commands::Run { id } => match pipeline.open(&id) {
            Ok(unit) => pipeline.run(&unit).await.map(Outcome::Ran).unwrap_or_else(Outcome::from),
            Err(e) => e.into(),
        },

        Commands::Exec { file } => {
            let source = read_source(file.as_ref())?;
            pipeline
                .evaluate(&source)
                .await
                .map(Outcome::Ran)
                .unwrap_or_else(Outcome::from)
        }

        Commands::Discard { id } => discard(&pipeline, &id).unwrap_or_else(Outcome::from),

        Commands::List => pipeline
            .list()
            .map(|units| Outcome::Listed { units })
            .unwrap_or_else(Outcome::from),

        Commands::Reclaim => Outcome::Reclaimed(pipeline.reclaim(chrono::Utc::now())),

        Commands::Sweep { .. } => {
            let sweeper = pipeline.spawn_sweeper();
            eprintln!(
                "Sweeping {} every {}s (Ctrl-C to stop)",
                pipeline.config().root.display(),
                pipeline.config().sweep_interval_secs
            );
            tokio::signal::ctrl_c().await?;
            sweeper.shutdown().await;
            return Ok(ExitCode::SUCCESS);
        }
    };

    if cli.json {
        outcome.write_json(&mut std::io::stdout().lock())?;
    } else {
        outcome.write_text(&mut std::io::stdout().lock(), &mut std::io::stderr().lock())?;
    }
    Ok(outcome.exit_code())
}

fn discard(pipeline: &Pipeline, id: &str) -> Result<Outcome, PipelineError> {
    let unit = pipeline.open(id)?;
    pipeline.discard(&unit.id())?;
    Ok(Outcome::Discarded { id: unit.id() })
}

fn read_source(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("reading stdin")?;
            Ok(source)
        }
    }
}
