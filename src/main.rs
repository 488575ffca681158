use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use couchdb_sync::error::format_error;
use couchdb_sync::{
    Config, CouchService, DesignOutcome, DesignPath, DesignSet, HttpConnector, InitReport,
};

/// Verify configured CouchDB databases and keep their design documents in sync.
///
/// Reads the `couchdb` connection tree from the configuration file, checks
/// (and optionally creates) every database, and pushes local design documents
/// found under `<designs_dir>/<connection>/<database>/<design>.json`.
#[derive(Parser)]
#[command(name = "couchdb-sync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify CouchDB databases and synchronize design documents", long_about = None)]
struct Cli {
    /// Configuration file (defaults to <config dir>/couchdb-sync/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Design document directory (overrides designs_dir from the config)
    #[arg(long, global = true)]
    designs: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize all connections and report failures (default)
    Verify,
    /// Push design documents, given as <connection>.<database>.<design>;
    /// all known designs when none are given
    UpdateDesigns { paths: Vec<String> },
    /// List the registered <connection>:<database> names
    List,
}

fn print_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a DesignOutcome>) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(status) => println!("{}: {}", outcome.path, status),
            Err(e) => {
                failed += 1;
                println!("{}: error: {}", outcome.path, format_error(e));
            }
        }
    }
    failed
}

fn print_report(report: &InitReport) {
    for db in &report.databases {
        match &db.result {
            Ok(_) => println!("{}: ok", db.name),
            Err(e) => println!("{}: error: {}", db.name, format_error(e)),
        }
    }
    for e in &report.connection_errors {
        println!("error: {}", format_error(e));
    }
    print_outcomes(report.design_outcomes());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "couchdb_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::info!(
        "Configured connections: {}",
        config.couchdb.connections.len()
    );

    let designs_dir = match cli.designs {
        Some(dir) => dir,
        None => config.designs_dir()?,
    };
    let designs = DesignSet::load_dir(&designs_dir)?;
    tracing::info!(
        "Loaded {} design documents from {:?}",
        designs.len(),
        designs_dir
    );

    // Parse paths before touching the network
    let paths = match &cli.command {
        Some(Command::UpdateDesigns { paths }) if !paths.is_empty() => Some(
            paths
                .iter()
                .map(|p| p.parse::<DesignPath>())
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => None,
    };

    let service = CouchService::new(config.couchdb, designs, Arc::new(HttpConnector));
    let report = service.init().await;

    match cli.command.unwrap_or(Command::Verify) {
        Command::Verify => {
            print_report(&report);
            if !report.is_ok() {
                bail!("{} initialization error(s)", report.errors().len());
            }
        }
        Command::List => {
            for name in service.get_database_names() {
                println!("{name}");
            }
        }
        Command::UpdateDesigns { .. } => {
            for e in report.errors() {
                tracing::warn!("{}", format_error(e));
            }
            let outcomes = service.update_designs(paths.as_deref()).await;
            let failed = print_outcomes(&outcomes);
            if failed > 0 {
                bail!("{} of {} design update(s) failed", failed, outcomes.len());
            }
        }
    }

    Ok(())
}
