//! smt CLI - Command line interface for smt_store
//!
//! Speaks the JSON request/response protocol either one request per
//! invocation (`exec`) or as newline-delimited JSON on stdin/stdout
//! (`serve`). Logs go to stderr so stdout carries only responses.

use clap::{Parser, Subcommand};
use smt_store::{Config, Response, Service, SmtStore};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "smt")]
#[command(about = "A namespaced, versioned sparse merkle tree store")]
#[command(version)]
struct Cli {
    /// Path to the database file (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep everything in memory, ignoring any configured database
    #[arg(long)]
    memory: bool,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Do not flush the database file after every update
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new database file
    Init,

    /// Handle one JSON request per line from stdin
    Serve,

    /// Handle a single JSON request
    Exec {
        /// The request, e.g. '{"method":"get_root","namespace":"test"}'
        request: String,
    },

    /// Show the version records of a namespace
    Log {
        /// Namespace to inspect
        namespace: String,
        /// Maximum number of versions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List namespaces with committed versions
    Namespaces,

    /// Rewrite the database file without superseded index data
    Compact,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database.clone() {
        config.database = Some(database);
    }
    if cli.memory {
        config.database = None;
    }
    if cli.no_sync {
        config.sync_on_commit = false;
    }

    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Init => {
            let path = config
                .database
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("init needs --database or a configured database"))?;
            let store = SmtStore::create(path)?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created database at {}", path.display())
                }),
            )?;
        }

        Commands::Serve => {
            let service = Service::new(SmtStore::from_config(&config)?);
            info!(database = ?config.database, "serving requests on stdin");

            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                respond(cli.format, &service.handle_json(&line))?;
            }
            service.store().sync()?;
        }

        Commands::Exec { request } => {
            let service = Service::new(SmtStore::from_config(&config)?);
            let response = service.handle_json(&request);
            service.store().sync()?;
            respond(cli.format, &response)?;
            if !response.is_ok() {
                std::process::exit(1);
            }
        }

        Commands::Log { namespace, limit } => {
            let store = SmtStore::from_config(&config)?;
            let log = store.log(&namespace, limit)?;
            let versions: Vec<_> = log
                .iter()
                .map(|(id, version)| {
                    serde_json::json!({
                        "id": id,
                        "root": version.root,
                        "sequence": version.sequence,
                        "timestamp": version.timestamp,
                    })
                })
                .collect();
            output(
                cli.format,
                &serde_json::json!({ "status": "ok", "versions": versions }),
            )?;
        }

        Commands::Namespaces => {
            let store = SmtStore::from_config(&config)?;
            output(
                cli.format,
                &serde_json::json!({ "status": "ok", "namespaces": store.namespaces() }),
            )?;
        }

        Commands::Compact => {
            let store = SmtStore::from_config(&config)?;
            store.sync()?;
            store.compact()?;
            output(cli.format, &serde_json::json!({ "status": "ok" }))?;
        }
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn respond(format: OutputFormat, response: &Response) -> anyhow::Result<()> {
    output(format, &serde_json::to_value(response)?)
}

fn output(format: OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::Text => serde_json::to_string_pretty(value)?,
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text)?;
    stdout.flush()?;
    Ok(())
}
