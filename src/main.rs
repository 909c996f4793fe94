mod cache;
mod commands;
mod config;
mod reference;
mod shell;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::reference::client::ReferenceClient;
use crate::reference::source::SqliteSource;

#[derive(Parser, Debug)]
#[command(name = "joysense")]
#[command(about = "Cached reference-data shell for JoySense sensor networks")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/joysense/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Reference database path, overrides the config file
  #[arg(short, long)]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Interactive shell (default)
  Shell,
  /// Run one query, optionally repeated to show cache hits
  Query {
    table: String,
    #[arg(short, long)]
    limit: Option<u64>,
    /// Equality filter as column=value, may be repeated
    #[arg(short, long = "filter")]
    filters: Vec<String>,
    #[arg(short, long, default_value_t = 1)]
    repeat: u32,
    /// Cache this query for N seconds instead of the configured TTL
    #[arg(long, value_name = "SECS")]
    ttl: Option<u64>,
  },
  /// Create the schema and insert sample data
  Seed,
}

/// Log to a file in the data directory so output never mixes with the shell.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = config::data_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, "joysense.log"));

  let env_filter = EnvFilter::try_from_env("JOYSENSE_LOG")
    .unwrap_or_else(|_| EnvFilter::new("joysense=info"));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .init();

  Ok(guard)
}

fn ttl_from_secs(secs: u64) -> Result<chrono::Duration> {
  if secs == 0 {
    return Err(eyre!("--ttl must be at least 1 second"));
  }
  i64::try_from(secs)
    .ok()
    .and_then(chrono::Duration::try_seconds)
    .ok_or_else(|| eyre!("--ttl is too large: {}", secs))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Command line beats JOYSENSE_DATABASE and the config file
  let database = match args.database {
    Some(path) => path,
    None => config.database_path()?,
  };

  let source = SqliteSource::open(&database)?;
  let client = ReferenceClient::new(source, config.cache.cache_config());

  match args.command.unwrap_or(Cmd::Shell) {
    Cmd::Shell => shell::run(client).await?,
    Cmd::Query {
      table,
      limit,
      filters,
      repeat,
      ttl,
    } => {
      let mut key = commands::parse_query(&table, filters.as_slice())?;
      if let Some(limit) = limit {
        key = key.with_limit(limit);
      }
      let ttl = ttl.map(ttl_from_secs).transpose()?;

      for _ in 0..repeat.max(1) {
        let result = match ttl {
          Some(ttl) => client.rows_with_ttl(&key, ttl).await?,
          None => client.rows(&key).await?,
        };
        println!(
          "{}",
          json!({ "source": result.source, "count": result.rows.len(), "rows": result.rows })
        );
      }
      println!("{}", serde_json::to_string(&client.stats())?);
    }
    Cmd::Seed => {
      if client.seed()? {
        println!("seeded reference data");
      } else {
        println!("reference data already present");
      }
    }
  }

  Ok(())
}
