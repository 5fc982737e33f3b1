//! `readmark`: inspect and update read state from the command line.
//!
//! # Usage
//!
//! ```text
//! readmark reader add
//! readmark mark read <reader-id> <item-id>
//! readmark mark-all read <reader-id> comment
//! readmark list unread <reader-id> comment --limit 20
//! ```
//!
//! Settings come from `readmark.toml` (or `--config`) and `READMARK_*`
//! environment variables. Results are printed to stdout as JSON; logs go to
//! stderr.

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use commands::Command;
use readmark_store_sqlite::SqliteStore;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "readmark", version, about = "Per-reader read state for any item type")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "readmark.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)?;
  let registry = settings.registry()?;
  let store_path = settings.store_path();

  let store = SqliteStore::open(&store_path, registry)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_batch_size(settings.batch_size);

  tracing::debug!(store = ?store_path, command = ?cli.command, "running");

  let output = cli.command.run(&store).await?;
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}
