//! `mailvault`: archive mbox files and piped messages without duplicates.
//!
//! # Usage
//!
//! ```
//! mailvault import ~/Mail/inbox ~/Mail/sent
//! formail -s mailvault pipe < message.eml
//! mailvault --config ~/.config/mailvault.toml stats
//! ```

mod import;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use mailvault_core::{reconcile::Reconciler, store::ArchiveStore};
use mailvault_mime::{ContentFingerprinter, MailParser};
use mailvault_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::io::AsyncReadExt as _;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Deduplicating email archive")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "mailvault.toml")]
  config: PathBuf,

  /// Archive database, overriding `store_path` from the config.
  #[arg(long, env = "MAILVAULT_STORE", value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Reconcile every message of the given mbox files into the archive.
  Import {
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Process files even when already scanned at their current mtime.
    #[arg(long)]
    rescan: bool,
  },
  /// Archive one message read from stdin.
  Pipe,
  /// Compute fingerprints for messages archived without one.
  Backfill,
  /// Print row counts as JSON.
  Stats,
  /// Print one archived message's metadata and headers as JSON.
  Show { id: Uuid },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Settings read from the config file and `MAILVAULT_*` variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ArchiveConfig {
  store_path:     PathBuf,
  rescan:         bool,
  backfill_batch: usize,
}

impl Default for ArchiveConfig {
  fn default() -> Self {
    Self {
      store_path:     PathBuf::from("mailvault.db"),
      rescan:         false,
      backfill_batch: 500,
    }
  }
}

fn load_config(path: PathBuf) -> anyhow::Result<ArchiveConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("MAILVAULT"))
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise ArchiveConfig")
}

// ─── Entry point ──────────────────────────────────────────────────────────────

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
  let cfg = load_config(cli.config)?;

  let store_path = expand_tilde(cli.store.as_deref().unwrap_or(&cfg.store_path));
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let engine = Reconciler::new(store, Arc::new(MailParser), Arc::new(ContentFingerprinter));

  match cli.command {
    Command::Import { files, rescan } => {
      import::run(&engine, &files, rescan || cfg.rescan).await
    }
    Command::Pipe => pipe(&engine).await,
    Command::Backfill => {
      let filled = engine
        .backfill_fingerprints(cfg.backfill_batch)
        .await
        .context("fingerprint backfill failed")?;
      tracing::info!(filled, "backfill complete");
      Ok(())
    }
    Command::Stats => {
      let counts = engine.store().counts().await.context("failed to count rows")?;
      println!("{}", serde_json::to_string_pretty(&counts)?);
      Ok(())
    }
    Command::Show { id } => show(&engine, id).await,
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn pipe(engine: &Reconciler<SqliteStore>) -> anyhow::Result<()> {
  let mut raw = Vec::new();
  tokio::io::stdin()
    .read_to_end(&mut raw)
    .await
    .context("failed to read message from stdin")?;
  anyhow::ensure!(!raw.is_empty(), "no message on stdin");

  let outcome = engine
    .reconcile(raw, None)
    .await
    .context("failed to archive piped message")?;
  println!("{}", outcome.message_id());
  Ok(())
}

async fn show(engine: &Reconciler<SqliteStore>, id: Uuid) -> anyhow::Result<()> {
  let store = engine.store();
  let message = store
    .get_message(id)
    .await
    .with_context(|| format!("failed to load message {id}"))?
    .with_context(|| format!("no message {id}"))?;
  let headers = store.get_headers(id).await?;
  let addresses = store.get_addresses(id).await?;

  let doc = serde_json::json!({
    "message":   message,
    "size":      message.raw.len(),
    "headers":   headers,
    "addresses": addresses,
  });
  println!("{}", serde_json::to_string_pretty(&doc)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn expand_tilde_leaves_plain_paths() {
    assert_eq!(expand_tilde(Path::new("/var/mail")), PathBuf::from("/var/mail"));
    assert_eq!(expand_tilde(Path::new("mail/~/x")), PathBuf::from("mail/~/x"));
  }

  #[test]
  fn expand_tilde_uses_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/Mail/inbox")),
      PathBuf::from(home).join("Mail/inbox"),
    );
  }

  #[test]
  fn missing_config_file_is_not_an_error() {
    assert!(load_config(PathBuf::from("/nonexistent/mailvault.toml")).is_ok());
    let cfg = ArchiveConfig::default();
    assert_eq!(cfg.store_path, PathBuf::from("mailvault.db"));
    assert_eq!(cfg.backfill_batch, 500);
    assert!(!cfg.rescan);
  }

  #[test]
  fn import_requires_files() {
    assert!(Cli::try_parse_from(["mailvault", "import"]).is_err());
    let cli = Cli::try_parse_from(["mailvault", "import", "--rescan", "a", "b"]).unwrap();
    let Command::Import { files, rescan } = cli.command else { panic!("not import") };
    assert_eq!(files.len(), 2);
    assert!(rescan);
  }
}
