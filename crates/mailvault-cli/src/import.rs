//! The mbox import driver.
//!
//! Each file is read whole, split into messages, and handed to the engine as
//! one container scan. A file already scanned at its current mtime is
//! skipped unless a rescan is forced.

use std::{
  path::{Path, PathBuf},
  time::SystemTime,
};

use anyhow::Context as _;
use chrono::{DateTime, Timelike, Utc};
use mailvault_core::{
  message::{ScanSummary, SourceKind},
  reconcile::Reconciler,
  store::ArchiveStore,
};
use mailvault_mime::mbox;

/// Import every file, continuing past failures. Fails if any file failed.
pub async fn run<S: ArchiveStore>(
  engine: &Reconciler<S>,
  files: &[PathBuf],
  rescan: bool,
) -> anyhow::Result<()> {
  let mut failed = 0usize;

  for path in files {
    match import_file(engine, path, rescan).await {
      Ok(Some(summary)) => {
        if summary.conflicts > 0 {
          tracing::warn!(
            file = %summary.file,
            conflicts = summary.conflicts,
            "some messages conflicted with archived copies",
          );
        }
      }
      Ok(None) => tracing::info!(file = %path.display(), "unchanged since last scan"),
      Err(e) => {
        tracing::error!(file = %path.display(), error = %format!("{e:#}"), "import failed");
        failed += 1;
      }
    }
  }

  anyhow::ensure!(failed == 0, "{failed} of {} file(s) failed to import", files.len());
  Ok(())
}

/// Scan one mbox file. `None` when it was skipped as already scanned.
async fn import_file<S: ArchiveStore>(
  engine: &Reconciler<S>,
  path: &Path,
  rescan: bool,
) -> anyhow::Result<Option<ScanSummary>> {
  let path = tokio::fs::canonicalize(path)
    .await
    .with_context(|| format!("cannot resolve {}", path.display()))?;
  let file = path.to_string_lossy().into_owned();

  let modified = tokio::fs::metadata(&path)
    .await
    .with_context(|| format!("cannot stat {file}"))?
    .modified()
    .with_context(|| format!("no modification time for {file}"))?;
  let mtime = file_mtime(modified);

  if !rescan && engine.has_been_scanned(&file, mtime).await? {
    return Ok(None);
  }

  let data = tokio::fs::read(&path)
    .await
    .with_context(|| format!("cannot read {file}"))?;
  let items = mbox::split(&data).into_iter().map(|item| (item.key, item.raw));

  let summary = engine
    .scan_container(SourceKind::Mbox, &file, mtime, items)
    .await
    .with_context(|| format!("scan of {file} aborted"))?;
  Ok(Some(summary))
}

/// A filesystem timestamp truncated to the microsecond precision the
/// archive stores.
fn file_mtime(t: SystemTime) -> DateTime<Utc> {
  let dt = DateTime::<Utc>::from(t);
  let micros = dt.nanosecond() / 1_000 * 1_000;
  dt.with_nanosecond(micros).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use mailvault_core::capability::SilentReporter;
  use mailvault_mime::{ContentFingerprinter, MailParser};
  use mailvault_store_sqlite::SqliteStore;

  use super::*;

  const ONE: &str = "From a@example.com Mon Jan  1 00:00:00 2024\n\
                     Message-ID: <1@example.com>\n\
                     Subject: one\n\n\
                     first\n";
  const TWO: &str = "From b@example.com Mon Jan  1 00:00:01 2024\n\
                     Message-ID: <2@example.com>\n\
                     Subject: two\n\n\
                     second\n";

  async fn engine() -> Reconciler<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Reconciler::new(store, Arc::new(MailParser), Arc::new(ContentFingerprinter))
      .with_reporter(Arc::new(SilentReporter))
  }

  fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mailvault-import-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  fn write_mbox(path: &Path, parts: &[&str], modified: SystemTime) {
    std::fs::write(path, parts.join("\n")).unwrap();
    std::fs::File::options()
      .write(true)
      .open(path)
      .unwrap()
      .set_modified(modified)
      .unwrap();
  }

  #[tokio::test]
  async fn rewritten_mbox_is_reconciled_without_duplicates() {
    let dir = scratch_dir();
    let path = dir.join("inbox");

    let engine = engine().await;
    let files = vec![path.clone()];
    let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);

    write_mbox(&path, &[ONE, TWO], t0);
    run(&engine, &files, false).await.unwrap();
    assert_eq!(engine.store().counts().await.unwrap().messages, 2);

    // Unchanged: skipped via the scan record.
    run(&engine, &files, false).await.unwrap();
    assert_eq!(engine.store().counts().await.unwrap().scans, 1);

    // Rewritten in a different order.
    write_mbox(&path, &[TWO, ONE], t0 + Duration::from_secs(60));
    run(&engine, &files, false).await.unwrap();
    let counts = engine.store().counts().await.unwrap();
    assert_eq!(counts.messages, 2);
    assert_eq!(counts.scans, 2);

    std::fs::remove_dir_all(&dir).ok();
  }

  #[tokio::test]
  async fn missing_file_fails_the_run_but_not_the_rest() {
    let dir = scratch_dir();
    let good = dir.join("inbox");
    write_mbox(&good, &[ONE], SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

    let engine = engine().await;
    let files = vec![PathBuf::from("/nonexistent/mailvault/inbox"), good];
    assert!(run(&engine, &files, false).await.is_err());

    let counts = engine.store().counts().await.unwrap();
    assert_eq!(counts.messages, 1);
    assert_eq!(counts.scans, 1);

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn mtime_is_truncated_to_microseconds() {
    let t = SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
    let dt = file_mtime(t);
    assert_eq!(dt.timestamp(), 1_700_000_000);
    assert_eq!(dt.nanosecond(), 123_456_000);
  }

  #[test]
  fn whole_seconds_are_unchanged() {
    let t = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
    assert_eq!(file_mtime(t), DateTime::from_timestamp(100, 0).unwrap());
  }
}
