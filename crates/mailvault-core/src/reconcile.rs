//! The reconciliation engine.
//!
//! For each incoming message the engine applies exactly one of, in order:
//!
//! 1. **skip**: a message already occupies the exact slot. Content that
//!    differs from the occupant is reported as a conflict and discarded.
//! 2. **relocate**: a message with the same fingerprint lives in the same
//!    file at another mtime; its provenance is moved to the new slot and its
//!    identifier is kept.
//! 3. **insert**: anything else is new.
//!
//! After a container has been fully reconciled at mtime `T`, the prune pass
//! deletes leftover copies still pointing at an older mtime of the same file
//! whose fingerprint was confirmed at `T`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  capability::{Fingerprinter, MessageParser, Reporter, TracingReporter},
  message::{
    Fingerprint, MessageId, NewMessage, Outcome, ParsedMessage, Provenance,
    ScanSummary, SourceKind,
  },
  store::ArchiveStore,
};

/// Drives an [`ArchiveStore`] through skip / relocate / insert decisions.
pub struct Reconciler<S> {
  store:         S,
  parser:        Arc<dyn MessageParser>,
  fingerprinter: Arc<dyn Fingerprinter>,
  reporter:      Arc<dyn Reporter>,
}

impl<S: ArchiveStore> Reconciler<S> {
  /// Build an engine that reports through `tracing`.
  pub fn new(
    store: S,
    parser: Arc<dyn MessageParser>,
    fingerprinter: Arc<dyn Fingerprinter>,
  ) -> Self {
    Self { store, parser, fingerprinter, reporter: Arc::new(TracingReporter) }
  }

  pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
    self.reporter = reporter;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Classification ────────────────────────────────────────────────────

  /// Reconcile one message against the archive.
  ///
  /// Without provenance (or with piped provenance) the message is always
  /// inserted.
  pub async fn reconcile(
    &self,
    raw: Vec<u8>,
    provenance: Option<Provenance>,
  ) -> Result<Outcome> {
    let parsed = self.parser.parse(&raw);
    let fingerprint = self.fingerprinter.fingerprint(&parsed, &raw);

    let Some(provenance) =
      provenance.filter(|p| p.kind != SourceKind::Piped)
    else {
      return self
        .insert(raw, Provenance::piped(), fingerprint, parsed)
        .await;
    };

    if let Some(slot) = self
      .store
      .find_exact_slot(&provenance)
      .await
      .map_err(Error::store)?
    {
      let existing = match slot.fingerprint {
        Some(fp) => fp,
        None => self.fingerprint_stored(slot.message_id).await?,
      };
      let conflict = existing != fingerprint;
      if conflict {
        self.reporter.conflict(&provenance, slot.message_id);
      }
      return Ok(Outcome::Skipped { message_id: slot.message_id, conflict });
    }

    if let Some(older) = self
      .store
      .find_older_match(
        provenance.kind,
        &provenance.file,
        provenance.mtime,
        &fingerprint,
      )
      .await
      .map_err(Error::store)?
    {
      let updated = self
        .store
        .update_provenance(older.message_id, provenance.key.clone(), provenance.mtime)
        .await
        .map_err(Error::store)?;

      if updated > 0 {
        tracing::debug!(
          message_id = %older.message_id,
          file = %provenance.file,
          from_key = ?older.key,
          to_key = ?provenance.key,
          "relocated",
        );
        return Ok(Outcome::Relocated { message_id: older.message_id });
      }
      self.reporter.relocate_race(older.message_id);
    }

    self.insert(raw, provenance, fingerprint, parsed).await
  }

  async fn insert(
    &self,
    raw: Vec<u8>,
    provenance: Provenance,
    fingerprint: Fingerprint,
    parsed: ParsedMessage,
  ) -> Result<Outcome> {
    let message_id = self
      .store
      .insert_message(NewMessage { raw, provenance, fingerprint, parsed })
      .await
      .map_err(Error::store)?;
    tracing::debug!(%message_id, "inserted");
    Ok(Outcome::Inserted { message_id })
  }

  /// Compute and persist the fingerprint of an archived message.
  async fn fingerprint_stored(&self, id: MessageId) -> Result<Fingerprint> {
    let raw = self
      .store
      .get_raw(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::MessageNotFound(id))?;
    let parsed = self.parser.parse(&raw);
    let fingerprint = self.fingerprinter.fingerprint(&parsed, &raw);
    self
      .store
      .set_fingerprint(id, fingerprint.clone())
      .await
      .map_err(Error::store)?;
    Ok(fingerprint)
  }

  // ── Prune pass ────────────────────────────────────────────────────────

  /// Remove stale duplicates left in `file` after a scan at `mtime`.
  ///
  /// Safe to re-run; a second pass finds nothing.
  pub async fn prune(
    &self,
    kind: SourceKind,
    file: &str,
    mtime: DateTime<Utc>,
  ) -> Result<u64> {
    let count = self
      .store
      .prune_stale(kind, file, mtime)
      .await
      .map_err(Error::store)?;
    if count > 0 {
      self.reporter.pruned(file, mtime, count);
    }
    Ok(count)
  }

  // ── Scan records ──────────────────────────────────────────────────────

  pub async fn has_been_scanned(
    &self,
    file: &str,
    mtime: DateTime<Utc>,
  ) -> Result<bool> {
    self.store.has_been_scanned(file, mtime).await.map_err(Error::store)
  }

  pub async fn record_scan(&self, file: &str, mtime: DateTime<Utc>) -> Result<()> {
    self.store.record_scan(file, mtime).await.map_err(Error::store)
  }

  /// Reconcile every `(key, raw)` item of one container, prune, and record
  /// the scan.
  ///
  /// Does not consult the scan record first; that is the caller's choice.
  /// A store failure stops the scan before it is recorded, so the file is
  /// picked up again next run.
  pub async fn scan_container<I>(
    &self,
    kind: SourceKind,
    file: &str,
    mtime: DateTime<Utc>,
    items: I,
  ) -> Result<ScanSummary>
  where
    I: IntoIterator<Item = (String, Vec<u8>)>,
  {
    let mut summary = ScanSummary {
      file: file.to_owned(),
      mtime: Some(mtime),
      ..Default::default()
    };

    for (key, raw) in items {
      let provenance = Provenance {
        kind,
        file: file.to_owned(),
        key: Some(key),
        mtime: Some(mtime),
      };
      let outcome = self.reconcile(raw, Some(provenance)).await?;
      summary.tally(&outcome);
    }

    summary.pruned = self.prune(kind, file, mtime).await?;
    self.record_scan(file, mtime).await?;

    tracing::info!(
      file,
      inserted = summary.inserted,
      relocated = summary.relocated,
      skipped = summary.skipped,
      conflicts = summary.conflicts,
      pruned = summary.pruned,
      "scanned container",
    );
    Ok(summary)
  }

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Compute fingerprints for every message that lacks one, `batch` at a
  /// time. Returns how many were filled in.
  pub async fn backfill_fingerprints(&self, batch: usize) -> Result<u64> {
    let batch = batch.max(1);
    let mut filled = 0;
    loop {
      let ids = self
        .store
        .messages_missing_fingerprint(batch)
        .await
        .map_err(Error::store)?;
      if ids.is_empty() {
        break;
      }
      for id in ids {
        match self.fingerprint_stored(id).await {
          Ok(_) => filled += 1,
          // Deleted underneath us; nothing left to fingerprint.
          Err(Error::MessageNotFound(_)) => {}
          Err(e) => return Err(e),
        }
      }
    }
    Ok(filled)
  }
}
