//! The `ArchiveStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `mailvault-store-sqlite`). The reconciliation engine depends on this
//! abstraction, not on any concrete backend.
//!
//! Every mutating method is one all-or-nothing transaction: a message row is
//! never observable without its provenance and fingerprint rows.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::message::{
  Address, ArchiveCounts, ArchivedMessage, ExactSlot, Fingerprint, MessageId,
  NewMessage, OlderMatch, Provenance, SourceKind,
};

/// Abstraction over an archive store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes. The design assumes a single writer per
/// store.
pub trait ArchiveStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reconciliation lookups ────────────────────────────────────────────

  /// The message occupying exactly this `(kind, file, key, mtime)` slot.
  /// Null key or mtime matches null.
  fn find_exact_slot<'a>(
    &'a self,
    provenance: &'a Provenance,
  ) -> impl Future<Output = Result<Option<ExactSlot>, Self::Error>> + Send + 'a;

  /// Any message in `file` whose mtime differs from `exclude_mtime` (a null
  /// mtime counts as different) and whose fingerprint is `fingerprint`.
  ///
  /// When several qualify, whichever the backend returns first wins.
  fn find_older_match<'a>(
    &'a self,
    kind: SourceKind,
    file: &'a str,
    exclude_mtime: Option<DateTime<Utc>>,
    fingerprint: &'a Fingerprint,
  ) -> impl Future<Output = Result<Option<OlderMatch>, Self::Error>> + Send + 'a;

  // ── Fingerprints ──────────────────────────────────────────────────────

  fn get_fingerprint(
    &self,
    id: MessageId,
  ) -> impl Future<Output = Result<Option<Fingerprint>, Self::Error>> + Send + '_;

  /// Insert or replace the fingerprint for `id`.
  fn set_fingerprint(
    &self,
    id: MessageId,
    fingerprint: Fingerprint,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Up to `limit` messages that have no fingerprint row.
  fn messages_missing_fingerprint(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<MessageId>, Self::Error>> + Send + '_;

  // ── Messages ──────────────────────────────────────────────────────────

  /// Archive a new message with its provenance, fingerprint and parsed
  /// header data in one transaction. The store assigns the identifier.
  fn insert_message(
    &self,
    message: NewMessage,
  ) -> impl Future<Output = Result<MessageId, Self::Error>> + Send + '_;

  /// Overwrite the key and mtime of `id`'s provenance in place.
  ///
  /// Returns the number of rows affected; zero means the row vanished.
  fn update_provenance(
    &self,
    id: MessageId,
    key: Option<String>,
    mtime: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Delete a message together with everything that references it.
  fn delete_message(
    &self,
    id: MessageId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Delete every message in `file` that still carries an mtime older than
  /// `mtime` (or none) while another message with the same fingerprint was
  /// confirmed in `file` at `mtime`. Returns the number deleted.
  fn prune_stale<'a>(
    &'a self,
    kind: SourceKind,
    file: &'a str,
    mtime: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Scan records ──────────────────────────────────────────────────────

  fn has_been_scanned<'a>(
    &'a self,
    file: &'a str,
    mtime: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Mark `(file, mtime)` as fully processed. Recording an existing pair
  /// again is not an error.
  fn record_scan<'a>(
    &'a self,
    file: &'a str,
    mtime: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_raw(
    &self,
    id: MessageId,
  ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send + '_;

  fn get_message(
    &self,
    id: MessageId,
  ) -> impl Future<Output = Result<Option<ArchivedMessage>, Self::Error>> + Send + '_;

  /// Stored headers in message order.
  fn get_headers(
    &self,
    id: MessageId,
  ) -> impl Future<Output = Result<Vec<(String, String)>, Self::Error>> + Send + '_;

  /// Stored mailboxes as (lowercase header name, address) in message order.
  fn get_addresses(
    &self,
    id: MessageId,
  ) -> impl Future<Output = Result<Vec<(String, Address)>, Self::Error>> + Send + '_;

  fn counts(
    &self,
  ) -> impl Future<Output = Result<ArchiveCounts, Self::Error>> + Send + '_;
}
