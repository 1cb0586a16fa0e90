//! Collaborators the reconciliation engine consumes.
//!
//! Parsing and fingerprinting are infallible by contract: malformed input
//! yields partial data or a fallback fingerprint, never an error. Reporting
//! is injected so the engine carries no ambient state.

use chrono::{DateTime, Utc};

use crate::message::{Fingerprint, MessageId, ParsedMessage, Provenance};

/// Extracts structured header data from raw message bytes.
pub trait MessageParser: Send + Sync {
  fn parse(&self, raw: &[u8]) -> ParsedMessage;
}

/// Maps message content to a [`Fingerprint`].
///
/// Implementations must mix strong identifying headers into the result and
/// fall back to an exact hash of `raw` when content analysis fails.
pub trait Fingerprinter: Send + Sync {
  fn fingerprint(&self, parsed: &ParsedMessage, raw: &[u8]) -> Fingerprint;
}

/// Receives non-fatal events from the engine.
pub trait Reporter: Send + Sync {
  /// An occupied slot holds different content than the incoming message.
  /// The incoming message was discarded.
  fn conflict(&self, _provenance: &Provenance, _existing: MessageId) {}

  /// A relocation target vanished between lookup and update.
  fn relocate_race(&self, _message_id: MessageId) {}

  /// The prune pass removed `count` stale duplicates.
  fn pruned(&self, _file: &str, _mtime: DateTime<Utc>, _count: u64) {}
}

/// A [`Reporter`] that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// A [`Reporter`] that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
  fn conflict(&self, provenance: &Provenance, existing: MessageId) {
    tracing::warn!(
      file = %provenance.file,
      key = ?provenance.key,
      mtime = ?provenance.mtime,
      %existing,
      "slot already holds a different message; incoming copy discarded",
    );
  }

  fn relocate_race(&self, message_id: MessageId) {
    tracing::debug!(%message_id, "relocation target vanished; inserting instead");
  }

  fn pruned(&self, file: &str, mtime: DateTime<Utc>, count: u64) {
    tracing::info!(file, %mtime, count, "pruned stale duplicates");
  }
}
