//! Message, provenance and fingerprint types.
//!
//! A message is immutable once archived. Its provenance (where it was last
//! seen) is the only thing that ever changes, and only by relocation.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier assigned by the store when a message is inserted.
pub type MessageId = Uuid;

// ─── Provenance ──────────────────────────────────────────────────────────────

/// The kind of container a message was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  /// A Unix mbox file; the item key is the message's ordinal in the file.
  Mbox,
  /// Supplied on stdin with no container context.
  Piped,
}

impl SourceKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Mbox => "mbox",
      Self::Piped => "piped",
    }
  }
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where and when a message was last observed.
///
/// `(kind, file, key, mtime)` together name a slot. At most one message
/// occupies a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
  pub kind:  SourceKind,
  pub file:  String,
  /// Position of the message within its container, if it has one.
  pub key:   Option<String>,
  /// Modification time of the container when the message was observed.
  pub mtime: Option<DateTime<Utc>>,
}

impl Provenance {
  pub fn mbox(
    file: impl Into<String>,
    key: impl Into<String>,
    mtime: DateTime<Utc>,
  ) -> Self {
    Self {
      kind:  SourceKind::Mbox,
      file:  file.into(),
      key:   Some(key.into()),
      mtime: Some(mtime),
    }
  }

  /// Provenance for a message read from stdin.
  ///
  /// Key and mtime are null, so piped messages never collide with each other
  /// under the slot uniqueness constraint.
  pub fn piped() -> Self {
    Self {
      kind:  SourceKind::Piped,
      file:  "-".to_owned(),
      key:   None,
      mtime: None,
    }
  }
}

// ─── Fingerprint ─────────────────────────────────────────────────────────────

/// A near-duplicate-resistant content identifier, as lowercase hex.
///
/// Messages with equal fingerprints are content duplicates by definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn new(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Parsed representation ───────────────────────────────────────────────────

/// A mailbox from an address-bearing header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub display_name: Option<String>,
  pub address:      String,
}

/// Structured data extracted from a raw message.
///
/// Produced by a [`MessageParser`](crate::capability::MessageParser). Every
/// field may be empty for malformed input; the raw bytes are what gets
/// archived regardless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
  /// All headers in message order, as (name, decoded value).
  pub headers:         Vec<(String, String)>,
  /// Parsed mailboxes keyed by lowercase header name.
  pub address_headers: BTreeMap<String, Vec<Address>>,
  /// Parsed dates keyed by lowercase header name. Unparseable values are
  /// absent rather than errors.
  pub date_headers:    BTreeMap<String, Vec<DateTime<Utc>>>,
  /// Sender from the mbox `From ` separator line.
  pub envelope_sender: Option<String>,
}

impl ParsedMessage {
  /// First value of the named header, compared case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Every value of the named header, in message order.
  pub fn header_values<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Iterator<Item = &'a str> + 'a {
    self
      .headers
      .iter()
      .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

// ─── Store rows ──────────────────────────────────────────────────────────────

/// Everything written by a single insertion.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub raw:         Vec<u8>,
  pub provenance:  Provenance,
  pub fingerprint: Fingerprint,
  pub parsed:      ParsedMessage,
}

/// The occupant of an exact provenance slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactSlot {
  pub message_id:  MessageId,
  /// Absent when the fingerprint has not been computed yet.
  pub fingerprint: Option<Fingerprint>,
}

/// A message with a matching fingerprint seen in the same file at another
/// modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlderMatch {
  pub message_id: MessageId,
  pub key:        Option<String>,
  pub mtime:      Option<DateTime<Utc>>,
}

/// An archived message with its provenance and fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedMessage {
  pub message_id:      MessageId,
  #[serde(skip)]
  pub raw:             Vec<u8>,
  pub envelope_sender: Option<String>,
  pub inserted_at:     DateTime<Utc>,
  pub provenance:      Provenance,
  pub fingerprint:     Option<Fingerprint>,
}

/// Row counts across the archive tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveCounts {
  pub messages:     u64,
  pub provenance:   u64,
  pub fingerprints: u64,
  pub headers:      u64,
  pub addresses:    u64,
  pub dates:        u64,
  pub scans:        u64,
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What [`Reconciler::reconcile`](crate::reconcile::Reconciler::reconcile)
/// did with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
  /// The slot was already occupied; nothing was written.
  ///
  /// `conflict` is set when the occupant's content differs from the incoming
  /// message. The occupant is never overwritten.
  Skipped { message_id: MessageId, conflict: bool },
  /// An existing message's provenance was moved to the incoming slot.
  Relocated { message_id: MessageId },
  /// The message was archived as new.
  Inserted { message_id: MessageId },
}

impl Outcome {
  pub fn message_id(&self) -> MessageId {
    match self {
      Self::Skipped { message_id, .. }
      | Self::Relocated { message_id }
      | Self::Inserted { message_id } => *message_id,
    }
  }
}

/// Tally of one container scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
  pub file:      String,
  pub mtime:     Option<DateTime<Utc>>,
  pub skipped:   u64,
  pub relocated: u64,
  pub inserted:  u64,
  pub conflicts: u64,
  pub pruned:    u64,
}

impl ScanSummary {
  pub(crate) fn tally(&mut self, outcome: &Outcome) {
    match outcome {
      Outcome::Skipped { conflict, .. } => {
        self.skipped += 1;
        if *conflict {
          self.conflicts += 1;
        }
      }
      Outcome::Relocated { .. } => self.relocated += 1,
      Outcome::Inserted { .. } => self.inserted += 1,
    }
  }
}
