//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Container mtimes are stored as integer microseconds so the prune query can
//! compare them numerically. Every other timestamp is an RFC 3339 string.
//! UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use mailvault_core::message::{
  ArchivedMessage, Fingerprint, OlderMatch, Provenance, SourceKind,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Mtime ────────────────────────────────────────────────────────────────────

pub fn encode_mtime(dt: DateTime<Utc>) -> i64 { dt.timestamp_micros() }

pub fn decode_mtime(micros: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_micros(micros)
    .ok_or_else(|| Error::DateParse(format!("mtime out of range: {micros}")))
}

// ─── SourceKind ───────────────────────────────────────────────────────────────

pub fn encode_kind(k: SourceKind) -> &'static str { k.as_str() }

pub fn decode_kind(s: &str) -> Result<SourceKind> {
  match s {
    "mbox" => Ok(SourceKind::Mbox),
    "piped" => Ok(SourceKind::Piped),
    other => Err(Error::UnknownSourceKind(other.to_owned())),
  }
}

// ─── Fingerprint ──────────────────────────────────────────────────────────────

pub fn decode_fingerprint(s: String) -> Result<Fingerprint> {
  if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
    return Err(Error::InvalidFingerprint(s));
  }
  Ok(Fingerprint::new(s))
}

// ─── Row types ────────────────────────────────────────────────────────────────

/// Raw columns of a `provenance` row matched by fingerprint.
pub struct RawOlderMatch {
  pub message_id: String,
  pub item_key:   Option<String>,
  pub mtime:      Option<i64>,
}

impl RawOlderMatch {
  pub fn into_match(self) -> Result<OlderMatch> {
    Ok(OlderMatch {
      message_id: decode_uuid(&self.message_id)?,
      key:        self.item_key,
      mtime:      self.mtime.map(decode_mtime).transpose()?,
    })
  }
}

/// Raw columns of a `messages` row joined with its provenance and
/// fingerprint.
pub struct RawMessage {
  pub message_id:      String,
  pub raw:             Vec<u8>,
  pub envelope_sender: Option<String>,
  pub inserted_at:     String,
  pub kind:            String,
  pub file:            String,
  pub item_key:        Option<String>,
  pub mtime:           Option<i64>,
  pub fingerprint:     Option<String>,
}

impl RawMessage {
  pub fn into_message(self) -> Result<ArchivedMessage> {
    Ok(ArchivedMessage {
      message_id:      decode_uuid(&self.message_id)?,
      raw:             self.raw,
      envelope_sender: self.envelope_sender,
      inserted_at:     decode_dt(&self.inserted_at)?,
      provenance:      Provenance {
        kind:  decode_kind(&self.kind)?,
        file:  self.file,
        key:   self.item_key,
        mtime: self.mtime.map(decode_mtime).transpose()?,
      },
      fingerprint:     self.fingerprint.map(decode_fingerprint).transpose()?,
    })
  }
}
