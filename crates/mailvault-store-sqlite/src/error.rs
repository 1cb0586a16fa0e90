//! Error type for `mailvault-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown source kind: {0:?}")]
  UnknownSourceKind(String),

  #[error("invalid fingerprint: {0:?}")]
  InvalidFingerprint(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
