//! [`SqliteStore`]: the SQLite implementation of [`ArchiveStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use mailvault_core::{
  message::{
    Address, ArchiveCounts, ArchivedMessage, ExactSlot, Fingerprint, MessageId,
    NewMessage, OlderMatch, Provenance, SourceKind,
  },
  store::ArchiveStore,
};

use crate::{
  Result,
  encode::{
    RawMessage, RawOlderMatch, decode_fingerprint, decode_uuid, encode_dt,
    encode_kind, encode_mtime, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A mail archive backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All clones
/// share one writer.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Drop a fingerprint row, leaving the message as archives written before
  /// fingerprinting existed look.
  #[cfg(test)]
  pub(crate) async fn forget_fingerprint(&self, id: MessageId) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM fingerprints WHERE message_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ArchiveStore impl ───────────────────────────────────────────────────────

impl ArchiveStore for SqliteStore {
  type Error = crate::Error;

  // ── Reconciliation lookups ────────────────────────────────────────────────

  async fn find_exact_slot(
    &self,
    provenance: &Provenance,
  ) -> Result<Option<ExactSlot>> {
    let kind  = encode_kind(provenance.kind);
    let file  = provenance.file.clone();
    let key   = provenance.key.clone();
    let mtime = provenance.mtime.map(encode_mtime);

    let raw: Option<(String, Option<String>)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT p.message_id, f.fingerprint
               FROM provenance p
               LEFT JOIN fingerprints f ON f.message_id = p.message_id
               WHERE p.kind = ?1
                 AND p.file = ?2
                 AND p.item_key IS ?3
                 AND p.mtime IS ?4
               LIMIT 1",
              rusqlite::params![kind, file, key, mtime],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(id, fp)| {
        Ok(ExactSlot {
          message_id:  decode_uuid(&id)?,
          fingerprint: fp.map(decode_fingerprint).transpose()?,
        })
      })
      .transpose()
  }

  async fn find_older_match(
    &self,
    kind: SourceKind,
    file: &str,
    exclude_mtime: Option<DateTime<Utc>>,
    fingerprint: &Fingerprint,
  ) -> Result<Option<OlderMatch>> {
    let kind  = encode_kind(kind);
    let file  = file.to_owned();
    let mtime = exclude_mtime.map(encode_mtime);
    let fp    = fingerprint.as_str().to_owned();

    let raw: Option<RawOlderMatch> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT p.message_id, p.item_key, p.mtime
               FROM provenance p
               JOIN fingerprints f ON f.message_id = p.message_id
               WHERE p.kind = ?1
                 AND p.file = ?2
                 AND p.mtime IS NOT ?3
                 AND f.fingerprint = ?4
               LIMIT 1",
              rusqlite::params![kind, file, mtime, fp],
              |row| {
                Ok(RawOlderMatch {
                  message_id: row.get(0)?,
                  item_key:   row.get(1)?,
                  mtime:      row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawOlderMatch::into_match).transpose()
  }

  // ── Fingerprints ──────────────────────────────────────────────────────────

  async fn get_fingerprint(&self, id: MessageId) -> Result<Option<Fingerprint>> {
    let id_str = encode_uuid(id);

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT fingerprint FROM fingerprints WHERE message_id = ?1",
              rusqlite::params![id_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(decode_fingerprint).transpose()
  }

  async fn set_fingerprint(
    &self,
    id: MessageId,
    fingerprint: Fingerprint,
  ) -> Result<()> {
    let id_str = encode_uuid(id);
    let fp     = fingerprint.into_inner();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO fingerprints (message_id, fingerprint) VALUES (?1, ?2)
           ON CONFLICT (message_id) DO UPDATE SET fingerprint = excluded.fingerprint",
          rusqlite::params![id_str, fp],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn messages_missing_fingerprint(
    &self,
    limit: usize,
  ) -> Result<Vec<MessageId>> {
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT m.message_id
           FROM messages m
           LEFT JOIN fingerprints f ON f.message_id = m.message_id
           WHERE f.message_id IS NULL
           ORDER BY m.inserted_at
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn insert_message(&self, message: NewMessage) -> Result<MessageId> {
    let message_id = Uuid::new_v4();

    let id_str          = encode_uuid(message_id);
    let inserted_at     = encode_dt(Utc::now());
    let raw             = message.raw;
    let envelope_sender = message.parsed.envelope_sender;
    let kind            = encode_kind(message.provenance.kind);
    let file            = message.provenance.file;
    let key             = message.provenance.key;
    let mtime           = message.provenance.mtime.map(encode_mtime);
    let fp              = message.fingerprint.into_inner();
    let headers         = message.parsed.headers;
    let addresses: Vec<(String, Option<String>, String)> = message
      .parsed
      .address_headers
      .into_iter()
      .flat_map(|(name, addrs)| {
        addrs
          .into_iter()
          .map(move |a| (name.clone(), a.display_name, a.address))
      })
      .collect();
    let dates: Vec<(String, String)> = message
      .parsed
      .date_headers
      .into_iter()
      .flat_map(|(name, dts)| {
        dts.into_iter().map(move |dt| (name.clone(), encode_dt(dt)))
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(
          "INSERT INTO messages (message_id, raw, envelope_sender, inserted_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, raw, envelope_sender, inserted_at],
        )?;
        tx.execute(
          "INSERT INTO provenance (message_id, kind, file, item_key, mtime)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, kind, file, key, mtime],
        )?;
        tx.execute(
          "INSERT INTO fingerprints (message_id, fingerprint) VALUES (?1, ?2)",
          rusqlite::params![id_str, fp],
        )?;

        {
          let mut stmt = tx.prepare(
            "INSERT INTO message_headers (message_id, header_index, name, value)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (i, (name, value)) in headers.iter().enumerate() {
            stmt.execute(rusqlite::params![id_str, i as i64, name, value])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO message_addresses
               (message_id, address_index, header_name, display_name, address)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for (i, (name, display, address)) in addresses.iter().enumerate() {
            stmt.execute(rusqlite::params![id_str, i as i64, name, display, address])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO message_dates (message_id, date_index, header_name, value)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (i, (name, value)) in dates.iter().enumerate() {
            stmt.execute(rusqlite::params![id_str, i as i64, name, value])?;
          }
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(message_id)
  }

  async fn update_provenance(
    &self,
    id: MessageId,
    key: Option<String>,
    mtime: Option<DateTime<Utc>>,
  ) -> Result<u64> {
    let id_str = encode_uuid(id);
    let mtime  = mtime.map(encode_mtime);

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE provenance SET item_key = ?2, mtime = ?3 WHERE message_id = ?1",
          rusqlite::params![id_str, key, mtime],
        )?)
      })
      .await?;

    Ok(affected as u64)
  }

  async fn delete_message(&self, id: MessageId) -> Result<u64> {
    let id_str = encode_uuid(id);

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM messages WHERE message_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(affected as u64)
  }

  async fn prune_stale(
    &self,
    kind: SourceKind,
    file: &str,
    mtime: DateTime<Utc>,
  ) -> Result<u64> {
    let kind  = encode_kind(kind);
    let file  = file.to_owned();
    let mtime = encode_mtime(mtime);

    // A stale copy still points at an older (or no) mtime of this file while
    // a message with its fingerprint was confirmed here at `mtime`.
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let n = tx.execute(
          "DELETE FROM messages WHERE message_id IN (
             SELECT p.message_id
             FROM provenance p
             JOIN fingerprints f ON f.message_id = p.message_id
             WHERE p.kind = ?1
               AND p.file = ?2
               AND (p.mtime IS NULL OR p.mtime < ?3)
               AND EXISTS (
                 SELECT 1
                 FROM provenance fresh
                 JOIN fingerprints ff ON ff.message_id = fresh.message_id
                 WHERE fresh.kind = ?1
                   AND fresh.file = ?2
                   AND fresh.mtime = ?3
                   AND ff.fingerprint = f.fingerprint
                   AND fresh.message_id != p.message_id
               )
           )",
          rusqlite::params![kind, file, mtime],
        )?;
        tx.commit()?;
        Ok(n)
      })
      .await?;

    Ok(deleted as u64)
  }

  // ── Scan records ──────────────────────────────────────────────────────────

  async fn has_been_scanned(&self, file: &str, mtime: DateTime<Utc>) -> Result<bool> {
    let file  = file.to_owned();
    let mtime = encode_mtime(mtime);

    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM scans WHERE file = ?1 AND mtime = ?2",
              rusqlite::params![file, mtime],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(found)
  }

  async fn record_scan(&self, file: &str, mtime: DateTime<Utc>) -> Result<()> {
    let file   = file.to_owned();
    let mtime  = encode_mtime(mtime);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO scans (file, mtime, scanned_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![file, mtime, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_raw(&self, id: MessageId) -> Result<Option<Vec<u8>>> {
    let id_str = encode_uuid(id);

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT raw FROM messages WHERE message_id = ?1",
              rusqlite::params![id_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw)
  }

  async fn get_message(&self, id: MessageId) -> Result<Option<ArchivedMessage>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT m.message_id, m.raw, m.envelope_sender, m.inserted_at,
                      p.kind, p.file, p.item_key, p.mtime,
                      f.fingerprint
               FROM messages m
               JOIN provenance p        ON p.message_id = m.message_id
               LEFT JOIN fingerprints f ON f.message_id = m.message_id
               WHERE m.message_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawMessage {
                  message_id:      row.get(0)?,
                  raw:             row.get(1)?,
                  envelope_sender: row.get(2)?,
                  inserted_at:     row.get(3)?,
                  kind:            row.get(4)?,
                  file:            row.get(5)?,
                  item_key:        row.get(6)?,
                  mtime:           row.get(7)?,
                  fingerprint:     row.get(8)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMessage::into_message).transpose()
  }

  async fn get_headers(&self, id: MessageId) -> Result<Vec<(String, String)>> {
    let id_str = encode_uuid(id);

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT name, value FROM message_headers
           WHERE message_id = ?1
           ORDER BY header_index",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn get_addresses(&self, id: MessageId) -> Result<Vec<(String, Address)>> {
    let id_str = encode_uuid(id);

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT header_name, display_name, address FROM message_addresses
           WHERE message_id = ?1
           ORDER BY address_index",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok((
              row.get(0)?,
              Address { display_name: row.get(1)?, address: row.get(2)? },
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn counts(&self) -> Result<ArchiveCounts> {
    let raw: [i64; 7] = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT count(*) FROM messages),
             (SELECT count(*) FROM provenance),
             (SELECT count(*) FROM fingerprints),
             (SELECT count(*) FROM message_headers),
             (SELECT count(*) FROM message_addresses),
             (SELECT count(*) FROM message_dates),
             (SELECT count(*) FROM scans)",
          [],
          |row| {
            Ok([
              row.get(0)?,
              row.get(1)?,
              row.get(2)?,
              row.get(3)?,
              row.get(4)?,
              row.get(5)?,
              row.get(6)?,
            ])
          },
        )?)
      })
      .await?;

    let [messages, provenance, fingerprints, headers, addresses, dates, scans] =
      raw.map(|n| n as u64);
    Ok(ArchiveCounts {
      messages,
      provenance,
      fingerprints,
      headers,
      addresses,
      dates,
      scans,
    })
  }
}
