//! Header extraction.
//!
//! Pipeline:
//!   raw &[u8]
//!     └─ split_envelope()   → envelope sender + header/body bytes
//!          └─ parse_headers()  → Vec<MailHeader>
//!               └─ per header: decoded value, addresses, dates
//!
//! Nothing here fails. A header block mailparse rejects yields an empty
//! result; individual address or date values that do not parse are dropped.

use chrono::DateTime;
use mailparse::{MailAddr, MailHeader, addrparse_header, dateparse, parse_headers};
use mailvault_core::{
  capability::MessageParser,
  message::{Address, ParsedMessage},
};

/// Headers whose values are mailbox lists.
const ADDRESS_HEADERS: &[&str] = &[
  "from",
  "sender",
  "reply-to",
  "to",
  "cc",
  "bcc",
  "resent-from",
  "resent-sender",
  "resent-to",
  "resent-cc",
  "resent-bcc",
];

/// Headers whose values are RFC 5322 dates.
const DATE_HEADERS: &[&str] = &["date", "resent-date"];

/// [`MessageParser`] backed by `mailparse`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailParser;

impl MessageParser for MailParser {
  fn parse(&self, raw: &[u8]) -> ParsedMessage {
    let (envelope_sender, rest) = split_envelope(raw);
    let mut parsed = ParsedMessage { envelope_sender, ..Default::default() };

    let headers = match parse_headers(rest) {
      Ok((headers, _)) => headers,
      Err(e) => {
        tracing::debug!(error = %e, "unparseable header block");
        return parsed;
      }
    };

    for header in &headers {
      let name = header.get_key();
      let lower = name.to_ascii_lowercase();
      let value = header.get_value();

      if ADDRESS_HEADERS.contains(&lower.as_str()) {
        let addrs = addresses(header);
        if !addrs.is_empty() {
          parsed.address_headers.entry(lower.clone()).or_default().extend(addrs);
        }
      }

      if DATE_HEADERS.contains(&lower.as_str())
        && let Ok(secs) = dateparse(&value)
        && let Some(dt) = DateTime::from_timestamp(secs, 0)
      {
        parsed.date_headers.entry(lower).or_default().push(dt);
      }

      parsed.headers.push((name, value));
    }

    parsed
  }
}

/// Split a leading mbox `From ` separator line off `raw`.
///
/// Returns the envelope sender (first token after `From `) and the remaining
/// bytes. Input without a separator is returned unchanged.
pub(crate) fn split_envelope(raw: &[u8]) -> (Option<String>, &[u8]) {
  if !raw.starts_with(b"From ") {
    return (None, raw);
  }
  let end = raw
    .iter()
    .position(|&b| b == b'\n')
    .map_or(raw.len(), |i| i + 1);
  let line = String::from_utf8_lossy(&raw[5..end]);
  let sender = line.split_whitespace().next().map(str::to_owned);
  (sender, &raw[end..])
}

/// Flatten a mailbox-list header into single addresses; groups contribute
/// their members.
fn addresses(header: &MailHeader<'_>) -> Vec<Address> {
  let Ok(list) = addrparse_header(header) else {
    return Vec::new();
  };
  let mut out = Vec::new();
  for addr in list.iter() {
    match addr {
      MailAddr::Single(info) => out.push(Address {
        display_name: info.display_name.clone(),
        address:      info.addr.clone(),
      }),
      MailAddr::Group(group) => {
        out.extend(group.addrs.iter().map(|info| Address {
          display_name: info.display_name.clone(),
          address:      info.addr.clone(),
        }))
      }
    }
  }
  out
}

// ─── Tests ───────────────────────────────────────────────────────────────────
