//! Content fingerprints.
//!
//! The content fingerprint is a SHA-256 over the identifying headers, a few
//! semantic headers with whitespace collapsed, and every leaf MIME part's
//! type and transfer-decoded body with line endings and trailing whitespace
//! normalised. Re-encoding a message (CRLF vs LF, quoted-printable vs base64,
//! added `Received` or `Status` headers, an mbox separator line) leaves it
//! unchanged.
//!
//! If the MIME tree cannot be walked the fingerprint falls back to a SHA-256
//! of the raw bytes. The two are domain-separated so they never collide.
//! The fallback is logged with `tracing` directly: the engine sees only the
//! resulting fingerprint, so it never reaches the engine's `Reporter`.

use mailparse::{MailParseError, ParsedMail, parse_mail};
use mailvault_core::{
  capability::Fingerprinter,
  message::{Fingerprint, ParsedMessage},
};
use sha2::{Digest, Sha256};

use crate::parse::split_envelope;

const CONTENT_DOMAIN: &[u8] = b"mailvault/fingerprint/content/v1\0";
const RAW_DOMAIN: &[u8] = b"mailvault/fingerprint/raw/v1\0";

/// Mixed in even when absent, so two otherwise identical messages that
/// differ only here never share a fingerprint.
const IDENTIFYING_HEADERS: &[&str] = &["message-id", "resent-message-id"];

const CONTENT_HEADERS: &[&str] = &["from", "to", "cc", "subject", "date"];

const FIELD_END: u8 = 0x1e;
const PART_END: u8 = 0x1d;

/// [`Fingerprinter`] hashing normalised MIME content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFingerprinter;

impl Fingerprinter for ContentFingerprinter {
  fn fingerprint(&self, parsed: &ParsedMessage, raw: &[u8]) -> Fingerprint {
    match content_digest(parsed, raw) {
      Ok(hex) => Fingerprint::new(hex),
      Err(e) => {
        tracing::warn!(
          error = %e,
          "content fingerprint failed; using exact hash of raw bytes",
        );
        Fingerprint::new(raw_digest(raw))
      }
    }
  }
}

fn content_digest(
  parsed: &ParsedMessage,
  raw: &[u8],
) -> Result<String, MailParseError> {
  let (_, rest) = split_envelope(raw);
  let mail = parse_mail(rest)?;

  let mut hasher = Sha256::new();
  hasher.update(CONTENT_DOMAIN);
  for name in IDENTIFYING_HEADERS.iter().chain(CONTENT_HEADERS) {
    hasher.update(name.as_bytes());
    hasher.update([0]);
    for value in parsed.header_values(name) {
      hasher.update(collapse_whitespace(value).as_bytes());
      hasher.update([0]);
    }
    hasher.update([FIELD_END]);
  }
  hash_parts(&mut hasher, &mail)?;

  Ok(hex::encode(hasher.finalize()))
}

fn hash_parts(hasher: &mut Sha256, part: &ParsedMail<'_>) -> Result<(), MailParseError> {
  if part.subparts.is_empty() {
    hasher.update(part.ctype.mimetype.to_ascii_lowercase().as_bytes());
    hasher.update([0]);
    hasher.update(normalize_body(&part.get_body_raw()?));
    hasher.update([PART_END]);
    return Ok(());
  }
  for sub in &part.subparts {
    hash_parts(hasher, sub)?;
  }
  Ok(())
}

fn raw_digest(raw: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(RAW_DOMAIN);
  hasher.update(raw);
  hex::encode(hasher.finalize())
}

fn collapse_whitespace(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `\n` line endings, no trailing whitespace on any line, no trailing blank
/// lines.
fn normalize_body(body: &[u8]) -> Vec<u8> {
  let mut lines: Vec<&[u8]> = body
    .split(|&b| b == b'\n')
    .map(|line| line.trim_ascii_end())
    .collect();
  while lines.last().is_some_and(|l| l.is_empty()) {
    lines.pop();
  }
  lines.join(&b'\n')
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use mailvault_core::capability::MessageParser;

  use super::*;
  use crate::MailParser;

  fn fp(raw: &str) -> Fingerprint {
    let raw = raw.as_bytes();
    ContentFingerprinter.fingerprint(&MailParser.parse(raw), raw)
  }

  const BASE: &str = "Message-ID: <1@example.com>\r\n\
                      From: alice@example.com\r\n\
                      Subject: hello\r\n\
                      \r\n\
                      hello world\r\n";

  #[test]
  fn fingerprint_is_sha256_hex() {
    let f = fp(BASE);
    assert_eq!(f.as_str().len(), 64);
    assert!(f.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
  }

  #[test]
  fn line_endings_do_not_matter() {
    assert_eq!(fp(BASE), fp(&BASE.replace("\r\n", "\n")));
  }

  #[test]
  fn transport_headers_do_not_matter() {
    let with_transport = format!("Received: by mx.example.com\r\nStatus: RO\r\n{BASE}");
    assert_eq!(fp(BASE), fp(&with_transport));
  }

  #[test]
  fn mbox_separator_does_not_matter() {
    let with_sep = format!(
      "From alice@example.com Thu Jan  1 00:00:00 2004\n{}",
      BASE.replace("\r\n", "\n"),
    );
    assert_eq!(fp(BASE), fp(&with_sep));
  }

  #[test]
  fn trailing_whitespace_does_not_matter() {
    let padded = BASE.replace("hello world\r\n", "hello world  \r\n\r\n\r\n");
    assert_eq!(fp(BASE), fp(&padded));
  }

  #[test]
  fn transfer_encoding_does_not_matter() {
    let qp = "Message-ID: <2@example.com>\r\n\
              Content-Type: text/plain\r\n\
              Content-Transfer-Encoding: quoted-printable\r\n\
              \r\n\
              hello world\r\n";
    let b64 = "Message-ID: <2@example.com>\r\n\
               Content-Type: text/plain\r\n\
               Content-Transfer-Encoding: base64\r\n\
               \r\n\
               aGVsbG8gd29ybGQK\r\n";
    assert_eq!(fp(qp), fp(b64));
  }

  #[test]
  fn message_id_distinguishes_identical_content() {
    let other = BASE.replace("<1@example.com>", "<2@example.com>");
    assert_ne!(fp(BASE), fp(&other));
  }

  #[test]
  fn body_change_changes_fingerprint() {
    let other = BASE.replace("hello world", "goodbye world");
    assert_ne!(fp(BASE), fp(&other));
  }

  #[test]
  fn subject_change_changes_fingerprint() {
    let other = BASE.replace("Subject: hello", "Subject: hi");
    assert_ne!(fp(BASE), fp(&other));
  }

  #[test]
  fn raw_digest_is_domain_separated() {
    let content = fp(BASE);
    assert_ne!(content.as_str(), raw_digest(BASE.as_bytes()));
    assert_eq!(raw_digest(b"x"), raw_digest(b"x"));
    assert_ne!(raw_digest(b"x"), raw_digest(b"y"));
  }

  #[test]
  fn garbage_still_fingerprints_deterministically() {
    let junk = b"\xff\xfe\x00not a message";
    let a = ContentFingerprinter.fingerprint(&MailParser.parse(junk), junk);
    let b = ContentFingerprinter.fingerprint(&MailParser.parse(junk), junk);
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
  }

  #[test]
  fn normalize_body_strips_trailing_noise() {
    assert_eq!(normalize_body(b"a \r\nb\t\r\n\r\n\n"), b"a\nb".to_vec());
    assert_eq!(normalize_body(b""), Vec::<u8>::new());
  }
}
