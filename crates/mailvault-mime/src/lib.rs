//! RFC 5322 message handling for mailvault.
//!
//! Supplies the two capabilities the reconciliation engine consumes, plus
//! the mbox container splitter used by the scan driver. Pure synchronous;
//! no database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use mailvault_core::capability::{Fingerprinter, MessageParser};
//! use mailvault_mime::{ContentFingerprinter, MailParser};
//!
//! let raw = b"Message-ID: <1@example.com>\r\nSubject: hi\r\n\r\nhello\r\n";
//! let parsed = MailParser.parse(raw);
//! let fp = ContentFingerprinter.fingerprint(&parsed, raw);
//! println!("{} headers, fingerprint {fp}", parsed.headers.len());
//! ```

mod fingerprint;
pub mod mbox;
mod parse;

pub use fingerprint::ContentFingerprinter;
pub use parse::MailParser;
