//! Unix mbox splitting.
//!
//! A message starts at a line beginning `From ` that is either the first
//! line of the file or follows a blank line. The separator line stays with
//! its message so the envelope sender survives archiving. The blank line
//! that precedes the next separator does not.

/// One message within an mbox file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MboxItem {
  /// Zero-based ordinal within the file, in decimal.
  pub key: String,
  pub raw: Vec<u8>,
}

/// Split `data` into its messages. Anything before the first separator is
/// ignored.
pub fn split(data: &[u8]) -> Vec<MboxItem> {
  let mut starts = Vec::new();
  let mut offset = 0;
  let mut prev_blank = true;

  for line in data.split_inclusive(|&b| b == b'\n') {
    if prev_blank && line.starts_with(b"From ") {
      starts.push(offset);
    }
    prev_blank = matches!(line, b"\n" | b"\r\n");
    offset += line.len();
  }

  starts
    .iter()
    .enumerate()
    .map(|(i, &start)| {
      let end = starts.get(i + 1).copied().unwrap_or(data.len());
      MboxItem {
        key: i.to_string(),
        raw: strip_separator_blank(&data[start..end]).to_vec(),
      }
    })
    .collect()
}

/// Drop one trailing blank line, if the message ends with one.
fn strip_separator_blank(msg: &[u8]) -> &[u8] {
  if let Some(rest) = msg.strip_suffix(b"\r\n\r\n") {
    return &msg[..rest.len() + 2];
  }
  if let Some(rest) = msg.strip_suffix(b"\n\n") {
    return &msg[..rest.len() + 1];
  }
  msg
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_messages_with_ordinal_keys() {
    let data = b"From a@x Mon Jan  1 00:00:00 2024\nSubject: one\n\nbody one\n\n\
                 From b@x Mon Jan  1 00:00:01 2024\nSubject: two\n\nbody two\n";
    let items = split(data);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].key, "0");
    assert_eq!(items[1].key, "1");
    assert_eq!(
      items[0].raw,
      b"From a@x Mon Jan  1 00:00:00 2024\nSubject: one\n\nbody one\n".to_vec()
    );
    assert!(items[1].raw.starts_with(b"From b@x"));
    assert!(items[1].raw.ends_with(b"body two\n"));
  }

  #[test]
  fn from_inside_body_is_not_a_separator() {
    let data = b"From a@x Mon Jan  1 00:00:00 2024\nSubject: one\n\n\
                 line\nFrom here on it is body\n";
    let items = split(data);
    assert_eq!(items.len(), 1);
  }

  #[test]
  fn preamble_is_ignored() {
    let data = b"junk\n\nFrom a@x Mon Jan  1 00:00:00 2024\n\nbody\n";
    let items = split(data);
    assert_eq!(items.len(), 1);
    assert!(items[0].raw.starts_with(b"From a@x"));
  }

  #[test]
  fn crlf_separators() {
    let data = b"From a@x Mon Jan  1 00:00:00 2024\r\n\r\none\r\n\r\n\
                 From b@x Mon Jan  1 00:00:01 2024\r\n\r\ntwo\r\n";
    let items = split(data);
    assert_eq!(items.len(), 2);
    assert!(items[0].raw.ends_with(b"one\r\n"));
  }

  #[test]
  fn empty_file_has_no_messages() {
    assert!(split(b"").is_empty());
  }
}
