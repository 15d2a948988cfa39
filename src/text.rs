//! The game-text character codec.
//!
//! Strings in the target images are not ASCII: each character is a single
//! byte looked up in the game's own table, and strings end with the `0xff`
//! terminator byte. This module provides the byte↔char mapping along with
//! the "does this byte range decode as text" predicate that text runs and
//! array probing rely on.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// The string terminator byte.
pub const TERMINATOR: u8 = 0xff;

/// Decodes a single text byte into the character it displays as.
///
/// Returns `None` for bytes with no printable mapping, including the
/// terminator.
pub fn decode_byte(byte: u8) -> Option<char> {
  match byte {
    0x00 => Some(' '),
    0xa1..=0xaa => Some((b'0' + (byte - 0xa1)) as char),
    0xab => Some('!'),
    0xac => Some('?'),
    0xad => Some('.'),
    0xae => Some('-'),
    0xb8 => Some(','),
    0xbb..=0xd4 => Some((b'A' + (byte - 0xbb)) as char),
    0xd5..=0xee => Some((b'a' + (byte - 0xd5)) as char),
    _ => None,
  }
}

lazy_static! {
  static ref ENCODE_TABLE: HashMap<char, u8> = {
    let mut table = HashMap::new();
    for byte in 0u8..=0xfe {
      if let Some(c) = decode_byte(byte) {
        table.insert(c, byte);
      }
    }
    table
  };
}

/// Encodes a single character into its text byte, if the game's table
/// contains it.
pub fn encode_char(c: char) -> Option<u8> {
  ENCODE_TABLE.get(&c).copied()
}

/// Decodes the text run starting at `bytes[0]`.
///
/// Decoding stops at the terminator, or at the end of `bytes` if no
/// terminator appears. Returns `None` as soon as an undecodable byte is
/// hit.
pub fn decode(bytes: &[u8]) -> Option<String> {
  let mut out = String::new();
  for &byte in bytes {
    if byte == TERMINATOR {
      break;
    }
    out.push(decode_byte(byte)?);
  }
  Some(out)
}

/// Encodes `text` into game bytes, without a trailing terminator.
///
/// Returns `None` if any character has no mapping.
pub fn encode(text: &str) -> Option<Vec<u8>> {
  text.chars().map(encode_char).collect()
}

/// Checks whether `bytes` holds a valid text run filling its whole budget.
///
/// The run is valid when every byte decodes as a character up to an
/// optional terminator, and everything after the terminator is more
/// terminator bytes or zero padding. An empty budget is invalid.
pub fn is_valid_run(bytes: &[u8]) -> bool {
  if bytes.is_empty() {
    return false;
  }
  let mut terminated = false;
  for &byte in bytes {
    if terminated {
      if byte != TERMINATOR && byte != 0x00 {
        return false;
      }
    } else if byte == TERMINATOR {
      terminated = true;
    } else if decode_byte(byte).is_none() {
      return false;
    }
  }
  true
}

/// Returns the length in bytes of the terminated string starting at
/// `bytes[0]`, including the terminator.
///
/// Returns `None` if an undecodable byte appears first, or if the buffer
/// runs out before a terminator.
pub fn terminated_len(bytes: &[u8]) -> Option<usize> {
  for (i, &byte) in bytes.iter().enumerate() {
    if byte == TERMINATOR {
      return Some(i + 1);
    }
    decode_byte(byte)?;
  }
  None
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn roundtrip() {
    let encoded = encode("Abc 09!").unwrap();
    assert_eq!(decode(&encoded).unwrap(), "Abc 09!");
    assert_eq!(encode("©"), None);
  }

  #[test]
  fn terminator_handling() {
    let mut bytes = encode("Hi").unwrap();
    bytes.push(TERMINATOR);
    bytes.push(0x00);
    assert!(is_valid_run(&bytes));
    assert_eq!(terminated_len(&bytes), Some(3));
    assert_eq!(decode(&bytes).unwrap(), "Hi");
  }

  #[test]
  fn garbage_rejected() {
    // 0x1c has no mapping.
    assert!(!is_valid_run(&[0x1c, TERMINATOR]));
    assert_eq!(terminated_len(&[0x1c, TERMINATOR]), None);
    assert!(!is_valid_run(&[]));
    // Character bytes after a terminator are trailing garbage.
    assert!(!is_valid_run(&[0xbb, TERMINATOR, 0xbb, TERMINATOR]));
  }

  #[test]
  fn unterminated_budget() {
    // A full budget of plain characters counts as valid text.
    let bytes = encode("Full").unwrap();
    assert!(is_valid_run(&bytes));
    assert_eq!(terminated_len(&bytes), None);
  }
}
