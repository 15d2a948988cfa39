//! Element segments: the named, typed fields inside an array element.
//!
//! An array run's format describes one element as an ordered list of
//! segments, each with a name, a content type, and a fixed byte length.
//! The whole array is then `count` copies of that layout laid end to end.
//! This module holds the segment types themselves plus the byte-offset to
//! structural-offset conversion every consumer uses to answer "what field
//! is this byte inside".
//!
//! The content-type *predicates* (does this byte range satisfy this
//! segment) live with the array strategy, next to the probing loop that
//! uses them.

use std::fmt;

use crate::int::Width;

/// The number of bytes an enum segment occupies.
///
/// Enum cells are always two-byte indices into their named option table.
pub const ENUM_LEN: usize = 2;

/// One named, typed field within an array element.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Segment {
  /// The field's name, as written in the format specifier.
  pub name: String,
  /// The field's content type.
  pub kind: SegmentKind,
}

/// The content type of a [`Segment`].
///
/// [`Segment`]: struct.Segment.html
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SegmentKind {
  /// A little-endian unsigned integer of fixed width.
  Int(Width),
  /// Encoded text with a fixed byte budget.
  Text {
    /// The byte budget, terminator included when one is present.
    len: usize,
  },
  /// A four-byte pointer.
  Ptr {
    /// The format specifier for the data the pointer targets, if the
    /// array declares one. Destinations materialize lazily from it.
    child: Option<String>,
  },
  /// A two-byte index into a named option table.
  Enum {
    /// The name of the option table holding the legal values.
    source: String,
  },
}

impl Segment {
  /// Creates a segment.
  pub fn new(name: impl Into<String>, kind: SegmentKind) -> Self {
    Self {
      name: name.into(),
      kind,
    }
  }

  /// Returns the number of bytes this segment occupies in each element.
  pub fn len(&self) -> usize {
    match &self.kind {
      SegmentKind::Int(width) => width.bytes(),
      SegmentKind::Text { len } => *len,
      SegmentKind::Ptr { .. } => 4,
      SegmentKind::Enum { .. } => ENUM_LEN,
    }
  }
}

impl fmt::Display for Segment {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.kind {
      SegmentKind::Int(width) => write!(f, "{}{}", self.name, width.marker()),
      SegmentKind::Text { len } => write!(f, "{}\"\"{}", self.name, len),
      SegmentKind::Ptr { child: None } => write!(f, "{}<>", self.name),
      SegmentKind::Ptr { child: Some(c) } => write!(f, "{}<{}>", self.name, c),
      SegmentKind::Enum { source } => write!(f, "{}:{}", self.name, source),
    }
  }
}

/// Returns the total byte length of one element with the given layout.
pub fn element_len(segments: &[Segment]) -> usize {
  segments.iter().map(Segment::len).sum()
}

/// The structural position of a byte within an array run.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct OffsetInfo {
  /// Which element the byte is in.
  pub element_index: usize,
  /// Which segment of that element the byte is in.
  pub segment_index: usize,
  /// The byte offset, from the start of the array, at which that segment
  /// begins.
  pub segment_start: usize,
  /// The byte's offset within the segment.
  pub segment_offset: usize,
}

/// Converts a byte offset from the start of an array into its structural
/// position.
///
/// The element index is a stride division; the segment is then found by a
/// linear scan through the element's segment lengths. Returns `None` for
/// an empty layout.
pub fn locate(segments: &[Segment], offset: usize) -> Option<OffsetInfo> {
  let stride = element_len(segments);
  if stride == 0 {
    return None;
  }

  let element_index = offset / stride;
  let mut remainder = offset % stride;
  let mut segment_start = offset - remainder;
  for (segment_index, segment) in segments.iter().enumerate() {
    if remainder < segment.len() {
      return Some(OffsetInfo {
        element_index,
        segment_index,
        segment_start,
        segment_offset: remainder,
      });
    }
    remainder -= segment.len();
    segment_start += segment.len();
  }

  // Unreachable: remainder is strictly less than the stride.
  None
}

#[cfg(test)]
mod test {
  use super::*;

  fn layout() -> Vec<Segment> {
    vec![
      Segment::new("name", SegmentKind::Text { len: 4 }),
      Segment::new("stats", SegmentKind::Int(Width::I16)),
      Segment::new("info", SegmentKind::Ptr { child: None }),
    ]
  }

  #[test]
  fn stride_and_scan() {
    let segments = layout();
    assert_eq!(element_len(&segments), 10);

    // Byte 0: first element, first segment.
    let info = locate(&segments, 0).unwrap();
    assert_eq!((info.element_index, info.segment_index), (0, 0));
    assert_eq!((info.segment_start, info.segment_offset), (0, 0));

    // Byte 5: first element, second byte of "stats".
    let info = locate(&segments, 5).unwrap();
    assert_eq!((info.element_index, info.segment_index), (0, 1));
    assert_eq!((info.segment_start, info.segment_offset), (4, 1));

    // Byte 16: second element, third byte of "info".
    let info = locate(&segments, 16).unwrap();
    assert_eq!((info.element_index, info.segment_index), (1, 2));
    assert_eq!((info.segment_start, info.segment_offset), (16, 0));
  }

  #[test]
  fn empty_layout() {
    assert_eq!(locate(&[], 3), None);
  }

  #[test]
  fn display() {
    let segments = layout();
    let rendered = segments
      .iter()
      .map(|s| s.to_string())
      .collect::<Vec<_>>()
      .join(" ");
    assert_eq!(rendered, "name\"\"4 stats: info<>");
  }
}
