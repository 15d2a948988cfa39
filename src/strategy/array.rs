//! The array strategy, including element-count inference.
//!
//! An array specifier `[segments]N` lays out `N` elements, each a fixed
//! sequence of named segments. The interesting part is where `N` comes
//! from: a literal, another anchor's element count, or — when omitted —
//! a forward probe of memory that keeps accepting elements while every
//! segment's content predicate holds and the next known run has not been
//! reached.

use crate::delta::Delta;
use crate::format;
use crate::format::ArrayCount;
use crate::int::Width;
use crate::model::Model;
use crate::run::segment;
use crate::run::segment::Segment;
use crate::run::segment::SegmentKind;
use crate::run::Run;
use crate::run::RunKind;
use crate::strategy;
use crate::strategy::FormatError;
use crate::strategy::Strategy;
use crate::text;

/// The strategy for `[segments]N` specifiers.
pub struct ArrayStrategy {
  segments: Vec<Segment>,
  count: ArrayCount,
  text: String,
}

impl ArrayStrategy {
  /// Creates the strategy for an array specifier.
  pub fn new(segments: Vec<Segment>, count: ArrayCount, text: String) -> Self {
    Self {
      segments,
      count,
      text,
    }
  }

  fn stride(&self) -> usize {
    segment::element_len(&self.segments)
  }

  /// Resolves the element count this array has at `addr`.
  ///
  /// A count naming an anchor that is unbound, or bound to something
  /// that is not an array, resolves to 0: the count is not yet known,
  /// which is not an error.
  fn resolve_count(&self, model: &Model, addr: usize) -> usize {
    match &self.count {
      ArrayCount::Literal(n) => *n,
      ArrayCount::Anchor(name) => {
        let run = model
          .anchors()
          .addr_of(name)
          .and_then(|a| model.runs().at_start(a));
        match run.map(Run::kind) {
          Some(RunKind::Array { count, .. }) => *count,
          _ => 0,
        }
      }
      ArrayCount::Implicit => self.probe(model, addr),
    }
  }

  /// Walks forward from `addr` one element at a time, counting elements
  /// whose bytes satisfy every segment predicate.
  ///
  /// The probe stops at the first failing element, at the start of the
  /// next known run, or at the end of the image, whichever comes first.
  fn probe(&self, model: &Model, addr: usize) -> usize {
    let stride = self.stride();
    if stride == 0 {
      return 0;
    }
    let limit = model
      .runs()
      .next_after(addr)
      .map(Run::start)
      .unwrap_or_else(|| model.len())
      .min(model.len());

    let mut count = 0;
    let mut cursor = addr;
    while cursor + stride <= limit && self.element_matches(model, cursor) {
      count += 1;
      cursor += stride;
    }
    count
  }

  fn element_matches(&self, model: &Model, addr: usize) -> bool {
    let mut cursor = addr;
    for segment in &self.segments {
      if !segment_matches(model, segment, cursor) {
        return false;
      }
      cursor += segment.len();
    }
    true
  }
}

/// Checks one segment's content-type predicate at `addr`.
fn segment_matches(model: &Model, segment: &Segment, addr: usize) -> bool {
  match &segment.kind {
    SegmentKind::Int(width) => model.rom().slice(addr, width.bytes()).is_some(),
    SegmentKind::Text { len } => model
      .rom()
      .slice(addr, *len)
      .map(text::is_valid_run)
      .unwrap_or(false),
    SegmentKind::Ptr { .. } => match model.rom().get_ptr(addr) {
      Some(ptr) if ptr.is_null() => true,
      Some(ptr) => ptr
        .to_offset()
        .map(|offset| offset < model.len())
        .unwrap_or(false),
      None => false,
    },
    SegmentKind::Enum { source } => {
      let value = match model
        .rom()
        .slice(addr, segment::ENUM_LEN)
        .and_then(|bytes| Width::I16.read_le(bytes))
      {
        Some(value) => value,
        None => return false,
      };
      // An option table we have not loaded cannot rule anything out.
      match model.option_table(source) {
        Some(table) => (value as usize) < table.len(),
        None => true,
      }
    }
  }
}

impl Strategy for ArrayStrategy {
  fn length_for_new_run(&self, model: &Model, addr: usize) -> usize {
    self.resolve_count(model, addr) * self.stride()
  }

  fn try_parse(&self, model: &Model, addr: usize) -> Result<Run, FormatError> {
    let count = self.resolve_count(model, addr);
    let length = count * self.stride();
    if model.rom().slice(addr, length).is_none() {
      return Err(FormatError::OutOfRange { addr });
    }

    let mut cursor = addr;
    for _ in 0..count {
      for segment in &self.segments {
        if !segment_matches(model, segment, cursor) {
          return Err(FormatError::BadSegment {
            addr: cursor,
            segment: segment.name.clone(),
          });
        }
        cursor += segment.len();
      }
    }

    Ok(
      Run::new(addr, length, RunKind::Array {
        segments: self.segments.clone(),
        count,
      })
      .with_format(self.text.as_str()),
    )
  }

  fn write_new_run(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    addr: usize,
  ) -> Result<Run, FormatError> {
    let count = match &self.count {
      ArrayCount::Implicit => 0,
      _ => self.resolve_count(model, addr),
    };
    let length = count * self.stride();
    if model.rom().slice(addr, length).is_none() {
      return Err(FormatError::OutOfRange { addr });
    }

    let mut cursor = addr;
    for _ in 0..count {
      for segment in &self.segments {
        let fill = match &segment.kind {
          SegmentKind::Text { .. } => text::TERMINATOR,
          _ => 0x00,
        };
        for i in 0..segment.len() {
          delta.change_data(model, cursor + i, fill);
        }
        cursor += segment.len();
      }
    }

    Ok(
      Run::new(addr, length, RunKind::Array {
        segments: self.segments.clone(),
        count,
      })
      .with_format(self.text.as_str()),
    )
  }
}

/// Materializes the children of an array's pointer segments.
///
/// For every pointer cell whose segment declares a child format, the
/// child strategy is applied at the cell's destination. Cells that are
/// null, point nowhere useful, or whose destination bytes reject the
/// child format are skipped; the table itself is already written and
/// stands either way. Returns how many children were created.
pub fn materialize_children(
  model: &mut Model,
  delta: &mut Delta,
  run: &Run,
) -> usize {
  let (segments, count) = match run.kind() {
    RunKind::Array { segments, count } => (segments.clone(), *count),
    _ => return 0,
  };

  let mut created = 0;
  let mut cursor = run.start();
  for _ in 0..count {
    for seg in &segments {
      if let SegmentKind::Ptr { child: Some(child) } = &seg.kind {
        created += materialize_child(model, delta, cursor, child);
      }
      cursor += seg.len();
    }
  }
  created
}

fn materialize_child(
  model: &mut Model,
  delta: &mut Delta,
  cell: usize,
  child: &str,
) -> usize {
  let spec = match format::parse(child) {
    Ok(spec) => spec,
    Err(_) => return 0,
  };
  let dest = match model.rom().get_ptr(cell).and_then(|p| p.to_offset()) {
    Some(dest) if dest < model.len() => dest,
    _ => return 0,
  };
  let child_strategy = match strategy::for_spec(&spec) {
    Some(child_strategy) => child_strategy,
    None => return 0,
  };
  match child_strategy.update_from_pointer_format(model, delta, cell, dest) {
    Ok(Some(_)) => 1,
    _ => 0,
  }
}
