//! Format strategies: the plugins that interpret each kind of run.
//!
//! Every non-anchor format specifier maps to exactly one [`Strategy`].
//! The strategy is the sole authority for its format: it knows how long a
//! fresh run would be, how to parse existing bytes into a run (or reject
//! them), and how to materialize default content for a brand-new run.
//! Strategies are stateless apart from the parameters baked in from their
//! specifier, so the dispatcher builds them on demand.

use std::fmt;

use crate::delta::Delta;
use crate::format::FormatSpec;
use crate::format::ImageKind;
use crate::model::Model;
use crate::run::Run;

pub mod array;
pub mod image;
pub mod pointer;
pub mod stream;
pub mod text;

/// An error produced when a strategy cannot read existing bytes as its
/// format.
///
/// These errors are recovered locally: the intended format is rejected
/// and whatever format previously covered the bytes stands.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FormatError {
  /// The format would run past the end of the image.
  OutOfRange {
    /// Where the format was being applied.
    addr: usize,
  },
  /// Four bytes that are neither null nor a ROM address.
  BadPointer {
    /// Where the pointer was being read.
    addr: usize,
  },
  /// Bytes that do not decode as text.
  BadText {
    /// Where the text was being read.
    addr: usize,
  },
  /// A self-terminated format whose terminator never arrives.
  NoTerminator {
    /// Where the format was being read.
    addr: usize,
  },
  /// An array element whose bytes fail a segment's content type.
  BadSegment {
    /// Where the offending element begins.
    addr: usize,
    /// The name of the segment that failed.
    segment: String,
  },
  /// A compressed stream that is malformed or inflates to the wrong
  /// size.
  BadStream {
    /// Where the stream begins.
    addr: usize,
  },
}

impl fmt::Display for FormatError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      FormatError::OutOfRange { addr } => {
        write!(f, "format at {:#x} runs past the end of the image", addr)
      }
      FormatError::BadPointer { addr } => {
        write!(f, "bytes at {:#x} are not a pointer", addr)
      }
      FormatError::BadText { addr } => {
        write!(f, "bytes at {:#x} are not text", addr)
      }
      FormatError::NoTerminator { addr } => {
        write!(f, "format at {:#x} is never terminated", addr)
      }
      FormatError::BadSegment { addr, segment } => {
        write!(f, "element at {:#x} fails segment {:?}", addr, segment)
      }
      FormatError::BadStream { addr } => {
        write!(f, "bytes at {:#x} are not a valid stream", addr)
      }
    }
  }
}

/// A format plugin.
///
/// One strategy exists per format specifier; it sizes, validates, parses,
/// and materializes runs of its kind. Implementations hold only the
/// parameters from the specifier that produced them.
pub trait Strategy {
  /// Returns the length a new run of this format would occupy at `addr`.
  ///
  /// For self-sizing formats this inspects memory; it returns 0 when no
  /// sensible run fits.
  fn length_for_new_run(&self, model: &Model, addr: usize) -> usize;

  /// Parses the existing bytes at `addr` into a run of this format.
  fn try_parse(&self, model: &Model, addr: usize)
    -> Result<Run, FormatError>;

  /// Materializes default content for a brand-new run at `addr` and
  /// returns the run describing it.
  ///
  /// All byte writes go through `delta`, so the materialization is part
  /// of the enclosing logical edit.
  fn write_new_run(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    addr: usize,
  ) -> Result<Run, FormatError>;

  /// Applies this format at the destination of a pointer.
  ///
  /// Invoked when a table cell's format implies the format of the data
  /// it points at, letting a table of pointers lazily materialize
  /// heterogeneous children. The default parses the destination and
  /// records the run, remembering `source` as a referencing pointer;
  /// a destination already covered by a run is left alone.
  fn update_from_pointer_format(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    source: usize,
    dest: usize,
  ) -> Result<Option<Run>, FormatError> {
    if model.runs().at(dest).is_some() {
      return Ok(None);
    }
    let run = self.try_parse(model, dest)?;
    let run = run.merge_source(source);
    match model.observe_run_written(delta, run.clone()) {
      Ok(()) => Ok(Some(run)),
      // The span check above makes this unreachable in practice, but a
      // conflict is still a local rejection, not a failure.
      Err(_) => Ok(None),
    }
  }
}

/// Builds the strategy for a non-anchor specifier.
///
/// Returns `None` for anchor specifiers: the caller peels the anchor off
/// and dispatches on its body.
pub fn for_spec(spec: &FormatSpec) -> Option<Box<dyn Strategy>> {
  match spec {
    FormatSpec::Anchor { .. } => None,
    FormatSpec::Pointer(target) => Some(Box::new(
      pointer::PointerStrategy::new(target.clone(), spec.to_string()),
    )),
    FormatSpec::Text { len } => Some(Box::new(text::TextStrategy::new(
      *len,
      spec.to_string(),
    ))),
    FormatSpec::Array { segments, count } => {
      Some(Box::new(array::ArrayStrategy::new(
        segments.clone(),
        count.clone(),
        spec.to_string(),
      )))
    }
    FormatSpec::Image(image) => Some(match &image.kind {
      ImageKind::Sprite {
        depth,
        tile_width,
        tile_height,
      } => Box::new(image::SpriteStrategy::new(
        image.compressed,
        *depth,
        *tile_width,
        *tile_height,
        image.palette.clone(),
        spec.to_string(),
      )),
      ImageKind::Palette => Box::new(image::PaletteStrategy::new(
        image.compressed,
        image.palette.clone(),
        spec.to_string(),
      )),
    }),
    FormatSpec::Stream { end } => Some(Box::new(
      stream::StreamStrategy::new(*end, spec.to_string()),
    )),
  }
}
