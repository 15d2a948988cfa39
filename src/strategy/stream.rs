//! The byte-stream strategy: unstructured data with an end marker.

use crate::delta::Delta;
use crate::model::Model;
use crate::run::Run;
use crate::run::RunKind;
use crate::strategy::FormatError;
use crate::strategy::Strategy;

/// The strategy for `bsXX` tags: a run of arbitrary bytes ended by the
/// marker byte `XX`, marker included in the run.
pub struct StreamStrategy {
  end: u8,
  text: String,
}

impl StreamStrategy {
  /// Creates the strategy for a stream tag.
  pub fn new(end: u8, text: String) -> Self {
    Self { end, text }
  }

  fn scan(&self, model: &Model, addr: usize) -> Option<usize> {
    let mut cursor = addr;
    loop {
      match model.byte(cursor) {
        Some(byte) if byte == self.end => return Some(cursor - addr + 1),
        Some(_) => cursor += 1,
        None => return None,
      }
    }
  }
}

impl Strategy for StreamStrategy {
  fn length_for_new_run(&self, model: &Model, addr: usize) -> usize {
    self.scan(model, addr).unwrap_or(0)
  }

  fn try_parse(&self, model: &Model, addr: usize) -> Result<Run, FormatError> {
    if addr >= model.len() {
      return Err(FormatError::OutOfRange { addr });
    }
    let length = self
      .scan(model, addr)
      .ok_or(FormatError::NoTerminator { addr })?;
    Ok(
      Run::new(addr, length, RunKind::Stream { end: self.end })
        .with_format(self.text.as_str()),
    )
  }

  fn write_new_run(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    addr: usize,
  ) -> Result<Run, FormatError> {
    if addr >= model.len() {
      return Err(FormatError::OutOfRange { addr });
    }
    // A fresh stream is just its end marker.
    delta.change_data(model, addr, self.end);
    Ok(
      Run::new(addr, 1, RunKind::Stream { end: self.end })
        .with_format(self.text.as_str()),
    )
  }
}
