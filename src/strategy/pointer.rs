//! The pointer strategy.

use crate::delta::Delta;
use crate::format::Target;
use crate::int::Ptr;
use crate::model::Model;
use crate::run::Run;
use crate::run::RunKind;
use crate::strategy::FormatError;
use crate::strategy::Strategy;

/// The strategy for `<target>` specifiers: a four-byte little-endian
/// pointer.
pub struct PointerStrategy {
  target: Option<Target>,
  text: String,
}

impl PointerStrategy {
  /// Creates the strategy for a pointer specifier.
  pub fn new(target: Option<Target>, text: String) -> Self {
    Self { target, text }
  }

  fn read_dest(&self, model: &Model, addr: usize) -> Result<Ptr, FormatError> {
    let ptr = model
      .rom()
      .get_ptr(addr)
      .ok_or(FormatError::OutOfRange { addr })?;
    if ptr.is_null() {
      return Ok(ptr);
    }
    match ptr.to_offset() {
      Some(offset) if offset < model.len() => Ok(ptr),
      _ => Err(FormatError::BadPointer { addr }),
    }
  }
}

impl Strategy for PointerStrategy {
  fn length_for_new_run(&self, _model: &Model, _addr: usize) -> usize {
    4
  }

  fn try_parse(&self, model: &Model, addr: usize) -> Result<Run, FormatError> {
    let dest = self.read_dest(model, addr)?;
    Ok(Run::new(addr, 4, RunKind::Pointer { dest }).with_format(self.text.as_str()))
  }

  fn write_new_run(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    addr: usize,
  ) -> Result<Run, FormatError> {
    if model.rom().slice(addr, 4).is_none() {
      return Err(FormatError::OutOfRange { addr });
    }

    let dest = match &self.target {
      Some(Target::Address(offset)) => Ptr::from_offset(*offset),
      // Unresolved names are not an error: the null sentinel goes in and
      // an unmapped entry waits for the anchor.
      Some(Target::Name(name)) => {
        model.get_address_from_anchor(delta, addr, name)
      }
      None => self.read_dest(model, addr).unwrap_or(Ptr::NULL),
    };

    for (i, byte) in dest.to_le_bytes().iter().enumerate() {
      delta.change_data(model, addr + i, *byte);
    }
    Ok(Run::new(addr, 4, RunKind::Pointer { dest }).with_format(self.text.as_str()))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn parse_and_validate() {
    let mut model = Model::new(crate::rom::Rom::new(0x20));
    let strategy = PointerStrategy::new(None, "<>".into());

    // Null parses.
    for i in 0..4 {
      model.set_byte(0x10 + i, 0);
    }
    let run = strategy.try_parse(&model, 0x10).unwrap();
    assert_eq!(run.length(), 4);
    match run.kind() {
      RunKind::Pointer { dest } => assert!(dest.is_null()),
      _ => panic!("not a pointer"),
    }

    // An in-range ROM pointer parses.
    for (i, b) in Ptr::from_offset(0x08).to_le_bytes().iter().enumerate() {
      model.set_byte(0x10 + i, *b);
    }
    assert!(strategy.try_parse(&model, 0x10).is_ok());

    // 0xff garbage does not.
    assert_eq!(
      strategy.try_parse(&model, 0x04),
      Err(FormatError::BadPointer { addr: 0x04 })
    );
    // Neither does reading off the end.
    assert_eq!(
      strategy.try_parse(&model, 0x1e),
      Err(FormatError::OutOfRange { addr: 0x1e })
    );
  }

  #[test]
  fn write_literal_target() {
    let mut model = Model::new(crate::rom::Rom::new(0x20));
    let mut delta = Delta::new();
    let strategy =
      PointerStrategy::new(Some(Target::Address(0x14)), "<000014>".into());

    let run = strategy.write_new_run(&mut model, &mut delta, 0x00).unwrap();
    assert_eq!(model.rom().get_ptr(0x00).unwrap().to_offset(), Some(0x14));
    assert_eq!(run.format(), "<000014>");
  }
}
