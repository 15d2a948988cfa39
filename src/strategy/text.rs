//! The text strategies, fixed-length and terminator-delimited.

use crate::delta::Delta;
use crate::model::Model;
use crate::run::Run;
use crate::run::RunKind;
use crate::strategy::FormatError;
use crate::strategy::Strategy;
use crate::text;

/// The strategy for `""` and `""N` specifiers.
///
/// With a declared length the run covers exactly that budget and every
/// byte must decode; without one the run sizes itself from its own
/// terminator.
pub struct TextStrategy {
  len: Option<usize>,
  text: String,
}

impl TextStrategy {
  /// Creates the strategy for a text specifier.
  pub fn new(len: Option<usize>, text: String) -> Self {
    Self { len, text }
  }
}

impl Strategy for TextStrategy {
  fn length_for_new_run(&self, model: &Model, addr: usize) -> usize {
    match self.len {
      Some(len) => len,
      None => model
        .rom()
        .slice(addr, model.len().saturating_sub(addr))
        .and_then(text::terminated_len)
        .unwrap_or(1),
    }
  }

  fn try_parse(&self, model: &Model, addr: usize) -> Result<Run, FormatError> {
    match self.len {
      Some(len) => {
        let bytes = model
          .rom()
          .slice(addr, len)
          .ok_or(FormatError::OutOfRange { addr })?;
        if !text::is_valid_run(bytes) {
          return Err(FormatError::BadText { addr });
        }
        Ok(
          Run::new(addr, len, RunKind::Text { terminated: false })
            .with_format(self.text.as_str()),
        )
      }
      None => {
        let tail = model
          .rom()
          .slice(addr, model.len().saturating_sub(addr))
          .ok_or(FormatError::OutOfRange { addr })?;
        let len = text::terminated_len(tail)
          .ok_or(FormatError::NoTerminator { addr })?;
        Ok(
          Run::new(addr, len, RunKind::Text { terminated: true })
            .with_format(self.text.as_str()),
        )
      }
    }
  }

  fn write_new_run(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    addr: usize,
  ) -> Result<Run, FormatError> {
    let len = match self.len {
      Some(len) => len,
      // A fresh self-terminated string is just its terminator.
      None => 1,
    };
    if model.rom().slice(addr, len).is_none() {
      return Err(FormatError::OutOfRange { addr });
    }
    for i in 0..len {
      delta.change_data(model, addr + i, text::TERMINATOR);
    }
    Ok(
      Run::new(addr, len, RunKind::Text {
        terminated: self.len.is_none(),
      })
      .with_format(self.text.as_str()),
    )
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::rom::Rom;

  fn model_with_text(addr: usize, s: &str, terminate: bool) -> Model {
    let mut model = Model::new(Rom::new(0x40));
    let mut bytes = text::encode(s).unwrap();
    if terminate {
      bytes.push(text::TERMINATOR);
    }
    for (i, b) in bytes.iter().enumerate() {
      model.set_byte(addr + i, *b);
    }
    model
  }

  #[test]
  fn fixed_length() {
    let model = model_with_text(0x10, "Name", true);
    let strategy = TextStrategy::new(Some(5), "\"\"5".into());
    let run = strategy.try_parse(&model, 0x10).unwrap();
    assert_eq!(run.length(), 5);

    // 0xff filler is all terminators, which is a valid (empty) budget.
    assert!(strategy.try_parse(&model, 0x20).is_ok());
  }

  #[test]
  fn self_terminated() {
    let model = model_with_text(0x10, "Hello", true);
    let strategy = TextStrategy::new(None, "\"\"".into());
    let run = strategy.try_parse(&model, 0x10).unwrap();
    assert_eq!(run.length(), 6);
    assert_eq!(run.kind(), &RunKind::Text { terminated: true });
    assert_eq!(strategy.length_for_new_run(&model, 0x10), 6);
  }

  #[test]
  fn rejects() {
    let mut model = Model::new(Rom::new(0x10));
    // 0x1c decodes as nothing.
    model.set_byte(0x00, 0x1c);
    let fixed = TextStrategy::new(Some(4), "\"\"4".into());
    assert_eq!(
      fixed.try_parse(&model, 0x00),
      Err(FormatError::BadText { addr: 0x00 })
    );
    assert_eq!(
      fixed.try_parse(&model, 0x0e),
      Err(FormatError::OutOfRange { addr: 0x0e })
    );

    let terminated = TextStrategy::new(None, "\"\"".into());
    assert_eq!(
      terminated.try_parse(&model, 0x00),
      Err(FormatError::NoTerminator { addr: 0x00 })
    );
  }

  #[test]
  fn materialization() {
    let mut model = Model::new(Rom::filled_with(0x00, 0x10));
    let mut delta = Delta::new();
    let strategy = TextStrategy::new(Some(4), "\"\"4".into());
    let run = strategy.write_new_run(&mut model, &mut delta, 0x04).unwrap();
    assert_eq!(run.length(), 4);
    assert_eq!(model.rom().slice(0x04, 4).unwrap(), &[0xff; 4]);

    // The fill is part of the delta: reverting restores the zeroes.
    delta.revert(&mut model);
    assert_eq!(model.rom().slice(0x04, 4).unwrap(), &[0x00; 4]);
  }
}
