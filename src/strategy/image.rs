//! The image strategies: tiled sprites and palette pages, compressed or
//! raw.

use crate::delta::Delta;
use crate::lz;
use crate::model::Model;
use crate::run::Run;
use crate::run::RunKind;
use crate::strategy::FormatError;
use crate::strategy::Strategy;

/// The number of bytes in one uncompressed palette page: 16 colors at
/// two bytes each.
const PALETTE_LEN: usize = 32;

/// The strategy for `lzs`/`ucs` tags: tiled pixel data.
pub struct SpriteStrategy {
  compressed: bool,
  depth: u8,
  tile_width: u8,
  tile_height: u8,
  palette: Option<String>,
  text: String,
}

impl SpriteStrategy {
  /// Creates the strategy for a sprite tag.
  pub fn new(
    compressed: bool,
    depth: u8,
    tile_width: u8,
    tile_height: u8,
    palette: Option<String>,
    text: String,
  ) -> Self {
    Self {
      compressed,
      depth,
      tile_width,
      tile_height,
      palette,
      text,
    }
  }

  /// The size of this sprite's pixel data once decompressed: each 8x8
  /// tile holds 64 pixels of `depth` bits.
  fn pixel_len(&self) -> usize {
    self.tile_width as usize * self.tile_height as usize * 8 * self.depth as usize
  }

  fn kind(&self) -> RunKind {
    if self.compressed {
      RunKind::LzSprite {
        depth: self.depth,
        tile_width: self.tile_width,
        tile_height: self.tile_height,
        palette: self.palette.clone(),
      }
    } else {
      RunKind::Sprite {
        depth: self.depth,
        tile_width: self.tile_width,
        tile_height: self.tile_height,
        palette: self.palette.clone(),
      }
    }
  }
}

impl Strategy for SpriteStrategy {
  fn length_for_new_run(&self, model: &Model, addr: usize) -> usize {
    if self.compressed {
      measure_stream(model, addr, self.pixel_len()).unwrap_or(0)
    } else {
      self.pixel_len()
    }
  }

  fn try_parse(&self, model: &Model, addr: usize) -> Result<Run, FormatError> {
    let length = if self.compressed {
      measure_stream(model, addr, self.pixel_len())
        .ok_or(FormatError::BadStream { addr })?
    } else {
      let length = self.pixel_len();
      if model.rom().slice(addr, length).is_none() {
        return Err(FormatError::OutOfRange { addr });
      }
      length
    };
    Ok(Run::new(addr, length, self.kind()).with_format(self.text.as_str()))
  }

  fn write_new_run(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    addr: usize,
  ) -> Result<Run, FormatError> {
    let length = write_blank(
      model,
      delta,
      addr,
      self.pixel_len(),
      self.compressed,
    )?;
    Ok(Run::new(addr, length, self.kind()).with_format(self.text.as_str()))
  }
}

/// The strategy for `lzp`/`ucp` tags: one 16-color palette page.
pub struct PaletteStrategy {
  compressed: bool,
  text: String,
}

impl PaletteStrategy {
  /// Creates the strategy for a palette tag.
  ///
  /// A `|name` hint is legal on the tag but carries no information for a
  /// palette itself, so it is dropped here.
  pub fn new(compressed: bool, _palette: Option<String>, text: String) -> Self {
    Self { compressed, text }
  }

  fn kind(&self) -> RunKind {
    if self.compressed {
      RunKind::LzPalette
    } else {
      RunKind::Palette
    }
  }
}

impl Strategy for PaletteStrategy {
  fn length_for_new_run(&self, model: &Model, addr: usize) -> usize {
    if self.compressed {
      measure_stream(model, addr, PALETTE_LEN).unwrap_or(0)
    } else {
      PALETTE_LEN
    }
  }

  fn try_parse(&self, model: &Model, addr: usize) -> Result<Run, FormatError> {
    let length = if self.compressed {
      measure_stream(model, addr, PALETTE_LEN)
        .ok_or(FormatError::BadStream { addr })?
    } else {
      if model.rom().slice(addr, PALETTE_LEN).is_none() {
        return Err(FormatError::OutOfRange { addr });
      }
      PALETTE_LEN
    };
    Ok(Run::new(addr, length, self.kind()).with_format(self.text.as_str()))
  }

  fn write_new_run(
    &self,
    model: &mut Model,
    delta: &mut Delta,
    addr: usize,
  ) -> Result<Run, FormatError> {
    let length =
      write_blank(model, delta, addr, PALETTE_LEN, self.compressed)?;
    Ok(Run::new(addr, length, self.kind()).with_format(self.text.as_str()))
  }
}

/// Measures the LZ77 stream at `addr`, requiring it to inflate to
/// exactly `expected` bytes.
fn measure_stream(model: &Model, addr: usize, expected: usize) -> Option<usize> {
  let tail = model.rom().slice(addr, model.len().checked_sub(addr)?)?;
  if lz::decompressed_size(tail)? != expected {
    return None;
  }
  lz::compressed_len(tail)
}

/// Writes blank content of `pixel_len` bytes at `addr`, compressing it
/// first when asked to. Returns the number of bytes written.
fn write_blank(
  model: &mut Model,
  delta: &mut Delta,
  addr: usize,
  pixel_len: usize,
  compressed: bool,
) -> Result<usize, FormatError> {
  let content = if compressed {
    lz::compress(&vec![0x00; pixel_len])
  } else {
    vec![0x00; pixel_len]
  };
  if model.rom().slice(addr, content.len()).is_none() {
    return Err(FormatError::OutOfRange { addr });
  }
  for (i, byte) in content.iter().enumerate() {
    delta.change_data(model, addr + i, *byte);
  }
  Ok(content.len())
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::rom::Rom;

  #[test]
  fn compressed_sprite_roundtrip() {
    let mut model = Model::new(Rom::new(0x800));
    let mut delta = Delta::new();
    let strategy = SpriteStrategy::new(
      true,
      4,
      2,
      2,
      Some("pal".into()),
      "`lzs4x2x2|pal`".into(),
    );

    // 2x2 tiles at 4bpp: 128 bytes of pixels.
    let run = strategy.write_new_run(&mut model, &mut delta, 0x100).unwrap();
    assert!(run.length() > 4);
    assert_eq!(strategy.length_for_new_run(&model, 0x100), run.length());

    let parsed = strategy.try_parse(&model, 0x100).unwrap();
    assert_eq!(parsed.length(), run.length());
    match parsed.kind() {
      RunKind::LzSprite { depth, palette, .. } => {
        assert_eq!(*depth, 4);
        assert_eq!(palette.as_deref(), Some("pal"));
      }
      _ => panic!("not a compressed sprite"),
    }
  }

  #[test]
  fn size_mismatch_rejected() {
    let mut model = Model::new(Rom::new(0x100));
    // A valid stream that inflates to 8 bytes, where 32 are expected.
    for (i, byte) in lz::compress(&[0u8; 8]).iter().enumerate() {
      model.set_byte(i, *byte);
    }
    let strategy = PaletteStrategy::new(true, None, "`lzp`".into());
    assert_eq!(
      strategy.try_parse(&model, 0),
      Err(FormatError::BadStream { addr: 0 })
    );
  }

  #[test]
  fn raw_palette() {
    let model = Model::new(Rom::new(0x30));
    let strategy = PaletteStrategy::new(false, None, "`ucp`".into());
    let run = strategy.try_parse(&model, 0x00).unwrap();
    assert_eq!(run.length(), 32);
    assert_eq!(run.kind(), &RunKind::Palette);
    assert_eq!(
      strategy.try_parse(&model, 0x10),
      Err(FormatError::OutOfRange { addr: 0x10 })
    );
  }
}
