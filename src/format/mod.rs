//! The format-specifier language.
//!
//! Formats are written in a compact text DSL: `^name` declares an anchor,
//! `<name>` or `<hex-address>` writes a pointer, `""` marks text with an
//! optional byte length, `[segments]N` declares an array, and back-tick
//! tags select image and stream strategies. This module provides a
//! faithful AST for that language; [`parse`] turns text into it, and the
//! `Display` impls turn it back.
//!
//! [`parse`]: fn.parse.html

use std::fmt;

use crate::run::segment::Segment;

mod parse;

pub use parse::parse;
pub use parse::Error;
pub use parse::ErrorType;

/// A parsed format specifier.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FormatSpec {
  /// `^name` — declares an anchor at the current address, with an
  /// optional format for the data that lives there.
  Anchor {
    /// The anchor's name.
    name: String,
    /// The format of the anchored data, if declared.
    inner: Option<Box<FormatSpec>>,
  },
  /// `<target>` — a four-byte pointer. A missing target means "whatever
  /// the bytes already say".
  Pointer(Option<Target>),
  /// `""` or `""N` — a text run, self-terminated or of fixed length.
  Text {
    /// The declared byte length; `None` means terminator-delimited.
    len: Option<usize>,
  },
  /// `[segments]N` — an array of fixed-layout elements.
  Array {
    /// The per-element layout.
    segments: Vec<Segment>,
    /// Where the element count comes from.
    count: ArrayCount,
  },
  /// A back-tick image tag.
  Image(ImageSpec),
  /// A back-tick `bsXX` tag: a byte stream ended by the marker `XX`.
  Stream {
    /// The end-marker byte.
    end: u8,
  },
}

/// The destination a pointer specifier names.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Target {
  /// A named destination, resolved through the anchor registry.
  Name(String),
  /// A literal file address.
  Address(usize),
}

/// Where an array's element count comes from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ArrayCount {
  /// A literal count.
  Literal(usize),
  /// The count of the array bound to another anchor.
  Anchor(String),
  /// No count given: infer it by probing memory.
  Implicit,
}

/// The parameters of an image tag.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImageSpec {
  /// Whether the pixel data is LZ77-compressed.
  pub compressed: bool,
  /// What the tag describes.
  pub kind: ImageKind,
  /// The anchor name of the palette the image prefers, if declared with
  /// a trailing `|paletteName` hint.
  pub palette: Option<String>,
}

/// The shape an [`ImageSpec`] describes.
///
/// [`ImageSpec`]: struct.ImageSpec.html
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ImageKind {
  /// Tiled pixel data.
  Sprite {
    /// Bits per pixel.
    depth: u8,
    /// Width in tiles.
    tile_width: u8,
    /// Height in tiles.
    tile_height: u8,
  },
  /// A 16-color palette page.
  Palette,
}

impl fmt::Display for FormatSpec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      FormatSpec::Anchor { name, inner } => {
        write!(f, "^{}", name)?;
        match inner {
          Some(inner) => write!(f, "{}", inner),
          None => Ok(()),
        }
      }
      FormatSpec::Pointer(None) => write!(f, "<>"),
      FormatSpec::Pointer(Some(Target::Name(name))) => {
        write!(f, "<{}>", name)
      }
      FormatSpec::Pointer(Some(Target::Address(addr))) => {
        write!(f, "<{:06X}>", addr)
      }
      FormatSpec::Text { len: None } => write!(f, "\"\""),
      FormatSpec::Text { len: Some(len) } => write!(f, "\"\"{}", len),
      FormatSpec::Array { segments, count } => {
        write!(f, "[")?;
        for (i, segment) in segments.iter().enumerate() {
          if i > 0 {
            write!(f, " ")?;
          }
          write!(f, "{}", segment)?;
        }
        write!(f, "]")?;
        match count {
          ArrayCount::Literal(n) => write!(f, "{}", n),
          ArrayCount::Anchor(name) => write!(f, "{}", name),
          ArrayCount::Implicit => Ok(()),
        }
      }
      FormatSpec::Image(image) => write!(f, "{}", image),
      FormatSpec::Stream { end } => write!(f, "`bs{:02X}`", end),
    }
  }
}

impl fmt::Display for ImageSpec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "`")?;
    match &self.kind {
      ImageKind::Sprite {
        depth,
        tile_width,
        tile_height,
      } => write!(
        f,
        "{}{}x{}x{}",
        if self.compressed { "lzs" } else { "ucs" },
        depth,
        tile_width,
        tile_height
      )?,
      ImageKind::Palette => {
        write!(f, "{}", if self.compressed { "lzp" } else { "ucp" })?
      }
    }
    if let Some(palette) = &self.palette {
      write!(f, "|{}", palette)?;
    }
    write!(f, "`")
  }
}
