//! The format-specifier parser.

use lazy_static::lazy_static;
use pest::error::Error as PestError;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use regex::Regex;

use crate::format::ArrayCount;
use crate::format::FormatSpec;
use crate::format::ImageKind;
use crate::format::ImageSpec;
use crate::format::Target;
use crate::int::Width;
use crate::run::segment::Segment;
use crate::run::segment::SegmentKind;

#[derive(Parser)]
#[grammar = "format/grammar.pest"]
struct PegParser;

lazy_static! {
  static ref SPRITE_TAG: Regex =
    Regex::new(r"^(lzs|ucs)(\d{1,2})x(\d{1,3})x(\d{1,3})$").unwrap();
  static ref PALETTE_TAG: Regex = Regex::new(r"^(lzp|ucp)$").unwrap();
  static ref STREAM_TAG: Regex =
    Regex::new(r"^bs([0-9A-Fa-f]{2})$").unwrap();
}

/// A parsing error type.
#[derive(Clone, Debug)]
pub enum ErrorType {
  /// An error originating from inside the PEG parser.
  Peg(PestError<Rule>),
  /// An error due to a number too large to use.
  BadNumber,
  /// An error due to an unrecognized back-tick tag.
  BadTag,
}

/// A parsing error.
#[derive(Clone, Debug)]
pub struct Error {
  /// The type of the error.
  pub inner: ErrorType,
  /// The byte offset within the specifier at which the error occured.
  pub at: usize,
}

impl std::fmt::Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match &self.inner {
      ErrorType::Peg(_) => write!(f, "bad specifier syntax at byte {}", self.at),
      ErrorType::BadNumber => write!(f, "number out of range at byte {}", self.at),
      ErrorType::BadTag => write!(f, "unrecognized tag at byte {}", self.at),
    }
  }
}

/// Parses `text` into a format specifier.
pub fn parse(text: &str) -> Result<FormatSpec, Error> {
  use pest::Parser;
  let mut pairs = match PegParser::parse(Rule::Format, text) {
    Ok(pairs) => pairs,
    Err(err) => {
      let at = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((pos, _)) => pos,
      };
      return Err(Error {
        inner: ErrorType::Peg(err),
        at,
      });
    }
  };

  let format = pairs.next().unwrap();
  let spec = format.into_inner().next().unwrap();
  parse_spec(spec)
}

/// Parses a `Spec`, `AnchorBody`, or `SegPtrChild` pair.
fn parse_spec(pair: Pair<Rule>) -> Result<FormatSpec, Error> {
  let inner = pair.into_inner().next().unwrap();
  match inner.as_rule() {
    Rule::Anchor => {
      let mut parts = inner.into_inner();
      let name = parts.next().unwrap().as_str().to_owned();
      let body = parts
        .next()
        .map(parse_spec)
        .transpose()?
        .map(Box::new);
      Ok(FormatSpec::Anchor { name, inner: body })
    }
    Rule::Pointer => {
      let target = inner
        .into_inner()
        .next()
        .map(parse_target)
        .transpose()?;
      Ok(FormatSpec::Pointer(target))
    }
    Rule::Text => {
      let len = inner
        .into_inner()
        .find(|p| p.as_rule() == Rule::Number)
        .map(parse_number)
        .transpose()?;
      Ok(FormatSpec::Text { len })
    }
    Rule::Array => {
      let mut segments = Vec::new();
      let mut count = ArrayCount::Implicit;
      for part in inner.into_inner() {
        match part.as_rule() {
          Rule::Segment => segments.push(parse_segment(part)?),
          Rule::ArrayCount => {
            let token = part.into_inner().next().unwrap();
            count = match token.as_rule() {
              Rule::Number => ArrayCount::Literal(parse_number(token)?),
              Rule::Name => ArrayCount::Anchor(token.as_str().to_owned()),
              _ => unreachable!(),
            };
          }
          _ => unreachable!(),
        }
      }
      Ok(FormatSpec::Array { segments, count })
    }
    Rule::Image => parse_image(inner),
    _ => unreachable!(),
  }
}

fn parse_target(pair: Pair<Rule>) -> Result<Target, Error> {
  let at = pair.as_span().start();
  let token = pair.into_inner().next().unwrap();
  match token.as_rule() {
    Rule::HexAddr => {
      let addr = usize::from_str_radix(token.as_str(), 16)
        .map_err(|_| Error {
          inner: ErrorType::BadNumber,
          at,
        })?;
      Ok(Target::Address(addr))
    }
    Rule::Name => Ok(Target::Name(token.as_str().to_owned())),
    _ => unreachable!(),
  }
}

fn parse_segment(pair: Pair<Rule>) -> Result<Segment, Error> {
  let mut parts = pair.into_inner();
  let name = parts.next().unwrap().as_str().to_owned();
  let kind = parts.next().unwrap().into_inner().next().unwrap();
  let kind = match kind.as_rule() {
    Rule::SegText => {
      let number = kind
        .into_inner()
        .find(|p| p.as_rule() == Rule::Number)
        .unwrap();
      SegmentKind::Text {
        len: parse_number(number)?,
      }
    }
    Rule::SegPtr => SegmentKind::Ptr {
      child: kind
        .into_inner()
        .next()
        .map(|child| child.as_str().to_owned()),
    },
    Rule::SegEnum => SegmentKind::Enum {
      source: kind.as_str()[1..].to_owned(),
    },
    Rule::SegInt => SegmentKind::Int(Width::from_marker(kind.as_str()).unwrap()),
    _ => unreachable!(),
  };
  Ok(Segment { name, kind })
}

fn parse_image(pair: Pair<Rule>) -> Result<FormatSpec, Error> {
  let at = pair.as_span().start();
  let mut parts = pair.into_inner();
  let tag = parts.next().unwrap().as_str();
  let palette = parts.next().map(|p| p.as_str().to_owned());

  if let Some(caps) = SPRITE_TAG.captures(tag) {
    let num = |i: usize| {
      caps[i].parse::<u8>().map_err(|_| Error {
        inner: ErrorType::BadNumber,
        at,
      })
    };
    return Ok(FormatSpec::Image(ImageSpec {
      compressed: &caps[1] == "lzs",
      kind: ImageKind::Sprite {
        depth: num(2)?,
        tile_width: num(3)?,
        tile_height: num(4)?,
      },
      palette,
    }));
  }
  if let Some(caps) = PALETTE_TAG.captures(tag) {
    return Ok(FormatSpec::Image(ImageSpec {
      compressed: &caps[1] == "lzp",
      kind: ImageKind::Palette,
      palette,
    }));
  }
  if let Some(caps) = STREAM_TAG.captures(tag) {
    // The regex guarantees two hex digits.
    let end = u8::from_str_radix(&caps[1], 16).unwrap();
    if palette.is_some() {
      return Err(Error {
        inner: ErrorType::BadTag,
        at,
      });
    }
    return Ok(FormatSpec::Stream { end });
  }

  Err(Error {
    inner: ErrorType::BadTag,
    at,
  })
}

fn parse_number(pair: Pair<Rule>) -> Result<usize, Error> {
  pair.as_str().parse().map_err(|_| Error {
    inner: ErrorType::BadNumber,
    at: pair.as_span().start(),
  })
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn pointers() {
    assert_eq!(
      parse("<A00000>").unwrap(),
      FormatSpec::Pointer(Some(Target::Address(0xa00000)))
    );
    assert_eq!(
      parse("<data.table>").unwrap(),
      FormatSpec::Pointer(Some(Target::Name("data.table".into())))
    );
    assert_eq!(parse("<>").unwrap(), FormatSpec::Pointer(None));
    // Nine hex-ish characters cannot be an address, but do name anchors.
    assert_eq!(
      parse("<abcdef012>").unwrap(),
      FormatSpec::Pointer(Some(Target::Name("abcdef012".into())))
    );
  }

  #[test]
  fn anchors() {
    match parse("^mon.sprites`lzs4x8x8|mon.palette`").unwrap() {
      FormatSpec::Anchor { name, inner } => {
        assert_eq!(name, "mon.sprites");
        match *inner.unwrap() {
          FormatSpec::Image(image) => {
            assert!(image.compressed);
            assert_eq!(image.palette.as_deref(), Some("mon.palette"));
          }
          other => panic!("expected image, got {:?}", other),
        }
      }
      other => panic!("expected anchor, got {:?}", other),
    }
  }

  #[test]
  fn segment_markers() {
    let spec = parse("[a. b: c:. d:: e:table f<>]2").unwrap();
    match spec {
      FormatSpec::Array { segments, count } => {
        assert_eq!(count, ArrayCount::Literal(2));
        assert_eq!(segments[0].kind, SegmentKind::Int(Width::I8));
        assert_eq!(segments[1].kind, SegmentKind::Int(Width::I16));
        assert_eq!(segments[2].kind, SegmentKind::Int(Width::I24));
        assert_eq!(segments[3].kind, SegmentKind::Int(Width::I32));
        assert_eq!(
          segments[4].kind,
          SegmentKind::Enum {
            source: "table".into()
          }
        );
        assert_eq!(segments[5].kind, SegmentKind::Ptr { child: None });
      }
      other => panic!("expected array, got {:?}", other),
    }
  }

  #[test]
  fn streams_and_rejects() {
    assert_eq!(parse("`bs00`").unwrap(), FormatSpec::Stream { end: 0 });
    assert!(parse("`bogus`").is_err());
    assert!(parse("").is_err());
    assert!(parse("[]").is_err());
    assert!(parse("^9name").is_err());
    assert!(matches!(
      parse("\"\"99999999999999999999").unwrap_err().inner,
      ErrorType::BadNumber
    ));
  }
}
