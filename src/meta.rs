//! Annotation metadata, which describes how to reconstruct a model's
//! anchors and runs on a fresh load.
//!
//! The persisted surface is deliberately small: the `(address, name,
//! format)` triple for every anchor, plus the named option tables and
//! matched-word hints that formats refer to. Replaying the anchors in
//! address order through the model rebuilds the run store and the anchor
//! registry; everything else the model knows is derived.
//!
//! Files are JSON5, so hand-edited metadata can carry comments and
//! trailing commas.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::delta::Delta;
use crate::error;
use crate::model::Model;
use crate::model::ModelError;

/// Everything needed to re-annotate an image.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Metadata {
  /// Every anchor, in address order.
  pub anchors: Vec<Anchor>,
  /// Named option tables, feeding enum segments.
  #[serde(default)]
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<OptionTable>,
  /// Matched-word hints.
  #[serde(default)]
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub matched_words: Vec<MatchedWord>,
}

/// One anchor binding.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Anchor {
  /// The anchored address.
  pub address: usize,
  /// The anchor's name.
  pub name: String,
  /// The format body at that address, empty for a bare name.
  #[serde(default)]
  #[serde(skip_serializing_if = "String::is_empty")]
  pub format: String,
}

/// A named list of strings that enum segments index into.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OptionTable {
  /// The table's name, as enum segments refer to it.
  pub name: String,
  /// The legal values, in index order.
  pub options: Vec<String>,
}

/// A hint that the word at an address tracks a named constant.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MatchedWord {
  /// Where the word lives.
  pub address: usize,
  /// The constant it tracks.
  pub name: String,
}

/// An error produced while replaying one metadata entry.
#[derive(Debug)]
pub struct ApplyError {
  /// The entry's address.
  pub address: usize,
  /// The entry's anchor name.
  pub name: String,
  /// What went wrong.
  pub inner: ModelError,
}

impl fmt::Display for ApplyError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "anchor {}: {}", self.name, self.inner)
  }
}

impl error::Error for ApplyError {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::Addr(self.address)
  }
  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Annotating)
  }
}

impl Metadata {
  /// Parses a metadata file.
  pub fn from_str(text: &str) -> Result<Self, json5::Error> {
    json5::from_str(text)
  }

  /// Serializes this metadata for writing back out.
  pub fn to_string(&self) -> Result<String, json5::Error> {
    json5::to_string(self)
  }

  /// Extracts the metadata describing `model`'s current annotations.
  pub fn collect(model: &Model) -> Self {
    let mut options = model
      .option_tables()
      .map(|(name, options)| OptionTable {
        name: name.to_owned(),
        options: options.to_vec(),
      })
      .collect::<Vec<_>>();
    options.sort_by(|a, b| a.name.cmp(&b.name));

    Metadata {
      anchors: model
        .anchors()
        .anchors()
        .map(|(address, name, format)| Anchor {
          address,
          name: name.to_owned(),
          format: format.to_owned(),
        })
        .collect(),
      options,
      matched_words: model
        .matched_words()
        .map(|(address, name)| MatchedWord {
          address,
          name: name.to_owned(),
        })
        .collect(),
    }
  }

  /// Replays this metadata onto `model`, rebuilding its annotations.
  ///
  /// Option tables go in first so enum segments can see them; anchors
  /// then replay in address order through the model's anchor path.
  /// Entries that fail are collected and reported together, and do not
  /// stop the rest of the file from loading.
  pub fn apply(
    &self,
    model: &mut Model,
    delta: &mut Delta,
  ) -> Result<(), error::Errors<ApplyError>> {
    let mut errors = error::Errors::new();

    for table in &self.options {
      model.set_option_table(&table.name, table.options.clone());
    }
    for word in &self.matched_words {
      model.add_matched_word(word.address, &word.name);
    }

    let mut anchors = self.anchors.iter().collect::<Vec<_>>();
    anchors.sort_by_key(|a| a.address);
    for anchor in anchors {
      if let Err(inner) = model.observe_anchor_written(
        delta,
        anchor.address,
        &anchor.name,
        &anchor.format,
      ) {
        errors.push(ApplyError {
          address: anchor.address,
          name: anchor.name.clone(),
          inner,
        });
      }
    }

    if errors.is_ok() {
      Ok(())
    } else {
      Err(errors)
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::rom::Rom;
  use crate::text;

  fn sample_model() -> Model {
    let mut model = Model::new(Rom::new(0x200));
    let mut delta = Delta::new();
    for (i, b) in text::encode("Mew").unwrap().iter().enumerate() {
      model.set_byte(0x40 + i, *b);
    }
    model.set_byte(0x43, text::TERMINATOR);
    model.set_option_table("kinds", vec!["normal".into(), "fire".into()]);
    model.add_matched_word(0x80, "mon.count");
    model
      .observe_anchor_written(&mut delta, 0x40, "mon.name", "\"\"4")
      .unwrap();
    model
      .observe_anchor_written(&mut delta, 0x100, "free.space", "")
      .unwrap();
    model
  }

  #[test]
  fn roundtrip() {
    let model = sample_model();
    let meta = Metadata::collect(&model);
    let text = meta.to_string().unwrap();
    let reparsed = Metadata::from_str(&text).unwrap();

    // Loading the reparsed metadata onto a fresh model with the same
    // bytes reproduces the annotations.
    let mut fresh = Model::new(Rom::from_bytes(model.rom().bytes().to_vec()));
    let mut delta = Delta::new();
    assert!(reparsed.apply(&mut fresh, &mut delta).is_ok());

    assert_eq!(fresh.anchors().addr_of("mon.name"), Some(0x40));
    assert_eq!(fresh.anchors().format_of(0x40), Some("\"\"4"));
    assert_eq!(fresh.anchors().addr_of("free.space"), Some(0x100));
    assert_eq!(
      fresh.runs().at_start(0x40).map(|r| r.length()),
      Some(4)
    );
    assert_eq!(
      fresh.option_table("kinds").map(|t| t.len()),
      Some(2)
    );
    assert_eq!(
      fresh.matched_words().collect::<Vec<_>>(),
      vec![(0x80, "mon.count")]
    );
  }

  #[test]
  fn json5_is_tolerated() {
    let meta = Metadata::from_str(
      r#"{
        // hand-written metadata
        anchors: [
          { address: 0x40, name: "mon.name", format: '""4' },
        ],
      }"#,
    )
    .unwrap();
    assert_eq!(meta.anchors.len(), 1);
    assert_eq!(meta.anchors[0].address, 0x40);
    assert_eq!(meta.anchors[0].format, "\"\"4");
  }

  #[test]
  fn bad_entries_are_collected() {
    let meta = Metadata {
      anchors: vec![
        Anchor {
          address: 0x10,
          name: "ok".into(),
          format: String::new(),
        },
        Anchor {
          address: 0x20,
          name: "ok".into(), // duplicate name
          format: String::new(),
        },
      ],
      options: Vec::new(),
      matched_words: Vec::new(),
    };
    let mut model = Model::new(Rom::new(0x40));
    let mut delta = Delta::new();
    assert!(meta.apply(&mut model, &mut delta).is_err());
    // The good entry still landed.
    assert_eq!(model.anchors().addr_of("ok"), Some(0x10));
  }
}
