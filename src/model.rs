//! The model facade: the object everything else talks to.
//!
//! A `Model` owns the byte buffer, the run store, and the anchor
//! registry, and keeps the three consistent as a single transactional
//! unit. Every mutation flows through a [`Delta`] so that one logical
//! edit — however many bytes, runs, and names it touches — reverts as a
//! unit.
//!
//! The model is single-threaded and synchronous: every operation runs to
//! completion on the calling thread, and a failed operation leaves all
//! three structures exactly as they were.
//!
//! [`Delta`]: ../delta/struct.Delta.html

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::iter;

use crate::anchor;
use crate::anchor::AnchorError;
use crate::anchor::AnchorRegistry;
use crate::delta::Delta;
use crate::format;
use crate::format::FormatSpec;
use crate::int::Ptr;
use crate::rom::Rom;
use crate::run::store::ConflictError;
use crate::run::Run;
use crate::run::RunKind;
use crate::run::RunStore;
use crate::strategy;

/// An error produced by a model operation.
#[derive(Clone, Debug)]
pub enum ModelError {
  /// A run's span collided with an existing run. Unrecoverable at this
  /// layer: the old run must be explicitly cleared first.
  Conflict(ConflictError),
  /// An anchor binding failed.
  Anchor(AnchorError),
  /// A strategy rejected the existing bytes. Recoverable: whatever
  /// format previously covered the bytes still stands.
  Format(strategy::FormatError),
  /// A specifier string failed to parse.
  Parse(format::Error),
  /// A specifier parsed, but cannot be applied where it was found.
  UnsupportedFormat {
    /// The offending specifier.
    text: String,
  },
}

impl fmt::Display for ModelError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ModelError::Conflict(e) => e.fmt(f),
      ModelError::Anchor(e) => e.fmt(f),
      ModelError::Format(e) => e.fmt(f),
      ModelError::Parse(e) => e.fmt(f),
      ModelError::UnsupportedFormat { text } => {
        write!(f, "specifier {:?} cannot be applied here", text)
      }
    }
  }
}

impl From<ConflictError> for ModelError {
  fn from(e: ConflictError) -> Self {
    ModelError::Conflict(e)
  }
}

impl From<AnchorError> for ModelError {
  fn from(e: AnchorError) -> Self {
    ModelError::Anchor(e)
  }
}

impl From<strategy::FormatError> for ModelError {
  fn from(e: strategy::FormatError) -> Self {
    ModelError::Format(e)
  }
}

impl From<format::Error> for ModelError {
  fn from(e: format::Error) -> Self {
    ModelError::Parse(e)
  }
}

/// The annotated image: bytes, runs, and anchors as one unit.
pub struct Model {
  rom: Rom,
  runs: RunStore,
  anchors: AnchorRegistry,
  options: HashMap<String, Vec<String>>,
  matched_words: BTreeMap<usize, String>,
}

impl Model {
  /// Creates a model over `rom` with no annotations.
  pub fn new(rom: Rom) -> Self {
    Self {
      rom,
      runs: RunStore::new(),
      anchors: AnchorRegistry::new(),
      options: HashMap::new(),
      matched_words: BTreeMap::new(),
    }
  }

  /// Returns the underlying image.
  pub fn rom(&self) -> &Rom {
    &self.rom
  }

  /// Returns the run store.
  pub fn runs(&self) -> &RunStore {
    &self.runs
  }

  /// Returns the anchor registry.
  pub fn anchors(&self) -> &AnchorRegistry {
    &self.anchors
  }

  /// Returns the image length in bytes.
  pub fn len(&self) -> usize {
    self.rom.len()
  }

  /// Returns true if the image is empty.
  pub fn is_empty(&self) -> bool {
    self.rom.is_empty()
  }

  /// Gets the byte at `addr`, if it is within the image.
  pub fn byte(&self, addr: usize) -> Option<u8> {
    self.rom.get(addr)
  }

  pub(crate) fn set_byte(&mut self, addr: usize, value: u8) {
    self.rom.set(addr, value);
  }

  pub(crate) fn runs_mut(&mut self) -> &mut RunStore {
    &mut self.runs
  }

  pub(crate) fn anchors_mut(&mut self) -> &mut AnchorRegistry {
    &mut self.anchors
  }

  /// Looks up a named option table.
  pub fn option_table(&self, name: &str) -> Option<&[String]> {
    self.options.get(name).map(Vec::as_slice)
  }

  /// Installs a named option table, replacing any previous one.
  pub fn set_option_table(&mut self, name: &str, options: Vec<String>) {
    self.options.insert(name.to_owned(), options);
  }

  /// Returns an iterator over all option tables, unordered.
  pub fn option_tables(&self) -> impl Iterator<Item = (&str, &[String])> {
    self
      .options
      .iter()
      .map(|(name, options)| (name.as_str(), options.as_slice()))
  }

  /// Records a matched-word hint: the word at `addr` tracks `name`.
  pub fn add_matched_word(&mut self, addr: usize, name: &str) {
    self.matched_words.insert(addr, name.to_owned());
  }

  /// Returns an iterator over matched-word hints in address order.
  pub fn matched_words(&self) -> impl Iterator<Item = (usize, &str)> {
    self
      .matched_words
      .iter()
      .map(|(&addr, name)| (addr, name.as_str()))
  }

  /// Returns the run containing `addr`, or the next run after it, or
  /// `None` past the last run.
  pub fn get_next_run(&self, addr: usize) -> Option<&Run> {
    self.runs.next(addr)
  }

  /// Grows the image to `new_len` bytes.
  pub fn expand_data(&mut self, new_len: usize) {
    self.rom.expand(new_len);
  }

  /// Shrinks the image to `new_len` bytes.
  pub fn contract_data(&mut self, new_len: usize) {
    self.rom.contract(new_len);
  }

  /// Reverts `delta`, returning the inverse token that redoes it.
  pub fn revert(&mut self, delta: Delta) -> Delta {
    delta.revert(self)
  }

  /// Resolves `name` on behalf of the pointer at `requesting`.
  ///
  /// A bound name resolves to its address. An unbound name is *not* an
  /// error: an unmapped entry is recorded for `(requesting, name)` and
  /// the null sentinel comes back, to be patched when the anchor
  /// appears.
  pub fn get_address_from_anchor(
    &mut self,
    delta: &mut Delta,
    requesting: usize,
    name: &str,
  ) -> Ptr {
    if let Some(addr) = self.anchors.addr_of(name) {
      return Ptr::from_offset(addr);
    }

    if let Some(old) = self.anchors.unmapped_at(requesting).map(str::to_owned) {
      if old == name {
        return Ptr::NULL;
      }
      self.anchors.remove_unmapped(requesting);
      delta.remove_unmapped(requesting, old);
    }
    self.anchors.add_unmapped(requesting, name);
    delta.add_unmapped(requesting, name);
    Ptr::NULL
  }

  /// Records `run` in the store.
  ///
  /// A run starting where an existing run starts replaces it, inheriting
  /// any pointer sources the old run knew about. Anything else
  /// intersecting an existing span is a conflict, and the store is left
  /// untouched. Pointer runs additionally register themselves as a
  /// source at their destination, materializing a placeholder run there
  /// if the destination is unannotated.
  pub fn observe_run_written(
    &mut self,
    delta: &mut Delta,
    run: Run,
  ) -> Result<(), ConflictError> {
    let run = match self.runs.at_start(run.start()) {
      Some(existing) => {
        let run = match existing.sources() {
          Some(old_sources) => {
            let mut merged = old_sources.clone();
            if let Some(new_sources) = run.sources() {
              merged.extend(new_sources.iter().copied());
            }
            run.with_sources(merged)
          }
          None => run,
        };
        let old = match self.runs.replace(run.clone()) {
          Some(Ok(old)) => old,
          Some(Err(conflict)) => return Err(conflict),
          None => unreachable!(),
        };
        delta.remove_run(old);
        run
      }
      None => {
        self.runs.write(run.clone())?;
        run
      }
    };
    delta.add_run(run.clone());

    if let RunKind::Pointer { dest } = run.kind() {
      if let Some(dst) = dest.to_offset() {
        self.note_source(delta, dst, run.start());
      }
    }
    Ok(())
  }

  /// Remembers that the pointer at `source` references `dest`.
  fn note_source(&mut self, delta: &mut Delta, dest: usize, source: usize) {
    if dest >= self.rom.len() {
      return;
    }
    if self.runs.at_start(dest).is_some() {
      if let Some((old, new)) = self.runs.merge_source(dest, source) {
        if old != new {
          delta.remove_run(old);
          delta.add_run(new);
        }
      }
    } else if self.runs.at(dest).is_none() {
      let placeholder =
        Run::byte(dest).with_sources(iter::once(source).collect());
      if self.runs.write(placeholder.clone()).is_ok() {
        delta.add_run(placeholder);
      }
    }
  }

  /// Binds `name` at `addr` with the given format body, back-patching
  /// every pointer that was waiting for the name.
  ///
  /// Binding a name that is bound elsewhere fails with a duplicate-anchor
  /// error; renaming and merging are deliberately not offered. Any
  /// different name previously at `addr` is removed first. A non-empty
  /// `format` is parsed and applied to the bytes at `addr`; if the bytes
  /// reject it, the anchor stays bound, the format is dropped, and the
  /// rejection is reported.
  pub fn observe_anchor_written(
    &mut self,
    delta: &mut Delta,
    addr: usize,
    name: &str,
    format: &str,
  ) -> Result<(), ModelError> {
    if !anchor::is_valid_name(name) {
      return Err(
        AnchorError::BadName {
          name: name.to_owned(),
        }
        .into(),
      );
    }
    if let Some(existing) = self.anchors.addr_of(name) {
      if existing != addr {
        return Err(
          AnchorError::Duplicate {
            name: name.to_owned(),
            existing,
            attempted: addr,
          }
          .into(),
        );
      }
    }

    let prior = self.anchors.name_of(addr).map(str::to_owned);
    match prior.as_deref() {
      Some(p) if p != name => {
        let prior_format =
          self.anchors.format_of(addr).unwrap_or("").to_owned();
        self.anchors.unbind(addr);
        delta.remove_name(addr, p, prior_format);
        self.anchors.bind(addr, name)?;
        delta.add_name(addr, name, "");
      }
      Some(_) => {}
      None => {
        self.anchors.bind(addr, name)?;
        delta.add_name(addr, name, "");
      }
    }

    // Back-patch: every pointer that asked for this name before it
    // existed gets its destination bytes rewritten, its run replaced,
    // and its unmapped entry cleared, all within this delta.
    let sources = self.anchors.sources_waiting_for(name);
    let ptr = Ptr::from_offset(addr);
    for &source in &sources {
      for (i, byte) in ptr.to_le_bytes().iter().enumerate() {
        delta.change_data(self, source + i, *byte);
      }
      if let Some(old) = self.runs.at_start(source).cloned() {
        let new = old.redirect(ptr);
        if let Some(Ok(_)) = self.runs.replace(new.clone()) {
          delta.remove_run(old);
          delta.add_run(new);
        }
      }
      self.anchors.remove_unmapped(source);
      delta.remove_unmapped(source, name);
    }

    let mut outcome = Ok(());
    if !format.is_empty() {
      outcome = self.apply_anchor_format(delta, addr, name, format);
    }

    // Whatever run now covers the anchor must remember its sources. If
    // nothing covers it, a placeholder records them.
    for &source in &sources {
      self.note_source(delta, addr, source);
    }

    outcome
  }

  fn apply_anchor_format(
    &mut self,
    delta: &mut Delta,
    addr: usize,
    name: &str,
    format: &str,
  ) -> Result<(), ModelError> {
    let spec = format::parse(format)?;
    let strategy = match strategy::for_spec(&spec) {
      Some(strategy) => strategy,
      // A nested anchor declaration is not a data format.
      None => {
        return Err(ModelError::UnsupportedFormat {
          text: format.to_owned(),
        });
      }
    };

    match strategy.try_parse(self, addr) {
      Ok(run) => {
        let is_array = matches!(run.kind(), RunKind::Array { .. });
        self.observe_run_written(delta, run.clone())?;
        self.record_format_change(delta, addr, name, format);
        if is_array {
          strategy::array::materialize_children(self, delta, &run);
        }
        Ok(())
      }
      Err(e) => Err(ModelError::Format(e)),
    }
  }

  /// Updates the format recorded for the anchor at `addr`, keeping the
  /// delta's name bookkeeping faithful.
  ///
  /// The remove/add pair collapses to a plain addition when this delta
  /// bound the name itself, and to a format change when the binding
  /// predates the delta, so reverting restores exactly the prior
  /// binding.
  fn record_format_change(
    &mut self,
    delta: &mut Delta,
    addr: usize,
    name: &str,
    format: &str,
  ) {
    let old_format = self.anchors.format_of(addr).unwrap_or("").to_owned();
    self.anchors.set_format(addr, format);
    delta.remove_name(addr, name, old_format);
    delta.add_name(addr, name, format);
  }

  /// Interprets the existing bytes at `addr` according to `text`.
  ///
  /// `^name...` specifiers bind the anchor and then apply the body;
  /// everything else parses the bytes in place and records the run.
  pub fn annotate(
    &mut self,
    delta: &mut Delta,
    addr: usize,
    text: &str,
  ) -> Result<(), ModelError> {
    let spec = format::parse(text)?;
    match spec {
      FormatSpec::Anchor { name, inner } => {
        let body = inner.map(|b| b.to_string()).unwrap_or_default();
        self.observe_anchor_written(delta, addr, &name, &body)
      }
      spec => {
        let strategy = match strategy::for_spec(&spec) {
          Some(strategy) => strategy,
          None => unreachable!(),
        };
        let run = strategy.try_parse(self, addr)?;
        let is_array = matches!(run.kind(), RunKind::Array { .. });
        self.observe_run_written(delta, run.clone())?;
        if is_array {
          strategy::array::materialize_children(self, delta, &run);
        }
        Ok(())
      }
    }
  }

  /// Materializes `text` at `addr`, writing default content through
  /// `delta`.
  ///
  /// Unlike [`annotate`], this is the editing path: bytes are written,
  /// not just interpreted. Pointer specifiers targeting unbound names
  /// leave the null sentinel behind and wait in the unmapped table.
  ///
  /// [`annotate`]: #method.annotate
  pub fn write_format(
    &mut self,
    delta: &mut Delta,
    addr: usize,
    text: &str,
  ) -> Result<(), ModelError> {
    let spec = format::parse(text)?;
    match spec {
      FormatSpec::Anchor { name, inner } => {
        // Bind the name first so the body's own pointers can see it.
        self.observe_anchor_written(delta, addr, &name, "")?;
        if let Some(inner) = inner {
          let body = inner.to_string();
          self.write_body(delta, addr, &inner, &body)?;
          self.record_format_change(delta, addr, &name, &body);
        }
        Ok(())
      }
      spec => {
        let body = spec.to_string();
        self.write_body(delta, addr, &spec, &body)
      }
    }
  }

  fn write_body(
    &mut self,
    delta: &mut Delta,
    addr: usize,
    spec: &FormatSpec,
    text: &str,
  ) -> Result<(), ModelError> {
    let strategy = match strategy::for_spec(spec) {
      Some(strategy) => strategy,
      None => {
        return Err(ModelError::UnsupportedFormat {
          text: text.to_owned(),
        });
      }
    };

    // Refuse up front, before any byte is touched, so a conflict leaves
    // no partial mutation behind.
    let length = strategy.length_for_new_run(self, addr);
    self.runs.check(addr, length)?;

    let run = strategy.write_new_run(self, delta, addr)?;
    let is_array = matches!(run.kind(), RunKind::Array { .. });
    self.observe_run_written(delta, run.clone())?;
    if is_array {
      strategy::array::materialize_children(self, delta, &run);
    }
    Ok(())
  }

  /// Removes the run starting at `start`, recording the removal.
  ///
  /// This is the explicit clearing step a caller performs before writing
  /// a conflicting format.
  pub fn clear_run(&mut self, delta: &mut Delta, start: usize) -> Option<Run> {
    let run = self.runs.remove(start)?;
    delta.remove_run(run.clone());
    Some(run)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  /// Everything observable about a model, for whole-state comparisons.
  fn snapshot(
    model: &Model,
  ) -> (
    Vec<u8>,
    Vec<Run>,
    Vec<(usize, String, String)>,
    Vec<(usize, String)>,
  ) {
    (
      model.rom().bytes().to_vec(),
      model.runs().iter().cloned().collect(),
      model
        .anchors()
        .anchors()
        .map(|(a, n, f)| (a, n.to_owned(), f.to_owned()))
        .collect(),
      model
        .anchors()
        .unmapped()
        .map(|(s, n)| (s, n.to_owned()))
        .collect(),
    )
  }

  #[test]
  fn forward_reference_resolution() {
    let mut model = Model::new(Rom::new(0x600));
    let mut delta = Delta::new();

    // Write a pointer to a name that does not exist yet.
    model.write_format(&mut delta, 0x100, "<foo>").unwrap();
    assert!(model.rom().get_ptr(0x100).unwrap().is_null());
    assert_eq!(model.anchors().unmapped_at(0x100), Some("foo"));

    // Bind the name; the pointer self-heals within the same delta.
    model
      .observe_anchor_written(&mut delta, 0x500, "foo", "")
      .unwrap();
    assert_eq!(
      model.rom().get_ptr(0x100).unwrap().to_offset(),
      Some(0x500)
    );
    assert_eq!(model.anchors().unmapped_at(0x100), None);
    assert_eq!(model.anchors().sources_waiting_for("foo"), Vec::new());

    // The pointer run tracks the destination, and the destination run
    // tracks its source.
    match model.runs().at_start(0x100).unwrap().kind() {
      RunKind::Pointer { dest } => assert_eq!(dest.to_offset(), Some(0x500)),
      _ => panic!("not a pointer"),
    }
    assert!(model
      .runs()
      .at_start(0x500)
      .unwrap()
      .sources()
      .unwrap()
      .contains(&0x100));
  }

  #[test]
  fn undo_symmetry() {
    let mut model = Model::new(Rom::new(0x600));
    let before = snapshot(&model);

    let mut delta = Delta::new();
    model.write_format(&mut delta, 0x100, "<foo>").unwrap();
    model
      .observe_anchor_written(&mut delta, 0x500, "foo", "\"\"4")
      .unwrap();
    let after = snapshot(&model);
    assert_ne!(before, after);

    // Revert restores the original state byte-for-byte and
    // structurally; reverting the inverse restores the edit.
    let redo = model.revert(delta);
    assert_eq!(snapshot(&model), before);

    let undo = model.revert(redo);
    assert_eq!(snapshot(&model), after);

    model.revert(undo);
    assert_eq!(snapshot(&model), before);
  }

  #[test]
  fn conflict_rejection() {
    let mut model = Model::new(Rom::new(0x100));
    let mut delta = Delta::new();

    model.write_format(&mut delta, 0x11, "\"\"4").unwrap();
    let before = snapshot(&model);

    // A four-byte run at 0x10 would intrude on [0x11, 0x15).
    let err = model.write_format(&mut delta, 0x10, "<000080>").unwrap_err();
    match err {
      ModelError::Conflict(conflict) => {
        assert_eq!(conflict.existing_start, 0x11);
      }
      other => panic!("expected conflict, got {:?}", other),
    }

    // Store, bytes, everything: untouched.
    assert_eq!(snapshot(&model), before);
    assert_eq!(model.get_next_run(0x10).unwrap().start(), 0x11);

    // Clearing the old run first makes room.
    model.clear_run(&mut delta, 0x11).unwrap();
    model.write_format(&mut delta, 0x10, "<000080>").unwrap();
    assert_eq!(model.get_next_run(0x10).unwrap().start(), 0x10);
  }

  #[test]
  fn duplicate_anchor_rejected() {
    let mut model = Model::new(Rom::new(0x100));
    let mut delta = Delta::new();

    model
      .observe_anchor_written(&mut delta, 0x10, "foo", "")
      .unwrap();
    let err = model
      .observe_anchor_written(&mut delta, 0x20, "foo", "")
      .unwrap_err();
    match err {
      ModelError::Anchor(AnchorError::Duplicate {
        existing,
        attempted,
        ..
      }) => {
        assert_eq!((existing, attempted), (0x10, 0x20));
      }
      other => panic!("expected duplicate, got {:?}", other),
    }
    // Rebinding the same address under a new name replaces the old one.
    model
      .observe_anchor_written(&mut delta, 0x10, "bar", "")
      .unwrap();
    assert_eq!(model.anchors().name_of(0x10), Some("bar"));
    assert_eq!(model.anchors().addr_of("foo"), None);
  }

  #[test]
  fn rejected_format_keeps_anchor() {
    let mut model = Model::new(Rom::new(0x100));
    model.set_byte(0x10, 0x1c); // not text
    let mut delta = Delta::new();

    let err = model
      .observe_anchor_written(&mut delta, 0x10, "foo", "\"\"4")
      .unwrap_err();
    assert!(matches!(err, ModelError::Format(_)));

    // The anchor stands; the format does not.
    assert_eq!(model.anchors().name_of(0x10), Some("foo"));
    assert_eq!(model.anchors().format_of(0x10), None);
    assert!(model.runs().at_start(0x10).is_none());
  }

  #[test]
  fn format_change_reverts_to_prior_binding() {
    let mut model = Model::new(Rom::new(0x100));
    let mut first = Delta::new();
    model
      .observe_anchor_written(&mut first, 0x10, "foo", "")
      .unwrap();

    let mut second = Delta::new();
    model
      .observe_anchor_written(&mut second, 0x10, "foo", "\"\"4")
      .unwrap();
    assert_eq!(model.anchors().format_of(0x10), Some("\"\"4"));

    // The binding predates the second delta, so it survives the revert
    // with its old, empty format.
    model.revert(second);
    assert_eq!(model.anchors().name_of(0x10), Some("foo"));
    assert_eq!(model.anchors().format_of(0x10), None);
    assert!(model.runs().at_start(0x10).is_none());
  }

  #[test]
  fn lookup_past_end() {
    let model = Model::new(Rom::new(0x10));
    assert!(model.get_next_run(0x8).is_none());
    assert_eq!(model.byte(0x10), None);
  }
}
