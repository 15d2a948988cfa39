//! Change tokens: the reversible record of one logical edit.
//!
//! A `Delta` accumulates everything a logical edit touches: the prior
//! value of every byte the first time it is written, plus every run,
//! anchor name, and unmapped-pointer entry added or removed. Reverting a
//! delta replays all of that backwards onto the model and hands back the
//! exact inverse token, so revert-of-revert toggles the model between two
//! states forever. Grouping deltas into an undo stack is the owning
//! editor's policy; this type only guarantees the symmetry.
//!
//! Two algorithmic contracts matter here and are load-bearing for undo
//! correctness:
//!
//! * **First touch wins.** `change_data` captures a byte's prior value
//!   only the first time that index is touched within the delta.
//! * **Add/remove cancellation.** Removing something that was added
//!   earlier in the *same* delta nets out to nothing recorded, and
//!   vice versa.

use std::collections::HashMap;

use crate::model::Model;
use crate::run::Run;

/// A record of an anchor binding: the name and its format string.
type NameEntry = (String, String);

/// A reversible record of one logical edit.
#[derive(Clone, Debug, Default)]
pub struct Delta {
  bytes: HashMap<usize, u8>,
  added_runs: HashMap<usize, Run>,
  removed_runs: HashMap<usize, Run>,
  added_names: HashMap<usize, NameEntry>,
  removed_names: HashMap<usize, NameEntry>,
  added_unmapped: HashMap<usize, String>,
  removed_unmapped: HashMap<usize, String>,
}

impl Delta {
  /// Creates an empty delta.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns true if this delta has recorded any change at all.
  pub fn has_changes(&self) -> bool {
    !self.bytes.is_empty()
      || !self.added_runs.is_empty()
      || !self.removed_runs.is_empty()
      || !self.added_names.is_empty()
      || !self.removed_names.is_empty()
      || !self.added_unmapped.is_empty()
      || !self.removed_unmapped.is_empty()
  }

  /// Writes `value` at `index`, capturing the prior byte if this is the
  /// first time the delta touches that index.
  ///
  /// Out-of-range writes are ignored; callers expand the image first.
  pub fn change_data(&mut self, model: &mut Model, index: usize, value: u8) {
    if let Some(old) = model.byte(index) {
      self.bytes.entry(index).or_insert(old);
      model.set_byte(index, value);
    }
  }

  /// Records that `run` was added to the store.
  pub fn add_run(&mut self, run: Run) {
    if self.removed_runs.get(&run.start()) == Some(&run) {
      self.removed_runs.remove(&run.start());
      return;
    }
    self.added_runs.insert(run.start(), run);
  }

  /// Records that `run` was removed from the store.
  ///
  /// Removing a run added earlier in this delta cancels the addition.
  pub fn remove_run(&mut self, run: Run) {
    if self.added_runs.remove(&run.start()).is_some() {
      return;
    }
    self.removed_runs.entry(run.start()).or_insert(run);
  }

  /// Records that `name` (with `format`) was bound at `addr`.
  pub fn add_name(
    &mut self,
    addr: usize,
    name: impl Into<String>,
    format: impl Into<String>,
  ) {
    let entry = (name.into(), format.into());
    if self.removed_names.get(&addr) == Some(&entry) {
      self.removed_names.remove(&addr);
      return;
    }
    self.added_names.insert(addr, entry);
  }

  /// Records that `name` (with `format`) was unbound from `addr`.
  ///
  /// Unbinding a name bound earlier in this delta cancels the addition.
  pub fn remove_name(
    &mut self,
    addr: usize,
    name: impl Into<String>,
    format: impl Into<String>,
  ) {
    if self.added_names.remove(&addr).is_some() {
      return;
    }
    self
      .removed_names
      .entry(addr)
      .or_insert((name.into(), format.into()));
  }

  /// Records that the pointer at `source` started waiting for `name`.
  pub fn add_unmapped(&mut self, source: usize, name: impl Into<String>) {
    let name = name.into();
    if self.removed_unmapped.get(&source) == Some(&name) {
      self.removed_unmapped.remove(&source);
      return;
    }
    self.added_unmapped.insert(source, name);
  }

  /// Records that the pointer at `source` stopped waiting for `name`.
  pub fn remove_unmapped(&mut self, source: usize, name: impl Into<String>) {
    if self.added_unmapped.remove(&source).is_some() {
      return;
    }
    self.removed_unmapped.entry(source).or_insert(name.into());
  }

  /// Returns the lowest address this delta touched.
  ///
  /// Added names are considered first, then added non-placeholder runs,
  /// then added unmapped pointers, then the removed variants of each, and
  /// finally raw byte writes. Consumers use this to re-focus a viewport
  /// after an undo or redo.
  pub fn earliest_change(&self) -> Option<usize> {
    let scans: [Option<usize>; 7] = [
      self.added_names.keys().min().copied(),
      self
        .added_runs
        .values()
        .filter(|r| !r.is_placeholder())
        .map(Run::start)
        .min(),
      self.added_unmapped.keys().min().copied(),
      self.removed_names.keys().min().copied(),
      self.removed_runs.keys().min().copied(),
      self.removed_unmapped.keys().min().copied(),
      self.bytes.keys().min().copied(),
    ];
    scans.iter().find_map(|scan| *scan)
  }

  /// Replays this delta backwards onto `model`, restoring the state it
  /// started from.
  ///
  /// Returns the inverse delta: reverting that token redoes this one.
  pub fn revert(self, model: &mut Model) -> Delta {
    let Delta {
      bytes,
      added_runs,
      removed_runs,
      added_names,
      removed_names,
      added_unmapped,
      removed_unmapped,
    } = self;

    // Undo the structural changes. Added things come out before removed
    // things go back in, so spans and names are free by the time they are
    // needed again.
    for &addr in added_names.keys() {
      model.anchors_mut().unbind(addr);
    }
    for (&addr, (name, format)) in &removed_names {
      // The binding cannot fail: this delta is the record of the edit
      // that removed it.
      let _ = model.anchors_mut().bind(addr, name);
      model.anchors_mut().set_format(addr, format);
    }
    for &start in added_runs.keys() {
      model.runs_mut().remove(start);
    }
    for run in removed_runs.values() {
      let _ = model.runs_mut().write(run.clone());
    }
    for &source in added_unmapped.keys() {
      model.anchors_mut().remove_unmapped(source);
    }
    for (&source, name) in &removed_unmapped {
      model.anchors_mut().add_unmapped(source, name);
    }

    // The structural halves of the inverse are the mirror image of this
    // delta's. The byte half is rebuilt through `change_data` so the
    // inverse captures the values being overwritten right now.
    let mut inverse = Delta {
      bytes: HashMap::new(),
      added_runs: removed_runs,
      removed_runs: added_runs,
      added_names: removed_names,
      removed_names: added_names,
      added_unmapped: removed_unmapped,
      removed_unmapped: added_unmapped,
    };
    for (index, old) in bytes {
      inverse.change_data(model, index, old);
    }
    inverse
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::model::Model;
  use crate::rom::Rom;

  #[test]
  fn first_touch_wins() {
    let mut model = Model::new(Rom::filled_with(0x11, 4));
    let mut delta = Delta::new();

    delta.change_data(&mut model, 2, 0x22);
    delta.change_data(&mut model, 2, 0x33);
    assert_eq!(model.byte(2), Some(0x33));

    let redo = delta.revert(&mut model);
    // The first-touch capture restores the original, not the midpoint.
    assert_eq!(model.byte(2), Some(0x11));

    let undo = redo.revert(&mut model);
    assert_eq!(model.byte(2), Some(0x33));
    undo.revert(&mut model);
    assert_eq!(model.byte(2), Some(0x11));
  }

  #[test]
  fn add_remove_cancellation() {
    let mut delta = Delta::new();
    let run = Run::byte(0x10);

    delta.add_run(run.clone());
    delta.remove_run(run);
    assert!(!delta.has_changes());

    delta.add_unmapped(0x20, "foo");
    delta.remove_unmapped(0x20, "foo");
    assert!(!delta.has_changes());

    delta.add_name(0x30, "bar", "");
    delta.remove_name(0x30, "bar", "");
    assert!(!delta.has_changes());
  }

  #[test]
  fn replacement_records_both_sides() {
    let mut delta = Delta::new();
    let old = Run::byte(0x10);
    let new = old.merge_source(0x100);

    delta.remove_run(old);
    delta.add_run(new);
    assert!(delta.has_changes());
    assert_eq!(delta.earliest_change(), Some(0x10));
  }

  #[test]
  fn earliest_change_priority() {
    let mut delta = Delta::new();
    let mut model = Model::new(Rom::new(0x100));

    delta.change_data(&mut model, 0x05, 1);
    assert_eq!(delta.earliest_change(), Some(0x05));

    // A placeholder run does not outrank bytes...
    delta.add_run(Run::byte(0x50));
    assert_eq!(delta.earliest_change(), Some(0x05));
    // ...but a formatted run does.
    delta.add_run(Run::byte(0x60).with_format("\"\"1"));
    assert_eq!(delta.earliest_change(), Some(0x60));

    // Names outrank everything.
    delta.add_name(0x70, "foo", "");
    assert_eq!(delta.earliest_change(), Some(0x70));
  }
}
