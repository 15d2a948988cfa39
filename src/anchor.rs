//! The anchor registry: names for addresses, and the pointers still
//! waiting for one.
//!
//! An *anchor* binds a human-readable name to exactly one address, both
//! directions unique. Alongside the bindings the registry keeps the
//! *unmapped pointer* table: every pointer that was written against a name
//! before the name existed. The moment the name is bound, the model walks
//! that table and back-patches each waiting pointer, so forward references
//! heal themselves without anyone revisiting the call sites.
//!
//! The registry is plain owned state inside the model; operations that
//! need resolution receive it explicitly.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
  static ref NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9._]*$").unwrap();
  static ref HEX_ADDR: Regex = Regex::new(r"^[0-9A-Fa-f]{6,8}$").unwrap();
}

/// Returns true if `name` is usable as an anchor name.
///
/// Names are dotted identifiers. Anything that reads as a bare hex
/// address is rejected, since pointer specifiers accept either form and
/// addresses must win.
pub fn is_valid_name(name: &str) -> bool {
  NAME.is_match(name) && !HEX_ADDR.is_match(name)
}

/// An error produced while binding an anchor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AnchorError {
  /// The name is already bound to a different address.
  Duplicate {
    /// The contested name.
    name: String,
    /// Where the name already points.
    existing: usize,
    /// Where the new binding wanted it to point.
    attempted: usize,
  },
  /// The name is not a legal anchor name.
  BadName {
    /// The offending name.
    name: String,
  },
}

impl fmt::Display for AnchorError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      AnchorError::Duplicate {
        name,
        existing,
        attempted,
      } => write!(
        f,
        "anchor {} is already bound to {:#x}, cannot bind {:#x}",
        name, existing, attempted
      ),
      AnchorError::BadName { name } => {
        write!(f, "{:?} is not a valid anchor name", name)
      }
    }
  }
}

/// The name↔address registry plus the unmapped-pointer table.
#[derive(Clone, Debug, Default)]
pub struct AnchorRegistry {
  names: HashMap<String, usize>,
  addrs: BTreeMap<usize, String>,
  formats: HashMap<usize, String>,

  unmapped_by_source: BTreeMap<usize, String>,
  unmapped_by_name: HashMap<String, BTreeSet<usize>>,
}

impl AnchorRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Looks up the address bound to `name`.
  pub fn addr_of(&self, name: &str) -> Option<usize> {
    self.names.get(name).copied()
  }

  /// Looks up the name bound to `addr`.
  pub fn name_of(&self, addr: usize) -> Option<&str> {
    self.addrs.get(&addr).map(String::as_str)
  }

  /// Looks up the format string recorded for the anchor at `addr`.
  pub fn format_of(&self, addr: usize) -> Option<&str> {
    self.formats.get(&addr).map(String::as_str)
  }

  /// Records `format` for the anchor at `addr`; empty clears.
  pub fn set_format(&mut self, addr: usize, format: &str) {
    if format.is_empty() {
      self.formats.remove(&addr);
    } else {
      self.formats.insert(addr, format.to_owned());
    }
  }

  /// Binds `name` to `addr`.
  ///
  /// Fails if the name is invalid or bound elsewhere. Binding the name it
  /// already holds at `addr` is a no-op. Any *other* name at `addr` must
  /// be removed by the caller first; this method asserts the slot is
  /// free.
  pub fn bind(&mut self, addr: usize, name: &str) -> Result<(), AnchorError> {
    if !is_valid_name(name) {
      return Err(AnchorError::BadName {
        name: name.to_owned(),
      });
    }
    if let Some(&existing) = self.names.get(name) {
      if existing == addr {
        return Ok(());
      }
      return Err(AnchorError::Duplicate {
        name: name.to_owned(),
        existing,
        attempted: addr,
      });
    }

    debug_assert!(!self.addrs.contains_key(&addr));
    self.names.insert(name.to_owned(), addr);
    self.addrs.insert(addr, name.to_owned());
    Ok(())
  }

  /// Removes the binding at `addr`, returning the name it held.
  pub fn unbind(&mut self, addr: usize) -> Option<String> {
    let name = self.addrs.remove(&addr)?;
    self.names.remove(&name);
    self.formats.remove(&addr);
    Some(name)
  }

  /// Returns an iterator over `(address, name, format)` triples in
  /// address order.
  pub fn anchors(&self) -> impl Iterator<Item = (usize, &str, &str)> {
    self.addrs.iter().map(move |(&addr, name)| {
      (
        addr,
        name.as_str(),
        self.formats.get(&addr).map(String::as_str).unwrap_or(""),
      )
    })
  }

  /// Returns the number of bound anchors.
  pub fn len(&self) -> usize {
    self.addrs.len()
  }

  /// Returns true if no anchors are bound.
  pub fn is_empty(&self) -> bool {
    self.addrs.is_empty()
  }

  /// Records that the pointer at `source` is waiting for `name`.
  pub fn add_unmapped(&mut self, source: usize, name: &str) {
    self.unmapped_by_source.insert(source, name.to_owned());
    self
      .unmapped_by_name
      .entry(name.to_owned())
      .or_insert_with(BTreeSet::new)
      .insert(source);
  }

  /// Clears the unmapped entry at `source`, returning the name it was
  /// waiting for.
  pub fn remove_unmapped(&mut self, source: usize) -> Option<String> {
    let name = self.unmapped_by_source.remove(&source)?;
    if let Some(sources) = self.unmapped_by_name.get_mut(&name) {
      sources.remove(&source);
      if sources.is_empty() {
        self.unmapped_by_name.remove(&name);
      }
    }
    Some(name)
  }

  /// Returns the sources currently waiting for `name`, in address order.
  pub fn sources_waiting_for(&self, name: &str) -> Vec<usize> {
    self
      .unmapped_by_name
      .get(name)
      .map(|s| s.iter().copied().collect())
      .unwrap_or_default()
  }

  /// Returns the name the pointer at `source` is waiting for, if any.
  pub fn unmapped_at(&self, source: usize) -> Option<&str> {
    self.unmapped_by_source.get(&source).map(String::as_str)
  }

  /// Returns an iterator over `(source, name)` unmapped entries in source
  /// order.
  pub fn unmapped(&self) -> impl Iterator<Item = (usize, &str)> {
    self
      .unmapped_by_source
      .iter()
      .map(|(&source, name)| (source, name.as_str()))
  }
}
