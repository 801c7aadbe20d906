//! Read-only metadata groups.

use crate::column::{Column, Records};
use crate::{Error, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Named metadata entries of a channel or file.
///
/// Entries keep their stored element type, scalars and strings included.
/// Values are read on first access and cached per object. The cache is
/// unbounded; [`Meta::invalidate`] clears it and [`Meta::close`] additionally
/// guards every entry so later reads fail with a closed-file error.
pub struct Meta {
    entries: RefCell<Vec<(String, Column)>>,
    cache: RefCell<HashMap<String, Records>>,
}

impl Meta {
    /// Creates a metadata group from named entries.
    #[must_use]
    pub fn new(entries: Vec<(String, Column)>) -> Self {
        Self {
            entries: RefCell::new(entries),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Entry names in storage order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns true when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Returns true if an entry called `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.borrow().iter().any(|(n, _)| n == name)
    }

    /// Full value of the entry `name`.
    ///
    /// # Errors
    /// Returns [`Error::KeyNotFound`] for unknown names, or the read error of
    /// the entry (a closed-file error after [`Meta::close`]).
    pub fn get(&self, name: &str) -> Result<Records> {
        if let Some(value) = self.cache.borrow().get(name) {
            return Ok(value.clone());
        }
        let source = self
            .entries
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, source)| source.clone())
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        let value = source.read_all()?;
        self.cache
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Number of cached values.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Drops every cached value.
    pub fn invalidate(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Guards every entry and drops the cache.
    pub fn close(&self) {
        for (_, source) in self.entries.borrow_mut().iter_mut() {
            *source = source.guard();
        }
        self.invalidate();
    }
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Meta: {} entries", self.len())
    }
}

impl fmt::Debug for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meta")
            .field("names", &self.names())
            .field("cached", &self.cached())
            .finish()
    }
}
