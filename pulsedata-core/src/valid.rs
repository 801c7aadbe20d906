//! Valid-position selectors.
//!
//! A channel exposes only the records at its valid positions. [`Valid::All`]
//! is the allocation-free default that means "every on-disk record";
//! [`Valid::Explicit`] carries an ascending list of positions.

use crate::{Error, Result};
use std::rc::Rc;

/// Which on-disk records of a channel currently participate in reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Valid {
    /// Every position `0..ntotal`.
    #[default]
    All,
    /// Ascending positions into `0..ntotal`.
    Explicit(Rc<[usize]>),
}

impl Valid {
    /// Builds an explicit selector after checking it against `ntotal` records.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPositions`] if `positions` is not sorted
    /// ascending or contains a position `>= ntotal`.
    pub fn explicit(positions: impl Into<Vec<usize>>, ntotal: usize) -> Result<Self> {
        let positions = positions.into();
        check_positions(&positions, ntotal)?;
        Ok(Self::Explicit(positions.into()))
    }

    /// Checks the selector against a channel with `ntotal` records.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPositions`] if explicit positions are not
    /// sorted ascending or contain a position `>= ntotal`.
    pub fn check(&self, ntotal: usize) -> Result<()> {
        match self {
            Self::All => Ok(()),
            Self::Explicit(positions) => check_positions(positions, ntotal),
        }
    }

    /// Returns true for the "all positions" sentinel.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Explicit positions, or `None` for [`Valid::All`].
    #[must_use]
    pub fn as_slice(&self) -> Option<&[usize]> {
        match self {
            Self::All => None,
            Self::Explicit(positions) => Some(&positions[..]),
        }
    }

    /// Number of valid positions out of `ntotal` records.
    #[must_use]
    pub fn count(&self, ntotal: usize) -> usize {
        match self {
            Self::All => ntotal,
            Self::Explicit(positions) => positions.len(),
        }
    }

    /// Resolves the selector against a channel with `ntotal` records.
    #[must_use]
    pub fn resolve(&self, ntotal: usize) -> Positions {
        match self {
            Self::All => Positions::Span(ntotal),
            Self::Explicit(positions) => Positions::List(Rc::clone(positions)),
        }
    }
}

fn check_positions(positions: &[usize], ntotal: usize) -> Result<()> {
    if let Some(pair) = positions.windows(2).find(|pair| pair[0] > pair[1]) {
        return Err(Error::InvalidPositions(format!(
            "positions must be sorted ascending, found {} before {}",
            pair[0], pair[1]
        )));
    }
    // sorted, so the last position bounds all others
    if let Some(&last) = positions.last() {
        if last >= ntotal {
            return Err(Error::InvalidPositions(format!(
                "position {last} is out of range for {ntotal} records"
            )));
        }
    }
    Ok(())
}

/// A resolved, ascending list of on-disk positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Positions {
    /// `0..n`, never materialized.
    Span(usize),
    /// Explicit ascending positions.
    List(Rc<[usize]>),
}

impl Positions {
    /// Number of positions.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Span(n) => *n,
            Self::List(list) => list.len(),
        }
    }

    /// Returns true when no position is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position at index `i` of the list.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<usize> {
        match self {
            Self::Span(n) => (i < *n).then_some(i),
            Self::List(list) => list.get(i).copied(),
        }
    }

    /// Positions at indices `range`; `None` for a span, which is contiguous
    /// on disk anyway.
    #[must_use]
    pub fn sub_list(&self, range: std::ops::Range<usize>) -> Option<&[usize]> {
        match self {
            Self::Span(_) => None,
            Self::List(list) => list.get(range),
        }
    }

    /// Iterates over the positions in order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let (span, list) = match self {
            Self::Span(n) => (0..*n, &[][..]),
            Self::List(list) => (0..0, &list[..]),
        };
        span.chain(list.iter().copied())
    }

    /// Materializes the positions.
    #[must_use]
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl From<Vec<usize>> for Positions {
    fn from(positions: Vec<usize>) -> Self {
        Self::List(positions.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all() {
        let valid = Valid::default();
        assert!(valid.is_all());
        assert_eq!(valid.count(7), 7);
        assert_eq!(valid.resolve(3).to_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn explicit_positions_are_checked() {
        assert!(Valid::explicit(vec![0, 2], 3).is_ok());
        assert!(matches!(
            Valid::explicit(vec![2, 0], 3),
            Err(Error::InvalidPositions(_))
        ));
        assert!(matches!(
            Valid::explicit(vec![0, 3], 3),
            Err(Error::InvalidPositions(_))
        ));
        assert_eq!(Valid::explicit(Vec::new(), 0).unwrap().count(0), 0);
    }

    #[test]
    fn unchecked_selectors_are_checked_late() {
        let unsorted = Valid::Explicit(vec![7, 0].into());
        assert!(matches!(unsorted.check(3), Err(Error::InvalidPositions(_))));
        let beyond = Valid::Explicit(vec![0, 5].into());
        assert!(matches!(beyond.check(3), Err(Error::InvalidPositions(_))));
        assert!(Valid::All.check(0).is_ok());
        assert!(Valid::Explicit(vec![0, 2].into()).check(3).is_ok());
    }

    #[test]
    fn positions_lookup() {
        let span = Positions::Span(4);
        assert_eq!(span.get(3), Some(3));
        assert_eq!(span.get(4), None);
        assert_eq!(span.sub_list(0..2), None);

        let list = Positions::from(vec![1, 5, 9]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(1), Some(5));
        assert_eq!(list.sub_list(1..3), Some(&[5, 9][..]));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![1, 5, 9]);
    }
}
