//! Closed-file guard for record sources.
//!
//! When a file is closed, every handle a channel holds is swapped for a
//! [`ClosedHandle`]. The guard keeps the wrapped handle around for inspection
//! but turns every access into a [`ClosedError`] naming the file and group the
//! handle came from.

use crate::error::{describe, ClosedError};
use crate::source::{Dtype, RecordSource, SourceRef};
use crate::Result;
use ndarray::ArrayD;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

/// A record source whose owning file has been closed.
pub struct ClosedHandle<T> {
    inner: SourceRef<T>,
    names: ClosedError,
}

impl<T> Clone for ClosedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            names: self.names.clone(),
        }
    }
}

impl<T: 'static> ClosedHandle<T> {
    /// Guards `source`, capturing its file and array names.
    ///
    /// Names are captured while the store can still report them. Guarding an
    /// already guarded source copies its captured names instead of nesting.
    #[must_use]
    pub fn wrap(source: SourceRef<T>) -> Self {
        if let Some(closed) = source.as_closed() {
            return closed.clone();
        }
        let names = ClosedError {
            file_name: source.file_name(),
            group_name: source.name(),
        };
        Self {
            inner: source,
            names,
        }
    }

    /// Guards `source` and returns it as a shared handle.
    #[must_use]
    pub fn guard(source: SourceRef<T>) -> SourceRef<T> {
        Rc::new(Self::wrap(source))
    }
}

impl<T> ClosedHandle<T> {
    /// The handle that was live before the file closed.
    #[must_use]
    pub fn inner(&self) -> &SourceRef<T> {
        &self.inner
    }

    /// File name captured at close time.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.names.file_name.as_deref()
    }

    /// Group (array path) captured at close time.
    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        self.names.group_name.as_deref()
    }

    fn fail<R>(&self) -> Result<R> {
        Err(self.names.clone().into())
    }
}

impl<T> fmt::Display for ClosedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Closed HDF5 {} from {}",
            describe("group", &self.names.group_name),
            describe("file", &self.names.file_name)
        )
    }
}

impl<T> fmt::Debug for ClosedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedHandle")
            .field("file_name", &self.names.file_name)
            .field("group_name", &self.names.group_name)
            .finish_non_exhaustive()
    }
}

impl<T> RecordSource<T> for ClosedHandle<T> {
    fn shape(&self) -> Result<Vec<usize>> {
        self.fail()
    }

    fn dtype(&self) -> Result<Dtype> {
        self.fail()
    }

    fn name(&self) -> Option<String> {
        None
    }

    fn file_name(&self) -> Option<String> {
        None
    }

    fn read_range(&self, _range: Range<usize>) -> Result<ArrayD<T>> {
        self.fail()
    }

    fn read_coords(&self, _coords: &[usize]) -> Result<ArrayD<T>> {
        self.fail()
    }

    fn read_mask(&self, _mask: &[bool]) -> Result<ArrayD<T>> {
        self.fail()
    }

    fn as_closed(&self) -> Option<&ClosedHandle<T>> {
        Some(self)
    }
}
