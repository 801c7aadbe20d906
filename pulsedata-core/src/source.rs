//! Capability interface over the position-addressed arrays of a backing store.
//!
//! Every array a channel reads from (pulse ids, data records, timestamps,
//! metadata entries) is accessed through [`RecordSource`]. Live store handles,
//! the in-memory store and the closed-file guard all implement it.

use crate::guard::ClosedHandle;
use crate::{Error, Result};
use ndarray::{ArrayD, Axis, Slice};
use std::cell::Cell;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shared handle to a record source.
pub type SourceRef<T> = Rc<dyn RecordSource<T>>;

/// Element type of an array as stored on disk.
///
/// Sizes are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dtype {
    Bool,
    Int(u8),
    UInt(u8),
    Float(u8),
    String,
    Other,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int(size) => write!(f, "int{}", u32::from(*size) * 8),
            Self::UInt(size) => write!(f, "uint{}", u32::from(*size) * 8),
            Self::Float(size) => write!(f, "float{}", u32::from(*size) * 8),
            Self::String => write!(f, "str"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Read access to an array whose axis 0 enumerates records.
///
/// Implementations only need to provide contiguous range reads and coordinate
/// reads; boolean masks are supported on rank-1 arrays only, matching what
/// HDF5 can do natively on the leading axis.
pub trait RecordSource<T> {
    /// Full on-disk shape.
    ///
    /// # Errors
    /// Returns an error if the handle is no longer usable.
    fn shape(&self) -> Result<Vec<usize>>;

    /// Stored element type.
    ///
    /// # Errors
    /// Returns an error if the handle is no longer usable.
    fn dtype(&self) -> Result<Dtype>;

    /// Path of the array inside its file, if the store can still report it.
    fn name(&self) -> Option<String>;

    /// Name of the owning file, if the store can still report it.
    fn file_name(&self) -> Option<String>;

    /// Reads the records `range` in one contiguous read.
    ///
    /// # Errors
    /// Returns an error if the range exceeds the array or the read fails.
    fn read_range(&self, range: Range<usize>) -> Result<ArrayD<T>>;

    /// Reads the records at the given ascending positions.
    ///
    /// # Errors
    /// Returns an error if a position exceeds the array or the read fails.
    fn read_coords(&self, coords: &[usize]) -> Result<ArrayD<T>>;

    /// Reads the records selected by a boolean mask over axis 0.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedSelection`] for arrays of rank 2 or more,
    /// and an error if the mask length differs from the record count.
    fn read_mask(&self, mask: &[bool]) -> Result<ArrayD<T>> {
        let shape = self.shape()?;
        if shape.len() != 1 {
            return Err(Error::UnsupportedSelection(format!(
                "boolean mask on the leading axis of a rank-{} array",
                shape.len()
            )));
        }
        check_mask_len(mask, shape[0])?;
        let coords: Vec<usize> = true_positions(mask);
        self.read_coords(&coords)
    }

    /// Number of records (length of axis 0).
    ///
    /// # Errors
    /// Returns an error if the handle is no longer usable.
    fn nrecords(&self) -> Result<usize> {
        Ok(self.shape()?.first().copied().unwrap_or(0))
    }

    /// Reads the whole array.
    ///
    /// Stores holding scalar (rank-0) arrays override this; the default only
    /// covers arrays with a record axis.
    ///
    /// # Errors
    /// Returns an error if the read fails, and
    /// [`Error::UnsupportedSelection`] for a scalar array.
    fn read_all(&self) -> Result<ArrayD<T>> {
        match self.shape()?.first() {
            Some(&n) => self.read_range(0..n),
            None => Err(Error::UnsupportedSelection(
                "record read on a scalar array".to_string(),
            )),
        }
    }

    /// Returns the guard if this handle belongs to a closed file.
    fn as_closed(&self) -> Option<&ClosedHandle<T>> {
        None
    }
}

pub(crate) fn true_positions(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect()
}

pub(crate) fn check_mask_len(mask: &[bool], n: usize) -> Result<()> {
    if mask.len() == n {
        Ok(())
    } else {
        Err(Error::UnsupportedSelection(format!(
            "boolean mask of length {} for {} records",
            mask.len(),
            n
        )))
    }
}

/// Element types the in-memory store can hold.
pub trait Element: Clone + 'static {
    const DTYPE: Dtype;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: Dtype = $dtype;
        })*
    };
}

impl_element! {
    bool => Dtype::Bool,
    i8 => Dtype::Int(1),
    i16 => Dtype::Int(2),
    i32 => Dtype::Int(4),
    i64 => Dtype::Int(8),
    u8 => Dtype::UInt(1),
    u16 => Dtype::UInt(2),
    u32 => Dtype::UInt(4),
    u64 => Dtype::UInt(8),
    f32 => Dtype::Float(4),
    f64 => Dtype::Float(8),
    String => Dtype::String,
}

/// Open/closed state of an in-memory file, shared by all of its arrays.
#[derive(Debug)]
pub struct StoreState {
    name: String,
    open: Cell<bool>,
}

impl StoreState {
    /// Creates the state of an open file.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            open: Cell::new(true),
        })
    }

    /// File name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true while the file is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Marks the file as closed.
    pub fn close(&self) {
        self.open.set(false);
    }
}

/// Array held in memory, behaving like a dataset of an HDF5 file.
///
/// Once the attached [`StoreState`] is closed the array stops reporting its
/// names and every read fails, the way HDF5 handles become invalid.
pub struct MemoryArray<T> {
    name: String,
    values: ArrayD<T>,
    file: Option<Rc<StoreState>>,
    reads: Cell<usize>,
}

impl<T: Element> MemoryArray<T> {
    /// Wraps `values` under the array path `name`.
    pub fn new(name: impl Into<String>, values: ArrayD<T>) -> Self {
        Self {
            name: name.into(),
            values,
            file: None,
            reads: Cell::new(0),
        }
    }

    /// Attaches the array to a file.
    #[must_use]
    pub fn in_file(mut self, file: Rc<StoreState>) -> Self {
        self.file = Some(file);
        self
    }

    /// Number of read calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    fn is_open(&self) -> bool {
        self.file.as_ref().map_or(true, |file| file.is_open())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::Store(format!(
                "not a valid dataset (\"{}\" belongs to a closed file)",
                self.name
            )))
        }
    }

    fn len(&self) -> usize {
        self.values.shape().first().copied().unwrap_or(0)
    }
}

impl<T: Element> RecordSource<T> for MemoryArray<T> {
    fn shape(&self) -> Result<Vec<usize>> {
        self.ensure_open()?;
        Ok(self.values.shape().to_vec())
    }

    fn dtype(&self) -> Result<Dtype> {
        self.ensure_open()?;
        Ok(T::DTYPE)
    }

    fn name(&self) -> Option<String> {
        self.is_open().then(|| self.name.clone())
    }

    fn file_name(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        file.is_open().then(|| file.name().to_string())
    }

    fn read_range(&self, range: Range<usize>) -> Result<ArrayD<T>> {
        self.ensure_open()?;
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(Error::IndexOutOfBounds {
                index: range.end.max(range.start),
                axis: 0,
                len,
            });
        }
        self.reads.set(self.reads.get() + 1);
        Ok(self
            .values
            .slice_axis(Axis(0), Slice::from(range))
            .to_owned())
    }

    fn read_coords(&self, coords: &[usize]) -> Result<ArrayD<T>> {
        self.ensure_open()?;
        let len = self.len();
        if let Some(&index) = coords.iter().find(|&&c| c >= len) {
            return Err(Error::IndexOutOfBounds {
                index,
                axis: 0,
                len,
            });
        }
        self.reads.set(self.reads.get() + 1);
        Ok(self.values.select(Axis(0), coords))
    }

    fn read_all(&self) -> Result<ArrayD<T>> {
        self.ensure_open()?;
        self.reads.set(self.reads.get() + 1);
        Ok(self.values.clone())
    }
}
