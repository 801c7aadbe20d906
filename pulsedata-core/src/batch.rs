//! Windowed batch reads over sparse position lists.
//!
//! An ascending list of positions is cut into groups of at most `batch_size`
//! positions. Each group costs exactly one contiguous range read from the
//! store, `[group[0], group[last] + 1)`, after which the requested records are
//! picked out of the window by their local offsets `group - group[0]`.

use crate::shape::normalize;
use crate::source::{RecordSource, SourceRef};
use crate::valid::Positions;
use crate::{Error, Result};
use ndarray::{ArrayD, Axis, ErrorKind, IxDyn, ShapeError, Slice};
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Batch size used when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Configuration for batched reads.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchConfig {
    /// Maximum number of positions per batch. Zero produces no batches.
    pub batch_size: usize,
    /// Optional cap on the number of batches produced.
    pub max_batches: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: None,
        }
    }
}

impl BatchConfig {
    /// Creates a configuration with the given batch size and no batch cap.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            max_batches: None,
        }
    }

    /// Set the number of positions per batch.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of positions per batch, rejecting zero.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for a zero batch size.
    pub fn try_with_batch_size(self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(self.with_batch_size(batch_size))
    }

    /// Stop after `max_batches` batches.
    #[must_use]
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = Some(max_batches);
        self
    }

    /// Number of positions out of `n` that the batches will cover.
    #[must_use]
    pub fn covered(&self, n: usize) -> usize {
        match self.max_batches {
            Some(max) => n.min(self.batch_size.saturating_mul(max)),
            None if self.batch_size == 0 => 0,
            None => n,
        }
    }
}

/// One contiguous read and the positions to extract from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window {
    /// Indices into the position list covered by this window.
    pub index: Range<usize>,
    /// On-disk records read in one go.
    pub read: Range<usize>,
    /// Offsets into the read to extract; `None` when every record of the
    /// read is wanted.
    pub local: Option<Vec<usize>>,
}

impl Window {
    /// Number of positions covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true when the window covers no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Iterator of [`Window`]s over an ascending position list.
#[derive(Clone, Debug)]
pub struct IndexWindower {
    positions: Positions,
    batch_size: usize,
    remaining: Option<usize>,
    cursor: usize,
}

impl IndexWindower {
    /// Creates a windower over `positions`.
    #[must_use]
    pub fn new(positions: Positions, config: &BatchConfig) -> Self {
        Self {
            positions,
            batch_size: config.batch_size,
            remaining: config.max_batches,
            cursor: 0,
        }
    }

    fn next_window(&mut self) -> Option<Window> {
        let total = self.positions.len();
        if self.batch_size == 0 || self.cursor >= total || self.remaining == Some(0) {
            return None;
        }

        let lo = self.cursor;
        let hi = lo.saturating_add(self.batch_size).min(total);
        let start = self.positions.get(lo)?;
        let stop = self.positions.get(hi - 1)? + 1;

        let local = self
            .positions
            .sub_list(lo..hi)
            .filter(|group| !is_contiguous(group))
            .map(|group| group.iter().map(|p| p - start).collect());

        self.cursor = hi;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }

        Some(Window {
            index: lo..hi,
            read: start..stop,
            local,
        })
    }

    fn remaining_windows(&self) -> usize {
        if self.batch_size == 0 {
            return 0;
        }
        let left = self.positions.len().saturating_sub(self.cursor);
        let windows = left.div_ceil(self.batch_size);
        self.remaining.map_or(windows, |max| windows.min(max))
    }
}

impl Iterator for IndexWindower {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_window()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining_windows();
        (n, Some(n))
    }
}

impl ExactSizeIterator for IndexWindower {}

fn is_contiguous(group: &[usize]) -> bool {
    group.windows(2).all(|pair| pair[1] == pair[0] + 1)
}

/// Records read for one window.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch<T> {
    /// Indices into the position list covered by this batch.
    pub index: Range<usize>,
    /// The records, shape-normalized.
    pub data: ArrayD<T>,
}

/// Lazy batched reader issuing one range read per batch.
pub struct BatchReader<T> {
    source: SourceRef<T>,
    windows: IndexWindower,
}

impl<T: Clone> BatchReader<T> {
    /// Creates a reader over `positions` of `source`.
    #[must_use]
    pub fn new(source: SourceRef<T>, positions: Positions, config: &BatchConfig) -> Self {
        Self {
            source,
            windows: IndexWindower::new(positions, config),
        }
    }

    fn read_window(&self, window: Window) -> Result<Batch<T>> {
        log::trace!(
            "batch read of records {:?} for positions {:?}",
            window.read,
            window.index
        );
        let records = self.source.read_range(window.read)?;
        let data = match window.local {
            Some(local) => records.select(Axis(0), &local),
            None => records,
        };
        Ok(Batch {
            index: window.index,
            data: normalize(data),
        })
    }
}

impl<T: Clone> Iterator for BatchReader<T> {
    type Item = Result<Batch<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.windows.next()?;
        Some(self.read_window(window))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.windows.size_hint()
    }
}

/// Reads `positions` of `source` in batches.
#[must_use]
pub fn read_batches<T: Clone>(
    source: &SourceRef<T>,
    positions: Positions,
    config: &BatchConfig,
) -> BatchReader<T> {
    BatchReader::new(SourceRef::clone(source), positions, config)
}

/// Applies `func` to every batch and collects the results.
///
/// The output has `covered` records; the shape of the first result fixes the
/// per-record output shape, and each result is written back at the indices its
/// batch covered. Without any batch the output is an empty rank-1 array.
///
/// # Errors
/// Returns an error if a read fails or a result does not have one record per
/// input record with the per-record shape of the first result.
pub fn apply_batches<T, R, I, F>(batches: I, covered: usize, mut func: F) -> Result<ArrayD<R>>
where
    I: IntoIterator<Item = Result<Batch<T>>>,
    F: FnMut(ArrayD<T>) -> ArrayD<R>,
    R: Clone + Default,
{
    let mut batches = batches.into_iter();
    let Some(first) = batches.next() else {
        return Ok(ArrayD::default(IxDyn(&[0])));
    };
    let first = first?;
    let first_result = func(first.data);
    check_result_shape(&first_result, first.index.len(), None)?;

    let record_shape = first_result.shape()[1..].to_vec();
    let mut shape = Vec::with_capacity(record_shape.len() + 1);
    shape.push(covered);
    shape.extend_from_slice(&record_shape);

    let mut output = ArrayD::<R>::default(IxDyn(&shape));
    write_back(&mut output, first.index, &first_result)?;

    for batch in batches {
        let batch = batch?;
        let result = func(batch.data);
        check_result_shape(&result, batch.index.len(), Some(&record_shape))?;
        write_back(&mut output, batch.index, &result)?;
    }
    Ok(output)
}

fn check_result_shape<R>(
    result: &ArrayD<R>,
    records: usize,
    record_shape: Option<&[usize]>,
) -> Result<()> {
    let shape = result.shape();
    let matches = shape.first() == Some(&records)
        && record_shape.map_or(true, |expected| &shape[1..] == expected);
    if matches {
        Ok(())
    } else {
        Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into())
    }
}

fn write_back<R: Clone>(output: &mut ArrayD<R>, index: Range<usize>, result: &ArrayD<R>) -> Result<()> {
    if index.end > output.shape()[0] {
        return Err(ShapeError::from_kind(ErrorKind::OutOfBounds).into());
    }
    output
        .slice_axis_mut(Axis(0), Slice::from(index))
        .assign(result);
    Ok(())
}
