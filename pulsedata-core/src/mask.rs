//! Boolean mask selection on the leading axis.
//!
//! HDF5 only supports boolean selection on axis 0 of rank-1 datasets. For
//! records of higher rank the mask is turned into the coordinate list of its
//! `true` entries and read by coordinates instead.

use crate::source::{check_mask_len, true_positions, RecordSource};
use crate::Result;
use ndarray::ArrayD;

/// Positions of the `true` entries of `mask`.
#[must_use]
pub fn mask_to_coords(mask: &[bool]) -> Vec<usize> {
    true_positions(mask)
}

/// Reads the records of `source` selected by `mask`.
///
/// # Errors
/// Returns an error if the mask length differs from the record count or the
/// read fails.
pub fn read_masked<T>(source: &dyn RecordSource<T>, mask: &[bool]) -> Result<ArrayD<T>> {
    let shape = source.shape()?;
    let nrecords = shape.first().copied().unwrap_or(0);
    check_mask_len(mask, nrecords)?;
    if shape.len() <= 1 {
        source.read_mask(mask)
    } else {
        source.read_coords(&mask_to_coords(mask))
    }
}
