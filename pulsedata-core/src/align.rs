//! Pulse-id set operations used for cross-channel alignment.
//!
//! All results are sorted and free of duplicates. Pulse ids are assumed to be
//! unique within a channel; duplicated ids give unspecified alignment results.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Pulse identifier.
pub type PulseId = i64;

/// Sorted, deduplicated copy of `ids`.
#[must_use]
pub fn unique_sorted(ids: &[PulseId]) -> Vec<PulseId> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Intersection of two sorted, deduplicated id lists.
#[must_use]
pub fn intersect_sorted(a: &[PulseId], b: &[PulseId]) -> Vec<PulseId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union of two sorted, deduplicated id lists.
#[must_use]
pub fn union_sorted(a: &[PulseId], b: &[PulseId]) -> Vec<PulseId> {
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Intersection over every id list.
///
/// # Errors
/// Returns [`Error::EmptyChannelSet`] when `lists` is empty.
pub fn intersection<I>(lists: I) -> Result<Vec<PulseId>>
where
    I: IntoIterator,
    I::Item: AsRef<[PulseId]>,
{
    reduce(lists, intersect_sorted)
}

/// Union over every id list.
///
/// # Errors
/// Returns [`Error::EmptyChannelSet`] when `lists` is empty.
pub fn union<I>(lists: I) -> Result<Vec<PulseId>>
where
    I: IntoIterator,
    I::Item: AsRef<[PulseId]>,
{
    reduce(lists, union_sorted)
}

fn reduce<I, F>(lists: I, combine: F) -> Result<Vec<PulseId>>
where
    I: IntoIterator,
    I::Item: AsRef<[PulseId]>,
    F: Fn(&[PulseId], &[PulseId]) -> Vec<PulseId>,
{
    let mut lists = lists.into_iter();
    let first = lists.next().ok_or(Error::EmptyChannelSet)?;
    let mut acc = unique_sorted(first.as_ref());
    for ids in lists {
        acc = combine(&acc, &unique_sorted(ids.as_ref()));
    }
    Ok(acc)
}

/// Ascending positions in `ids` whose value occurs in `targets`.
#[must_use]
pub fn positions_in(ids: &[PulseId], targets: &[PulseId]) -> Vec<usize> {
    let targets: HashSet<PulseId> = targets.iter().copied().collect();
    ids.iter()
        .enumerate()
        .filter_map(|(pos, id)| targets.contains(id).then_some(pos))
        .collect()
}
