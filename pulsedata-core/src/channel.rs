//! A single named series of (pulse id, record) pairs.
//!
//! A [`Channel`] reads from two co-indexed arrays, pulse ids and data records,
//! through a [`Valid`] selector. Every accessor (`pids`, `data`, `shape`,
//! batched reads, indexing) only sees the records at the valid positions.

use crate::align::PulseId;
use crate::batch::{apply_batches, read_batches, BatchConfig, BatchReader};
use crate::column::{Column, Records};
use crate::guard::ClosedHandle;
use crate::mask::{mask_to_coords, read_masked};
use crate::meta::Meta;
use crate::shape::normalize;
use crate::source::{check_mask_len, Dtype, RecordSource, SourceRef};
use crate::valid::{Positions, Valid};
use crate::{Error, Result};
use ndarray::{Array1, ArrayD, Axis, Ix1};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a channel.
///
/// Channel sets hold channels by reference: every set derived from another
/// one sees the same channel objects, so a `valid` change made through one
/// set is visible through all of them.
pub type ChannelRef = Rc<Channel>;

/// Member names of a channel group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Pulse-id array (required).
    pub pulse_ids: String,
    /// Data array (required).
    pub data: String,
    /// Timestamp array (optional).
    pub timestamps: String,
    /// Metadata group (optional).
    pub meta: String,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            pulse_ids: "pulse_id".to_string(),
            data: "data".to_string(),
            timestamps: "timestamp".to_string(),
            meta: "meta".to_string(),
        }
    }
}

/// A channel group as exposed by the backing store.
pub trait GroupSource {
    /// Path of the group inside its file.
    fn name(&self) -> Option<String>;

    /// Name of the owning file.
    fn file_name(&self) -> Option<String>;

    /// Integer array member, `None` if absent.
    ///
    /// # Errors
    /// Returns an error if the member exists but cannot be opened.
    fn int_array(&self, member: &str) -> Result<Option<SourceRef<i64>>>;

    /// Array member typed after its stored element type, `None` if absent.
    ///
    /// # Errors
    /// Returns an error if the member exists but cannot be opened or has an
    /// element type without a [`Column`] variant.
    fn column(&self, member: &str) -> Result<Option<Column>>;

    /// Metadata sub-group, `None` if absent.
    ///
    /// # Errors
    /// Returns an error if the member exists but cannot be opened.
    fn meta(&self, member: &str) -> Result<Option<Meta>>;
}

/// One named series of pulse ids and data records.
pub struct Channel {
    name: String,
    group: Option<String>,
    pids: RefCell<SourceRef<PulseId>>,
    data: RefCell<Column>,
    timestamps: RefCell<Option<SourceRef<i64>>>,
    meta: Option<Meta>,
    offset: PulseId,
    valid: RefCell<Valid>,
}

impl Channel {
    /// Creates a channel from its pulse-id and data arrays.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if both arrays differ in length, or
    /// the error of a failing shape query.
    pub fn new(
        name: impl Into<String>,
        pids: SourceRef<PulseId>,
        data: impl Into<Column>,
    ) -> Result<Self> {
        let name = name.into();
        let data = data.into();
        let npids = pids.nrecords()?;
        let ndata = data.nrecords()?;
        if npids != ndata {
            return Err(Error::LengthMismatch { name, npids, ndata });
        }
        Ok(Self {
            name,
            group: None,
            pids: RefCell::new(pids),
            data: RefCell::new(data),
            timestamps: RefCell::new(None),
            meta: None,
            offset: 0,
            valid: RefCell::new(Valid::All),
        })
    }

    /// Opens the channel stored in `group`.
    ///
    /// # Errors
    /// Returns [`Error::DatasetNotFound`] if the pulse-id or data member is
    /// missing, [`Error::LengthMismatch`] if their lengths differ, or a store
    /// error.
    pub fn from_group(
        name: impl Into<String>,
        group: &dyn GroupSource,
        layout: &ChannelLayout,
    ) -> Result<Self> {
        let group_name = group.name();
        let missing = |member: &str| Error::DatasetNotFound {
            dataset: member.to_string(),
            group: group_name.clone(),
        };

        let pids = group
            .int_array(&layout.pulse_ids)?
            .ok_or_else(|| missing(&layout.pulse_ids))?;
        let data = group
            .column(&layout.data)?
            .ok_or_else(|| missing(&layout.data))?;

        let mut channel = Self::new(name, pids, data)?;
        if let Some(timestamps) = group.int_array(&layout.timestamps)? {
            channel.set_timestamps(timestamps)?;
        }
        channel.meta = group.meta(&layout.meta)?;
        channel.group = group_name;
        Ok(channel)
    }

    /// Subtract `offset` from every raw pulse id.
    #[must_use]
    pub fn with_offset(mut self, offset: PulseId) -> Self {
        self.offset = offset;
        self
    }

    /// Attach a metadata group.
    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Attach a timestamp array co-indexed with the pulse ids.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the lengths differ.
    pub fn with_timestamps(mut self, timestamps: SourceRef<i64>) -> Result<Self> {
        self.set_timestamps(timestamps)?;
        Ok(self)
    }

    fn set_timestamps(&mut self, timestamps: SourceRef<i64>) -> Result<()> {
        let ntimestamps = timestamps.nrecords()?;
        let npids = self.ntotal()?;
        if ntimestamps != npids {
            return Err(Error::LengthMismatch {
                name: self.name.clone(),
                npids,
                ndata: ntimestamps,
            });
        }
        *self.timestamps.get_mut() = Some(timestamps);
        Ok(())
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the channel group inside its file, if known.
    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Offset subtracted from raw pulse ids.
    #[must_use]
    pub fn offset(&self) -> PulseId {
        self.offset
    }

    /// Metadata group, if the channel has one.
    #[must_use]
    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    /// Current valid-position selector.
    #[must_use]
    pub fn valid(&self) -> Valid {
        self.valid.borrow().clone()
    }

    /// Replaces the valid-position selector.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPositions`] if explicit positions are unsorted
    /// or exceed the on-disk record count.
    pub fn set_valid(&self, valid: Valid) -> Result<()> {
        if !valid.is_all() {
            valid.check(self.ntotal()?)?;
        }
        *self.valid.borrow_mut() = valid;
        Ok(())
    }

    /// Restricts the channel to the given ascending positions.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPositions`] for unsorted or out-of-range
    /// positions.
    pub fn set_valid_positions(&self, positions: Vec<usize>) -> Result<()> {
        let valid = Valid::explicit(positions, self.ntotal()?)?;
        *self.valid.borrow_mut() = valid;
        Ok(())
    }

    /// Makes every on-disk record valid again.
    pub fn reset_valid(&self) {
        *self.valid.borrow_mut() = Valid::All;
    }

    /// Number of on-disk records, ignoring the selector.
    ///
    /// # Errors
    /// Returns an error if the pulse-id array cannot be queried.
    pub fn ntotal(&self) -> Result<usize> {
        self.pids.borrow().nrecords()
    }

    /// Number of currently valid records.
    ///
    /// # Errors
    /// Returns an error if the pulse-id array cannot be queried.
    pub fn nvalid(&self) -> Result<usize> {
        let ntotal = self.ntotal()?;
        Ok(self.valid.borrow().count(ntotal))
    }

    /// Alias of [`Channel::nvalid`].
    ///
    /// # Errors
    /// Returns an error if the pulse-id array cannot be queried.
    pub fn len(&self) -> Result<usize> {
        self.nvalid()
    }

    /// Returns true when no record is valid.
    ///
    /// # Errors
    /// Returns an error if the pulse-id array cannot be queried.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.nvalid()? == 0)
    }

    /// Valid positions resolved against the on-disk record count.
    ///
    /// # Errors
    /// Returns an error if the pulse-id array cannot be queried.
    pub fn positions(&self) -> Result<Positions> {
        let ntotal = self.ntotal()?;
        Ok(self.valid.borrow().resolve(ntotal))
    }

    /// Pulse ids of the valid records, offset applied.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn pids(&self) -> Result<Array1<PulseId>> {
        let positions = self.positions()?;
        self.read_pids(&positions)
    }

    /// Pulse ids of every on-disk record, offset applied.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn raw_pids(&self) -> Result<Array1<PulseId>> {
        let positions = Positions::Span(self.ntotal()?);
        self.read_pids(&positions)
    }

    fn read_pids(&self, positions: &Positions) -> Result<Array1<PulseId>> {
        let source = SourceRef::clone(&self.pids.borrow());
        let mut ids = read_positions(&*source, positions).and_then(into_line)?;
        if self.offset != 0 {
            let offset = self.offset;
            ids.mapv_inplace(|id| id - offset);
        }
        Ok(ids)
    }

    /// Data records at the valid positions as `f64`, shape-normalized.
    ///
    /// Integer data beyond 2^53 loses precision here; [`Channel::records`]
    /// keeps the stored type.
    ///
    /// # Errors
    /// Returns an error if the read fails, or [`Error::TypeMismatch`] for
    /// text data.
    pub fn data(&self) -> Result<ArrayD<f64>> {
        let positions = self.positions()?;
        let source = self.float_data()?;
        read_positions(&*source, &positions).map(normalize)
    }

    /// Data records at the valid positions in their stored type,
    /// shape-normalized.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn records(&self) -> Result<Records> {
        let positions = self.positions()?;
        let column = self.data.borrow().clone();
        Ok(column.read_positions(&positions)?.normalize())
    }

    fn float_data(&self) -> Result<SourceRef<f64>> {
        self.data.borrow().as_float()
    }

    /// Timestamps of the valid records, if the channel has any.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn timestamps(&self) -> Result<Option<Array1<i64>>> {
        let Some(source) = self.timestamps.borrow().clone() else {
            return Ok(None);
        };
        let positions = self.positions()?;
        read_positions(&*source, &positions)
            .and_then(into_line)
            .map(Some)
    }

    /// Pulse ids and data of the valid records.
    ///
    /// # Errors
    /// Returns an error if a read fails.
    pub fn pids_and_data(&self) -> Result<(Array1<PulseId>, ArrayD<f64>)> {
        Ok((self.pids()?, self.data()?))
    }

    /// Shape with the first axis counting valid records.
    ///
    /// # Errors
    /// Returns an error if the data array cannot be queried.
    pub fn shape(&self) -> Result<Vec<usize>> {
        let mut shape = self.raw_shape()?;
        let nvalid = self.nvalid()?;
        match shape.first_mut() {
            Some(first) => *first = nvalid,
            None => shape.push(nvalid),
        }
        Ok(shape)
    }

    /// On-disk shape of the data array.
    ///
    /// # Errors
    /// Returns an error if the data array cannot be queried.
    pub fn raw_shape(&self) -> Result<Vec<usize>> {
        self.data.borrow().shape()
    }

    /// Stored element type of the data array.
    ///
    /// # Errors
    /// Returns an error if the data array cannot be queried.
    pub fn dtype(&self) -> Result<Dtype> {
        self.data.borrow().dtype()
    }

    /// Rank of the data array.
    ///
    /// # Errors
    /// Returns an error if the data array cannot be queried.
    pub fn ndim(&self) -> Result<usize> {
        Ok(self.raw_shape()?.len())
    }

    /// Number of elements in the valid records.
    ///
    /// # Errors
    /// Returns an error if the data array cannot be queried.
    pub fn size(&self) -> Result<usize> {
        Ok(self.shape()?.iter().product())
    }

    /// Indexes the channel as if it only contained its valid records.
    ///
    /// `index[0]` addresses the valid subset; the remaining components index
    /// inside that record.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfBounds`] for indices outside the valid
    /// records or the record shape, and [`Error::UnsupportedSelection`] for an
    /// empty index.
    pub fn get(&self, index: &[usize]) -> Result<ArrayD<f64>> {
        let (&first, rest) = index.split_first().ok_or_else(|| {
            Error::UnsupportedSelection("empty index on a channel".to_string())
        })?;
        let positions = self.positions()?;
        let position = positions.get(first).ok_or(Error::IndexOutOfBounds {
            index: first,
            axis: 0,
            len: positions.len(),
        })?;

        let source = self.float_data()?;
        let mut record = source
            .read_range(position..position + 1)?
            .index_axis_move(Axis(0), 0);
        for (axis, &i) in rest.iter().enumerate() {
            let len = record.shape().first().copied().unwrap_or(0);
            if record.ndim() == 0 || i >= len {
                return Err(Error::IndexOutOfBounds {
                    index: i,
                    axis: axis + 1,
                    len,
                });
            }
            record = record.index_axis_move(Axis(0), i);
        }
        Ok(record)
    }

    /// Valid records selected by a boolean mask over the valid subset.
    ///
    /// # Errors
    /// Returns an error if the mask length differs from the number of valid
    /// records or the read fails.
    pub fn masked(&self, mask: &[bool]) -> Result<ArrayD<f64>> {
        let source = self.float_data()?;
        match self.positions()? {
            Positions::Span(_) => read_masked(&*source, mask),
            positions @ Positions::List(_) => {
                check_mask_len(mask, positions.len())?;
                let coords: Vec<usize> = mask_to_coords(mask)
                    .into_iter()
                    .filter_map(|i| positions.get(i))
                    .collect();
                source.read_coords(&coords)
            }
        }
    }

    /// Lazily reads the valid records in batches.
    ///
    /// Each call starts a fresh pass; every batch costs one contiguous read.
    ///
    /// # Errors
    /// Returns an error if the pulse-id array cannot be queried.
    pub fn in_batches(&self, config: &BatchConfig) -> Result<BatchReader<f64>> {
        let positions = self.positions()?;
        let source = self.float_data()?;
        Ok(read_batches(&source, positions, config))
    }

    /// Applies `func` to each batch of valid records and collects the results.
    ///
    /// The output covers as many records as the batches do (all valid
    /// records unless `max_batches` cuts the pass short).
    ///
    /// # Errors
    /// Returns an error if a read fails or `func` returns a result of the
    /// wrong length.
    pub fn apply_in_batches<R, F>(&self, func: F, config: &BatchConfig) -> Result<ArrayD<R>>
    where
        F: FnMut(ArrayD<f64>) -> ArrayD<R>,
        R: Clone + Default,
    {
        let batches = self.in_batches(config)?;
        let covered = config.covered(self.nvalid()?);
        apply_batches(batches, covered, func)
    }

    /// Replaces every handle with a closed-file guard.
    ///
    /// Must run while the owning file is still open so the guard can capture
    /// the file and group names. Closing twice keeps the first names.
    pub fn close(&self) {
        let guarded = ClosedHandle::guard(SourceRef::clone(&self.pids.borrow()));
        *self.pids.borrow_mut() = guarded;

        let guarded = self.data.borrow().guard();
        *self.data.borrow_mut() = guarded;

        let mut timestamps = self.timestamps.borrow_mut();
        if let Some(source) = timestamps.take() {
            *timestamps = Some(ClosedHandle::guard(source));
        }

        if let Some(meta) = &self.meta {
            meta.close();
        }
    }

    /// Returns true once the channel's handles have been guarded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.data.borrow().is_closed()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel: {}", self.name)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("offset", &self.offset)
            .field("valid", &self.valid.borrow())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn read_positions<T>(source: &dyn RecordSource<T>, positions: &Positions) -> Result<ArrayD<T>> {
    match positions {
        Positions::Span(n) => source.read_range(0..*n),
        Positions::List(list) => source.read_coords(list),
    }
}

fn into_line<T>(array: ArrayD<T>) -> Result<Array1<T>> {
    Ok(normalize(array).into_dimensionality::<Ix1>()?)
}
