//! HDF5 backend.
//!
//! Channel groups are read lazily: a channel holds [`H5Dataset`] handles and
//! every access issues a hyperslab read of the records it needs.

use crate::source::FileSource;
use crate::{Error, Result};
use hdf5::types::{H5Type, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::{concatenate, ArrayD, Axis, IxDyn, Slice, SliceInfo, SliceInfoElem};
use pulsedata_core::{
    Column, Dtype, Error as CoreError, GroupSource, Meta, RecordSource, Result as CoreResult,
    SourceRef,
};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::Range;
use std::path::Path;
use std::rc::Rc;

fn store_error(err: &hdf5::Error) -> CoreError {
    CoreError::Store(err.to_string())
}

/// Conversion from the type HDF5 reads into to the element type handed out.
pub trait Decode<R>: Sized {
    fn decode(raw: ArrayD<R>) -> ArrayD<Self>;
}

impl<T: H5Type> Decode<T> for T {
    fn decode(raw: ArrayD<T>) -> ArrayD<T> {
        raw
    }
}

impl Decode<VarLenUnicode> for String {
    fn decode(raw: ArrayD<VarLenUnicode>) -> ArrayD<String> {
        raw.map(|s| s.as_str().to_owned())
    }
}

impl Decode<VarLenAscii> for String {
    fn decode(raw: ArrayD<VarLenAscii>) -> ArrayD<String> {
        raw.map(|s| s.as_str().to_owned())
    }
}

/// A dataset read record by record along axis 0.
///
/// Elements are read as `R` and handed out as `T`; both are the same type
/// except for strings.
pub struct H5Dataset<T, R = T> {
    dataset: Dataset,
    marker: PhantomData<(T, R)>,
}

/// A string dataset.
pub type H5Text<R = VarLenUnicode> = H5Dataset<String, R>;

impl<T, R> H5Dataset<T, R> {
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            marker: PhantomData,
        }
    }

    fn ensure_valid(&self) -> CoreResult<()> {
        if self.dataset.is_valid() {
            Ok(())
        } else {
            Err(CoreError::Store("invalid dataset identifier".to_string()))
        }
    }

    fn empty(&self) -> CoreResult<ArrayD<T>> {
        let mut shape = self.dataset.shape();
        if let Some(first) = shape.first_mut() {
            *first = 0;
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), Vec::new())?)
    }
}

/// Selection of `range` on axis 0 and everything on the other axes.
fn record_slice(
    range: Range<usize>,
    ndim: usize,
) -> CoreResult<SliceInfo<Vec<SliceInfoElem>, IxDyn, IxDyn>> {
    let mut elems = Vec::with_capacity(ndim.max(1));
    elems.push(SliceInfoElem::from(Slice::from(range)));
    elems.extend(std::iter::repeat(SliceInfoElem::from(..)).take(ndim.saturating_sub(1)));
    Ok(SliceInfo::try_from(elems)?)
}

/// Splits ascending coordinates into maximal runs of consecutive values.
fn contiguous_runs(coords: &[usize]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for &c in coords {
        match runs.last_mut() {
            Some(run) if run.end == c => run.end += 1,
            _ => runs.push(c..c + 1),
        }
    }
    runs
}

fn descriptor_dtype(descriptor: &TypeDescriptor) -> Dtype {
    match descriptor {
        TypeDescriptor::Boolean => Dtype::Bool,
        TypeDescriptor::Integer(size) => Dtype::Int(*size as u8),
        TypeDescriptor::Unsigned(size) => Dtype::UInt(*size as u8),
        TypeDescriptor::Float(size) => Dtype::Float(*size as u8),
        TypeDescriptor::FixedAscii(_)
        | TypeDescriptor::FixedUnicode(_)
        | TypeDescriptor::VarLenAscii
        | TypeDescriptor::VarLenUnicode => Dtype::String,
        _ => Dtype::Other,
    }
}

/// Wraps `dataset` in the column matching its stored element type.
fn typed_column(dataset: Dataset) -> CoreResult<Column> {
    let descriptor = dataset
        .dtype()
        .and_then(|dtype| dtype.to_descriptor())
        .map_err(|e| store_error(&e))?;
    let column = match descriptor {
        TypeDescriptor::Boolean => Column::from(shared(H5Dataset::<bool, bool>::new(dataset))),
        TypeDescriptor::Integer(_) => Column::from(shared(H5Dataset::<i64, i64>::new(dataset))),
        TypeDescriptor::Unsigned(_) => Column::from(shared(H5Dataset::<u64, u64>::new(dataset))),
        TypeDescriptor::Float(_) => Column::from(shared(H5Dataset::<f64, f64>::new(dataset))),
        TypeDescriptor::VarLenUnicode | TypeDescriptor::FixedUnicode(_) => {
            Column::from(shared(H5Text::<VarLenUnicode>::new(dataset)))
        }
        TypeDescriptor::VarLenAscii | TypeDescriptor::FixedAscii(_) => {
            Column::from(shared(H5Text::<VarLenAscii>::new(dataset)))
        }
        other => {
            return Err(CoreError::Store(format!(
                "unsupported element type {other:?} of \"{}\"",
                dataset.name()
            )))
        }
    };
    Ok(column)
}

fn shared<T, S: RecordSource<T> + 'static>(source: S) -> SourceRef<T> {
    Rc::new(source)
}

/// Metadata entries of `group`; entries of unsupported types are skipped.
fn meta_group(group: &Group) -> CoreResult<Meta> {
    let datasets = group.datasets().map_err(|e| store_error(&e))?;
    let mut entries = Vec::with_capacity(datasets.len());
    for ds in datasets {
        let path = ds.name();
        let key = path.rsplit('/').next().unwrap_or(&path).to_string();
        match typed_column(ds) {
            Ok(column) => entries.push((key, column)),
            Err(err) => log::warn!("skipping metadata entry \"{path}\": {err}"),
        }
    }
    Ok(Meta::new(entries))
}

impl<T, R> RecordSource<T> for H5Dataset<T, R>
where
    T: Decode<R> + Clone,
    R: H5Type,
{
    fn shape(&self) -> CoreResult<Vec<usize>> {
        self.ensure_valid()?;
        Ok(self.dataset.shape())
    }

    fn dtype(&self) -> CoreResult<Dtype> {
        self.ensure_valid()?;
        let descriptor = self
            .dataset
            .dtype()
            .and_then(|dtype| dtype.to_descriptor())
            .map_err(|e| store_error(&e))?;
        Ok(descriptor_dtype(&descriptor))
    }

    fn name(&self) -> Option<String> {
        self.dataset.is_valid().then(|| self.dataset.name())
    }

    fn file_name(&self) -> Option<String> {
        if !self.dataset.is_valid() {
            return None;
        }
        self.dataset.file().ok().map(|file| file.filename())
    }

    fn read_range(&self, range: Range<usize>) -> CoreResult<ArrayD<T>> {
        let shape = self.shape()?;
        let len = shape.first().copied().unwrap_or(0);
        if range.start > range.end || range.end > len {
            return Err(CoreError::IndexOutOfBounds {
                index: range.end.max(range.start),
                axis: 0,
                len,
            });
        }
        if range.is_empty() {
            return self.empty();
        }
        let selection = record_slice(range, shape.len())?;
        self.dataset
            .read_slice::<R, _, IxDyn>(selection)
            .map(T::decode)
            .map_err(|e| store_error(&e))
    }

    fn read_coords(&self, coords: &[usize]) -> CoreResult<ArrayD<T>> {
        let runs = contiguous_runs(coords);
        if runs.is_empty() {
            self.ensure_valid()?;
            return self.empty();
        }
        let mut parts = runs
            .into_iter()
            .map(|run| self.read_range(run))
            .collect::<CoreResult<Vec<_>>>()?;
        if parts.len() == 1 {
            return Ok(parts.swap_remove(0));
        }
        let views: Vec<_> = parts.iter().map(ArrayD::view).collect();
        Ok(concatenate(Axis(0), &views)?)
    }

    fn read_all(&self) -> CoreResult<ArrayD<T>> {
        self.ensure_valid()?;
        self.dataset
            .read_dyn::<R>()
            .map(T::decode)
            .map_err(|e| store_error(&e))
    }
}

/// A channel group of an HDF5 file.
pub struct H5Group {
    group: Group,
}

impl H5Group {
    #[must_use]
    pub fn new(group: Group) -> Self {
        Self { group }
    }

    fn dataset(&self, member: &str) -> CoreResult<Option<Dataset>> {
        if !self.group.link_exists(member) {
            return Ok(None);
        }
        self.group
            .dataset(member)
            .map(Some)
            .map_err(|e| store_error(&e))
    }
}

impl GroupSource for H5Group {
    fn name(&self) -> Option<String> {
        self.group.is_valid().then(|| self.group.name())
    }

    fn file_name(&self) -> Option<String> {
        if !self.group.is_valid() {
            return None;
        }
        self.group.file().ok().map(|file| file.filename())
    }

    fn int_array(&self, member: &str) -> CoreResult<Option<SourceRef<i64>>> {
        Ok(self
            .dataset(member)?
            .map(|ds| Rc::new(H5Dataset::<i64, i64>::new(ds)) as SourceRef<i64>))
    }

    fn column(&self, member: &str) -> CoreResult<Option<Column>> {
        self.dataset(member)?.map(typed_column).transpose()
    }

    fn meta(&self, member: &str) -> CoreResult<Option<Meta>> {
        if !self.group.link_exists(member) {
            return Ok(None);
        }
        let meta = self.group.group(member).map_err(|e| store_error(&e))?;
        meta_group(&meta).map(Some)
    }
}

/// An HDF5 file opened read-only.
pub struct H5File {
    path: String,
    file: RefCell<Option<File>>,
}

impl H5File {
    /// Opens the file at `path` read-only.
    ///
    /// # Errors
    /// Returns an error if the file does not exist or is not an HDF5 file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        log::debug!("opened {}", path.display());
        Ok(Self {
            path: path.display().to_string(),
            file: RefCell::new(Some(file)),
        })
    }
}

impl FileSource for H5File {
    fn file_name(&self) -> String {
        self.path.clone()
    }

    fn channel_groups(&self, root: &str) -> Result<Vec<(String, Box<dyn GroupSource>)>> {
        let file = self.file.borrow();
        let file = file
            .as_ref()
            .ok_or_else(|| Error::InvalidFormat(format!("file \"{}\" is closed", self.path)))?;
        let base = if file.link_exists(root) {
            file.group(root)?
        } else {
            file.group("/")?
        };
        Ok(base
            .groups()?
            .into_iter()
            .map(|group| {
                let path = group.name();
                let name = path.rsplit('/').next().unwrap_or(&path).to_string();
                (name, Box::new(H5Group::new(group)) as Box<dyn GroupSource>)
            })
            .collect())
    }

    fn meta(&self, member: &str) -> Result<Option<Meta>> {
        let file = self.file.borrow();
        let file = file
            .as_ref()
            .ok_or_else(|| Error::InvalidFormat(format!("file \"{}\" is closed", self.path)))?;
        if !file.link_exists(member) {
            return Ok(None);
        }
        let group = file.group(member)?;
        Ok(Some(meta_group(&group)?))
    }

    fn is_open(&self) -> bool {
        self.file.borrow().is_some()
    }

    fn close(&self) -> Result<()> {
        if let Some(file) = self.file.borrow_mut().take() {
            file.close()?;
            log::debug!("closed {}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataFile, OpenOptions};
    use ndarray::{arr1, arr2, Array3};
    use pulsedata_core::{BatchConfig, Records};
    use tempfile::TempDir;

    fn write_scalars(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("run_test.SCALARS.h5");
        let file = File::create(&path).unwrap();
        let data = file.create_group("data").unwrap();

        let ch1 = data.create_group("ch1").unwrap();
        ch1.new_dataset_builder()
            .with_data(&arr1(&[0_i64, 1, 2]))
            .create("pulse_id")
            .unwrap();
        ch1.new_dataset_builder()
            .with_data(&arr1(&[0.1, 2.3, 4.5]))
            .create("data")
            .unwrap();
        let meta = ch1.create_group("meta").unwrap();
        meta.new_dataset_builder()
            .with_data(&arr1(&[1.5]))
            .create("gain")
            .unwrap();

        let ch2 = data.create_group("ch2").unwrap();
        ch2.new_dataset_builder()
            .with_data(&arr1(&[0_i64, 1, 2]))
            .create("pulse_id")
            .unwrap();
        ch2.new_dataset_builder()
            .with_data(&arr2(&[[6.7], [8.9], [0.1]]))
            .create("data")
            .unwrap();

        let ch3 = data.create_group("ch3").unwrap();
        ch3.new_dataset_builder()
            .with_data(&arr1(&[0_i64, 2]))
            .create("pulse_id")
            .unwrap();
        ch3.new_dataset_builder()
            .with_data(&arr1(&[2.3, 4.5]))
            .create("data")
            .unwrap();

        let broken = data.create_group("broken").unwrap();
        broken
            .new_dataset_builder()
            .with_data(&arr1(&[0_i64]))
            .create("pulse_id")
            .unwrap();
        path
    }

    #[test]
    fn test_hyperslab_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.h5");
        let cube = Array3::from_shape_fn((6, 2, 2), |(i, j, k)| (i * 100 + j * 10 + k) as f64);
        {
            let file = File::create(&path).unwrap();
            file.new_dataset_builder()
                .with_data(&cube)
                .create("cube")
                .unwrap();
        }
        let file = File::open(&path).unwrap();
        let source: H5Dataset<f64> = H5Dataset::new(file.dataset("cube").unwrap());

        assert_eq!(source.shape().unwrap(), vec![6, 2, 2]);
        assert_eq!(source.dtype().unwrap(), Dtype::Float(8));
        let range = source.read_range(1..3).unwrap();
        assert_eq!(range, cube.slice(ndarray::s![1..3, .., ..]).to_owned().into_dyn());

        let coords = source.read_coords(&[0, 2, 3, 5]).unwrap();
        assert_eq!(coords, cube.select(Axis(0), &[0, 2, 3, 5]).into_dyn());
        assert_eq!(source.read_coords(&[]).unwrap().shape(), &[0, 2, 2]);
        assert!(source.read_range(4..7).is_err());
    }

    #[test]
    fn test_runs_of_coordinates() {
        assert_eq!(contiguous_runs(&[0, 1, 2, 5, 7, 8]), vec![0..3, 5..6, 7..9]);
        assert!(contiguous_runs(&[]).is_empty());
    }

    #[test]
    fn test_open_file_and_align() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scalars(&dir);
        let file = DataFile::open(&path, &OpenOptions::default()).unwrap();

        assert_eq!(file.names(), vec!["ch1", "ch2", "ch3"]);
        let ch2 = file.get("ch2").unwrap();
        assert_eq!(ch2.data().unwrap(), arr1(&[6.7, 8.9, 0.1]).into_dyn());
        assert_eq!(ch2.group_name(), Some("/data/ch2"));

        file.drop_missing().unwrap();
        let ch1 = file.get("ch1").unwrap();
        assert_eq!(ch1.pids().unwrap().to_vec(), vec![0, 2]);
        let applied = ch1
            .apply_in_batches(|x| x, &BatchConfig::new(1))
            .unwrap();
        assert_eq!(applied, arr1(&[0.1, 4.5]).into_dyn());

        let meta = ch1.meta().unwrap();
        assert_eq!(meta.names(), vec!["gain"]);
        assert_eq!(meta.get("gain").unwrap(), Records::Float(arr1(&[1.5]).into_dyn()));
    }

    #[test]
    fn test_access_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scalars(&dir);
        let file = DataFile::open(&path, &OpenOptions::default()).unwrap();
        let ch1 = file.get("ch1").unwrap();
        file.close().unwrap();

        let message = ch1.data().unwrap_err().to_string();
        assert!(message.contains("run_test.SCALARS.h5"), "{message}");
        assert!(message.contains("/data/ch1"), "{message}");
        assert!(ch1.shape().is_err());
        assert!(ch1.meta().unwrap().get("gain").is_err());
    }

    #[test]
    fn test_types_are_preserved() {
        const BIG: u64 = 9_007_199_254_740_993;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_test.COUNTERS.h5");
        {
            let file = File::create(&path).unwrap();
            let counter = file.create_group("data").unwrap().create_group("counter").unwrap();
            counter
                .new_dataset_builder()
                .with_data(&arr1(&[0_i64, 1, 2]))
                .create("pulse_id")
                .unwrap();
            counter
                .new_dataset_builder()
                .with_data(&arr1(&[BIG, BIG + 1, 7]))
                .create("data")
                .unwrap();
            let units: VarLenUnicode = "counts".parse().unwrap();
            counter
                .create_group("meta")
                .unwrap()
                .new_dataset_builder()
                .with_data(&arr1(&[units]))
                .create("units")
                .unwrap();
            let user: VarLenUnicode = "beamline".parse().unwrap();
            file.create_group("meta")
                .unwrap()
                .new_dataset_builder()
                .with_data(&arr1(&[user]))
                .create("user")
                .unwrap();
        }

        let file = DataFile::open(&path, &OpenOptions::default()).unwrap();
        let counter = file.get("counter").unwrap();
        assert_eq!(counter.dtype().unwrap(), Dtype::UInt(8));
        counter.set_valid_positions(vec![0, 1]).unwrap();
        assert_eq!(
            counter.records().unwrap(),
            Records::UInt(arr1(&[BIG, BIG + 1]).into_dyn())
        );

        let units = counter.meta().unwrap().get("units").unwrap();
        assert_eq!(units.as_text().unwrap(), &arr1(&["counts".to_string()]).into_dyn());

        let file_meta = file.meta().unwrap();
        assert_eq!(file_meta.names(), vec!["user"]);
        let user = file_meta.get("user").unwrap();
        assert_eq!(user.as_text().unwrap(), &arr1(&["beamline".to_string()]).into_dyn());

        file.close().unwrap();
        let message = file_meta.get("user").unwrap_err().to_string();
        assert!(message.contains("/meta/user"), "{message}");
    }
}
