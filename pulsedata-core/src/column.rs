//! Type-preserving access to data and metadata arrays.
//!
//! Stores hand out a [`Column`] chosen from the stored element type, so
//! integers are never routed through `f64` unless the caller asks for a float
//! view. Reads through a column return [`Records`] of the same type.

use crate::guard::ClosedHandle;
use crate::shape::normalize;
use crate::source::{Dtype, RecordSource, SourceRef};
use crate::valid::Positions;
use crate::{Error, Result};
use ndarray::ArrayD;
use std::ops::Range;
use std::rc::Rc;

/// A record source tagged with its element type.
#[derive(Clone)]
pub enum Column {
    Bool(SourceRef<bool>),
    Int(SourceRef<i64>),
    UInt(SourceRef<u64>),
    Float(SourceRef<f64>),
    Text(SourceRef<String>),
}

/// Values read through a [`Column`].
#[derive(Clone, Debug, PartialEq)]
pub enum Records {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    UInt(ArrayD<u64>),
    Float(ArrayD<f64>),
    Text(ArrayD<String>),
}

macro_rules! each_column {
    ($column:expr, $source:ident => $body:expr) => {
        match $column {
            Column::Bool($source) => $body,
            Column::Int($source) => $body,
            Column::UInt($source) => $body,
            Column::Float($source) => $body,
            Column::Text($source) => $body,
        }
    };
}

macro_rules! read_column {
    ($column:expr, $source:ident => $read:expr) => {
        match $column {
            Column::Bool($source) => Records::Bool($read),
            Column::Int($source) => Records::Int($read),
            Column::UInt($source) => Records::UInt($read),
            Column::Float($source) => Records::Float($read),
            Column::Text($source) => Records::Text($read),
        }
    };
}

macro_rules! column_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<SourceRef<$ty>> for Column {
            fn from(source: SourceRef<$ty>) -> Self {
                Self::$variant(source)
            }
        })*
    };
}

macro_rules! records_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<ArrayD<$ty>> for Records {
            fn from(values: ArrayD<$ty>) -> Self {
                Self::$variant(values)
            }
        })*
    };
}

records_from! {
    bool => Bool,
    i64 => Int,
    u64 => UInt,
    f64 => Float,
    String => Text,
}

column_from! {
    bool => Bool,
    i64 => Int,
    u64 => UInt,
    f64 => Float,
    String => Text,
}

impl Column {
    /// Full on-disk shape.
    ///
    /// # Errors
    /// Returns an error if the handle is no longer usable.
    pub fn shape(&self) -> Result<Vec<usize>> {
        each_column!(self, source => source.shape())
    }

    /// Stored element type.
    ///
    /// # Errors
    /// Returns an error if the handle is no longer usable.
    pub fn dtype(&self) -> Result<Dtype> {
        each_column!(self, source => source.dtype())
    }

    /// Path of the array inside its file.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        each_column!(self, source => source.name())
    }

    /// Number of records.
    ///
    /// # Errors
    /// Returns an error if the handle is no longer usable.
    pub fn nrecords(&self) -> Result<usize> {
        each_column!(self, source => source.nrecords())
    }

    /// Reads the records `range`.
    ///
    /// # Errors
    /// Returns an error if the range exceeds the array or the read fails.
    pub fn read_range(&self, range: Range<usize>) -> Result<Records> {
        Ok(read_column!(self, source => source.read_range(range)?))
    }

    /// Reads the records at `positions`.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn read_positions(&self, positions: &Positions) -> Result<Records> {
        match positions {
            Positions::Span(n) => self.read_range(0..*n),
            Positions::List(list) => Ok(read_column!(self, source => source.read_coords(list)?)),
        }
    }

    /// Reads the whole array, scalars included.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn read_all(&self) -> Result<Records> {
        Ok(read_column!(self, source => source.read_all()?))
    }

    /// The column as floating-point records.
    ///
    /// Boolean and integer columns are converted on read; integers beyond
    /// 2^53 lose precision in this view.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] for text columns.
    pub fn as_float(&self) -> Result<SourceRef<f64>> {
        match self {
            Self::Float(source) => Ok(SourceRef::clone(source)),
            Self::Int(source) => Ok(FloatView::share(source)),
            Self::UInt(source) => Ok(FloatView::share(source)),
            Self::Bool(source) => Ok(FloatView::share(source)),
            Self::Text(_) => Err(Error::TypeMismatch {
                expected: Dtype::Float(8),
                found: Dtype::String,
            }),
        }
    }

    /// Swaps the handle for a closed-file guard.
    #[must_use]
    pub fn guard(&self) -> Self {
        match self {
            Self::Bool(source) => Self::Bool(ClosedHandle::guard(SourceRef::clone(source))),
            Self::Int(source) => Self::Int(ClosedHandle::guard(SourceRef::clone(source))),
            Self::UInt(source) => Self::UInt(ClosedHandle::guard(SourceRef::clone(source))),
            Self::Float(source) => Self::Float(ClosedHandle::guard(SourceRef::clone(source))),
            Self::Text(source) => Self::Text(ClosedHandle::guard(SourceRef::clone(source))),
        }
    }

    /// Returns true once the column was guarded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        each_column!(self, source => source.as_closed().is_some())
    }
}

impl Records {
    /// Element type of the values.
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::Bool(_) => Dtype::Bool,
            Self::Int(_) => Dtype::Int(8),
            Self::UInt(_) => Dtype::UInt(8),
            Self::Float(_) => Dtype::Float(8),
            Self::Text(_) => Dtype::String,
        }
    }

    /// Shape of the values.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Bool(values) => values.shape(),
            Self::Int(values) => values.shape(),
            Self::UInt(values) => values.shape(),
            Self::Float(values) => values.shape(),
            Self::Text(values) => values.shape(),
        }
    }

    /// Collapses column vectors, see [`normalize`].
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Bool(values) => Self::Bool(normalize(values)),
            Self::Int(values) => Self::Int(normalize(values)),
            Self::UInt(values) => Self::UInt(normalize(values)),
            Self::Float(values) => Self::Float(normalize(values)),
            Self::Text(values) => Self::Text(normalize(values)),
        }
    }

    /// Values converted to `f64`.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] for text.
    pub fn to_float(&self) -> Result<ArrayD<f64>> {
        match self {
            Self::Bool(values) => Ok(values.mapv(ToFloat::to_float)),
            Self::Int(values) => Ok(values.mapv(ToFloat::to_float)),
            Self::UInt(values) => Ok(values.mapv(ToFloat::to_float)),
            Self::Float(values) => Ok(values.clone()),
            Self::Text(_) => Err(Error::TypeMismatch {
                expected: Dtype::Float(8),
                found: Dtype::String,
            }),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&ArrayD<bool>> {
        match self {
            Self::Bool(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            Self::Int(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<&ArrayD<u64>> {
        match self {
            Self::UInt(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Float(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&ArrayD<String>> {
        match self {
            Self::Text(values) => Some(values),
            _ => None,
        }
    }
}

trait ToFloat: Copy {
    fn to_float(self) -> f64;
}

impl ToFloat for bool {
    fn to_float(self) -> f64 {
        f64::from(u8::from(self))
    }
}

#[allow(clippy::cast_precision_loss)]
impl ToFloat for i64 {
    fn to_float(self) -> f64 {
        self as f64
    }
}

#[allow(clippy::cast_precision_loss)]
impl ToFloat for u64 {
    fn to_float(self) -> f64 {
        self as f64
    }
}

/// Float view over a boolean or integer source.
struct FloatView<T> {
    inner: SourceRef<T>,
}

impl<T: ToFloat + 'static> FloatView<T> {
    fn share(inner: &SourceRef<T>) -> SourceRef<f64> {
        Rc::new(Self {
            inner: SourceRef::clone(inner),
        })
    }
}

impl<T: ToFloat> RecordSource<f64> for FloatView<T> {
    fn shape(&self) -> Result<Vec<usize>> {
        self.inner.shape()
    }

    fn dtype(&self) -> Result<Dtype> {
        self.inner.dtype()
    }

    fn name(&self) -> Option<String> {
        self.inner.name()
    }

    fn file_name(&self) -> Option<String> {
        self.inner.file_name()
    }

    fn read_range(&self, range: Range<usize>) -> Result<ArrayD<f64>> {
        Ok(self.inner.read_range(range)?.mapv(ToFloat::to_float))
    }

    fn read_coords(&self, coords: &[usize]) -> Result<ArrayD<f64>> {
        Ok(self.inner.read_coords(coords)?.mapv(ToFloat::to_float))
    }

    fn read_mask(&self, mask: &[bool]) -> Result<ArrayD<f64>> {
        Ok(self.inner.read_mask(mask)?.mapv(ToFloat::to_float))
    }

    fn read_all(&self) -> Result<ArrayD<f64>> {
        Ok(self.inner.read_all()?.mapv(ToFloat::to_float))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryArray, StoreState};
    use ndarray::{arr0, arr1, arr2};

    const BIG: u64 = 9_007_199_254_740_993;

    fn uint_column(state: &Rc<StoreState>) -> Column {
        let source: SourceRef<u64> = Rc::new(
            MemoryArray::new("/data/counter/data", arr1(&[BIG, 1, 2]).into_dyn())
                .in_file(Rc::clone(state)),
        );
        source.into()
    }

    #[test]
    fn integers_keep_their_type() {
        let state = StoreState::new("f.h5");
        let column = uint_column(&state);
        assert_eq!(column.dtype().unwrap(), Dtype::UInt(8));
        let records = column.read_positions(&Positions::from(vec![0, 2])).unwrap();
        assert_eq!(records.dtype(), Dtype::UInt(8));
        assert_eq!(records.as_uint().unwrap(), &arr1(&[BIG, 2]).into_dyn());
        assert!(records.as_float().is_none());
    }

    #[test]
    fn float_view_converts_on_read() {
        let state = StoreState::new("f.h5");
        let view = uint_column(&state).as_float().unwrap();
        assert_eq!(view.dtype().unwrap(), Dtype::UInt(8));
        assert_eq!(view.read_range(1..3).unwrap(), arr1(&[1.0, 2.0]).into_dyn());
    }

    #[test]
    fn text_has_no_float_view() {
        let source: SourceRef<String> = Rc::new(MemoryArray::new(
            "/meta/units",
            arr0("mm".to_string()).into_dyn(),
        ));
        let column = Column::from(source);
        assert!(matches!(
            column.as_float(),
            Err(Error::TypeMismatch { found: Dtype::String, .. })
        ));
        let records = column.read_all().unwrap();
        assert_eq!(records.as_text().unwrap().iter().next().unwrap(), "mm");
        assert!(records.to_float().is_err());
    }

    #[test]
    fn normalize_keeps_type() {
        let source: SourceRef<i64> = Rc::new(MemoryArray::new("x", arr2(&[[1_i64], [2]]).into_dyn()));
        let records = Column::from(source).read_range(0..2).unwrap().normalize();
        assert_eq!(records, Records::Int(arr1(&[1_i64, 2]).into_dyn()));
        assert_eq!(records.to_float().unwrap(), arr1(&[1.0, 2.0]).into_dyn());
    }

    #[test]
    fn guarded_column_fails_with_names() {
        let state = StoreState::new("f.h5");
        let column = uint_column(&state).guard();
        state.close();
        assert!(column.is_closed());
        let err = column.read_all().unwrap_err().to_string();
        assert!(err.contains("file \"f.h5\""), "{err}");
        assert!(err.contains("/data/counter/data"), "{err}");
    }
}
