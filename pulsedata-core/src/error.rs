//! Error types for pulsedata-core.

use crate::source::Dtype;
use std::fmt;
use thiserror::Error;

/// Result type alias for pulsedata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for pulsedata operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required member is missing from a channel group.
    #[error("dataset \"{dataset}\" not found in {}", describe("group", .group))]
    DatasetNotFound {
        dataset: String,
        group: Option<String>,
    },

    /// Pulse ids and data records of a channel differ in length.
    #[error("array length mismatch in channel \"{name}\": {npids} pulse ids vs. {ndata} records")]
    LengthMismatch {
        name: String,
        npids: usize,
        ndata: usize,
    },

    /// Intersection or union requested over zero channels.
    #[error("cannot align pulse ids of an empty channel set")]
    EmptyChannelSet,

    /// Unknown channel or metadata name.
    #[error("key not found: \"{0}\"")]
    KeyNotFound(String),

    /// Access through a handle whose file has been closed.
    #[error(transparent)]
    Closed(#[from] ClosedError),

    /// Index outside of the addressed axis.
    #[error("index {index} is out of bounds for axis {axis} with size {len}")]
    IndexOutOfBounds { index: usize, axis: usize, len: usize },

    /// Selection the backing store cannot perform.
    #[error("unsupported selection: {0}")]
    UnsupportedSelection(String),

    /// Explicit positions that are unsorted or out of range.
    #[error("invalid positions: {0}")]
    InvalidPositions(String),

    /// Values of one element type requested as another.
    #[error("cannot read {found} values as {expected}")]
    TypeMismatch { expected: Dtype, found: Dtype },

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Array shape error.
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Failure reported by the backing store.
    #[error("store error: {0}")]
    Store(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Access to a handle after its owning file was closed.
///
/// Carries the file and group names captured when the handle was guarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedError {
    pub file_name: Option<String>,
    pub group_name: Option<String>,
}

impl fmt::Display for ClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} containing {} is closed...\nDid you try to access data after the file was closed or dropped?",
            describe("file", &self.file_name),
            describe("group", &self.group_name),
        )
    }
}

impl std::error::Error for ClosedError {}

/// `file "name"` for known names, `unknown file` otherwise.
pub(crate) fn describe(kind: &str, name: &Option<String>) -> String {
    match name.as_deref() {
        Some(name) if !name.is_empty() => format!("{kind} \"{name}\""),
        _ => format!("unknown {kind}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_error_names_both_handles() {
        let err = ClosedError {
            file_name: Some("run_0001.BSDATA.h5".to_string()),
            group_name: Some("/data/SAR-CVME-TIFALL5:EvtSet".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with(
            "file \"run_0001.BSDATA.h5\" containing group \"/data/SAR-CVME-TIFALL5:EvtSet\" is closed"
        ));
    }

    #[test]
    fn closed_error_marks_unknown_names() {
        let err = ClosedError {
            file_name: None,
            group_name: Some(String::new()),
        };
        assert!(err
            .to_string()
            .starts_with("unknown file containing unknown group is closed"));
    }

    #[test]
    fn dataset_not_found_names_group() {
        let err = Error::DatasetNotFound {
            dataset: "pulse_id".to_string(),
            group: Some("/data/ch1".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "dataset \"pulse_id\" not found in group \"/data/ch1\""
        );
    }
}
