//! pulsedata-io: File loading for pulsedata.
//!
//! This crate opens channel-wise HDF5 files (behind the `hdf5` feature),
//! merges the files of a run and reads scan metadata.
//!

mod datafile;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod memory;
pub mod options;
pub mod scan;
mod source;

pub use datafile::{DataFile, DataFiles};
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{Decode, H5Dataset, H5File, H5Group, H5Text};
pub use memory::{MemoryFile, MemoryGroup};
pub use options::{filetype, OpenOptions, DEFAULT_DATA_ROOT, IGNORED_FILETYPES};
pub use scan::{ScanInfo, ScanStep, ScanValues};
pub use source::FileSource;
