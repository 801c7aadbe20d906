//! Scan metadata: which files belong to which step of a parameter scan.

use crate::datafile::{DataFile, DataFiles};
use crate::options::OpenOptions;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Per-step values of a scan.
///
/// Steps that carry a single value each are stored flat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub enum ScanValues {
    Flat(Vec<f64>),
    Rows(Vec<Vec<f64>>),
}

impl From<Vec<Vec<f64>>> for ScanValues {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        if !rows.is_empty() && rows.iter().all(|row| row.len() == 1) {
            Self::Flat(rows.into_iter().flatten().collect())
        } else {
            Self::Rows(rows)
        }
    }
}

impl From<ScanValues> for Vec<Vec<f64>> {
    fn from(values: ScanValues) -> Self {
        match values {
            ScanValues::Flat(values) => values.into_iter().map(|v| vec![v]).collect(),
            ScanValues::Rows(rows) => rows,
        }
    }
}

impl ScanValues {
    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(values) => values.len(),
            Self::Rows(rows) => rows.len(),
        }
    }

    /// Returns true for a scan without steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of step `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&[f64]> {
        match self {
            Self::Flat(values) => values.get(index).map(std::slice::from_ref),
            Self::Rows(rows) => rows.get(index).map(Vec::as_slice),
        }
    }
}

/// Contents of a scan-info JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    /// Data files recorded at each step.
    #[serde(rename = "scan_files")]
    pub files: Vec<Vec<String>>,
    /// Description of the scanned parameters, kept as written.
    #[serde(rename = "scan_parameters")]
    pub parameters: serde_json::Value,
    /// Set values per step.
    #[serde(rename = "scan_values")]
    pub values: ScanValues,
    /// Read-back values per step.
    #[serde(rename = "scan_readbacks")]
    pub readbacks: ScanValues,
}

/// One step of a scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanStep<'a> {
    pub index: usize,
    pub files: &'a [String],
    pub value: Option<&'a [f64]>,
    pub readback: Option<&'a [f64]>,
}

impl ScanInfo {
    /// Reads a scan-info file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid scan-info
    /// JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses scan-info JSON.
    ///
    /// # Errors
    /// Returns an error for malformed JSON or missing keys.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true for a scan without steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Step `index`, if it exists.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<ScanStep<'_>> {
        let files = self.files.get(index)?;
        Some(ScanStep {
            index,
            files,
            value: self.values.get(index),
            readback: self.readbacks.get(index),
        })
    }

    /// Iterates over the steps in order.
    pub fn steps(&self) -> impl Iterator<Item = ScanStep<'_>> + '_ {
        (0..self.len()).filter_map(|index| self.step(index))
    }

    /// Step files with ignored file types removed, over the whole scan.
    #[must_use]
    pub fn usable_files(&self, options: &OpenOptions) -> Vec<Vec<String>> {
        let all: Vec<(usize, String)> = self
            .files
            .iter()
            .enumerate()
            .flat_map(|(step, files)| files.iter().map(move |f| (step, f.clone())))
            .collect();
        let kept = options.remove_ignored(
            all.into_iter().map(|(step, f)| StepFile(step, f)).collect(),
            "over the whole scan",
        );
        let mut out = vec![Vec::new(); self.len()];
        for StepFile(step, file) in kept {
            out[step].push(file);
        }
        out
    }

    /// Opens the files of step `index` with `open`.
    ///
    /// # Errors
    /// Returns [`pulsedata_core::Error::IndexOutOfBounds`] for an unknown step, or
    /// the error of [`DataFiles::load_with`].
    pub fn open_step_with<F>(&self, index: usize, options: &OpenOptions, open: F) -> Result<DataFiles>
    where
        F: FnMut(&Path, &OpenOptions) -> Result<DataFile>,
    {
        let step = self.step(index).ok_or(pulsedata_core::Error::IndexOutOfBounds {
            index,
            axis: 0,
            len: self.len(),
        })?;
        log::debug!("opening scan step {index} ({} files)", step.files.len());
        DataFiles::load_with(step.files, options, open)
    }

    /// Opens the HDF5 files of step `index`.
    ///
    /// # Errors
    /// See [`ScanInfo::open_step_with`].
    #[cfg(feature = "hdf5")]
    pub fn open_step(&self, index: usize, options: &OpenOptions) -> Result<DataFiles> {
        self.open_step_with(index, options, |path, options| DataFile::open(path, options))
    }
}

struct StepFile(usize, String);

impl AsRef<Path> for StepFile {
    fn as_ref(&self) -> &Path {
        Path::new(&self.1)
    }
}
