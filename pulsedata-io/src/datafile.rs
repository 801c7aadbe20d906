//! Channel sets backed by files.

use crate::error::quoted_list;
use crate::options::OpenOptions;
use crate::source::FileSource;
use crate::{Error, Result};
use pulsedata_core::{Channel, ChannelSet, Meta};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The channels of one open file.
///
/// Dereferences to its [`ChannelSet`]. Closing the file, explicitly or on
/// drop, guards every channel and the file's metadata so later reads fail
/// with a closed-file error instead of touching an invalid handle.
pub struct DataFile {
    path: PathBuf,
    source: Box<dyn FileSource>,
    channels: ChannelSet,
    meta: Option<Meta>,
}

impl DataFile {
    /// Loads the channel groups of an open file.
    ///
    /// Groups that do not form a valid channel are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be listed.
    pub fn from_source(
        path: impl Into<PathBuf>,
        source: Box<dyn FileSource>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let path = path.into();
        let mut channels = ChannelSet::new();
        for (name, group) in source.channel_groups(&options.data_root)? {
            match Channel::from_group(name.as_str(), &*group, &options.layout) {
                Ok(channel) => {
                    channels.insert(Rc::new(channel.with_offset(options.pulse_id_offset)));
                }
                Err(err) => {
                    log::warn!(
                        "skipping channel \"{name}\" of \"{}\": {err}",
                        path.display()
                    );
                }
            }
        }
        let meta = source.meta(&options.layout.meta)?;
        log::debug!("loaded {} channels from {}", channels.len(), path.display());
        Ok(Self {
            path,
            source,
            channels,
            meta,
        })
    }

    /// Opens the HDF5 file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or listed.
    #[cfg(feature = "hdf5")]
    pub fn open<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let source = crate::hdf5::H5File::open(path)?;
        Self::from_source(path, Box::new(source), options)
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file's channels.
    #[must_use]
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// File-level metadata, if the file has a metadata group.
    #[must_use]
    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    /// Returns true once the file was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.source.is_open()
    }

    /// Guards every channel and the file metadata, then closes the file.
    /// Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns an error if the store fails to close the file.
    pub fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.channels.close();
        if let Some(meta) = &self.meta {
            meta.close();
        }
        self.source.close()
    }
}

impl Deref for DataFile {
    type Target = ChannelSet;

    fn deref(&self) -> &ChannelSet {
        &self.channels
    }
}

impl Drop for DataFile {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("failed to close \"{}\": {err}", self.path.display());
        }
    }
}

impl fmt::Display for DataFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataFile(\"{}\"): {} channels",
            self.path.display(),
            self.channels.len()
        )
    }
}

impl fmt::Debug for DataFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFile")
            .field("path", &self.path)
            .field("channels", &self.channels.names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The merged channels of several files of one run.
///
/// Channels of later files replace equally named channels of earlier ones.
pub struct DataFiles {
    files: Vec<DataFile>,
    channels: ChannelSet,
}

impl DataFiles {
    /// Opens every path with `open`, skipping files that fail.
    ///
    /// Paths are sorted and deduplicated, and ignored file types are dropped
    /// before anything is opened.
    ///
    /// # Errors
    /// Returns [`Error::NoMatchingFile`] if no path is left to open and
    /// [`Error::NoUsableFile`] if every file failed.
    pub fn load_with<I, P, F>(paths: I, options: &OpenOptions, mut open: F) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        F: FnMut(&Path, &OpenOptions) -> Result<DataFile>,
    {
        let mut paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        paths.sort();
        paths.dedup();
        let requested = quoted_list(paths.iter().map(|p| p.display()));
        let paths = options.remove_ignored(paths, "for this run");
        if paths.is_empty() {
            return Err(Error::NoMatchingFile(requested));
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            match open(path, options) {
                Ok(file) => files.push(file),
                Err(err) => log::warn!("skipping \"{}\": {err}", path.display()),
            }
        }
        if files.is_empty() {
            return Err(Error::NoUsableFile(requested));
        }
        Ok(Self::from_files(files))
    }

    /// Opens the HDF5 files at `paths`, skipping files that fail.
    ///
    /// # Errors
    /// See [`DataFiles::load_with`].
    #[cfg(feature = "hdf5")]
    pub fn open<I, P>(paths: I, options: &OpenOptions) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::load_with(paths, options, |path, options| DataFile::open(path, options))
    }

    /// Merges already opened files.
    #[must_use]
    pub fn from_files(files: Vec<DataFile>) -> Self {
        let mut channels = ChannelSet::new();
        for file in &files {
            channels.extend(file.channels());
        }
        Self { files, channels }
    }

    /// The opened files.
    #[must_use]
    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    /// Paths of the opened files.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(DataFile::path).collect()
    }

    /// The merged channels.
    #[must_use]
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Closes every file.
    ///
    /// # Errors
    /// Returns the first close error; the remaining files are still closed.
    pub fn close(&self) -> Result<()> {
        let mut first = None;
        for file in &self.files {
            if let Err(err) = file.close() {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Deref for DataFiles {
    type Target = ChannelSet;

    fn deref(&self) -> &ChannelSet {
        &self.channels
    }
}

impl fmt::Display for DataFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataFiles({}): {} channels",
            quoted_list(self.files.iter().map(|file| file.path().display())),
            self.channels.len()
        )
    }
}

impl fmt::Debug for DataFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.files.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryFile, MemoryGroup};
    use ndarray::{arr0, arr1, ArrayD};
    use pulsedata_core::Records;

    fn scalars() -> MemoryFile {
        MemoryFile::new("run_test.SCALARS.h5")
            .with_group("ch1", MemoryGroup::channel(&[0, 1, 2], arr1(&[0.1, 2.3, 4.5]).into_dyn()))
            .with_group("ch3", MemoryGroup::channel(&[0, 2], arr1(&[2.3, 4.5]).into_dyn()))
            .with_group(
                "no_data",
                MemoryGroup::new().with_ints("pulse_id", arr1(&[0_i64]).into_dyn()),
            )
    }

    #[test]
    fn broken_groups_are_skipped() {
        let file =
            DataFile::from_source("run_test.SCALARS.h5", Box::new(scalars()), &OpenOptions::default())
                .unwrap();
        assert_eq!(file.names(), vec!["ch1", "ch3"]);
        assert_eq!(file.to_string(), "DataFile(\"run_test.SCALARS.h5\"): 2 channels");
    }

    #[test]
    fn file_meta_is_read_and_guarded_on_close() {
        let source = scalars().with_meta(
            "meta",
            [
                ("gain", Records::from(arr1(&[1.5]).into_dyn())),
                ("user", Records::from(arr0("beamline".to_string()).into_dyn())),
            ],
        );
        let file = DataFile::from_source("run_test.SCALARS.h5", Box::new(source), &OpenOptions::default())
            .unwrap();
        let meta = file.meta().unwrap();
        assert_eq!(meta.names(), vec!["gain", "user"]);
        assert_eq!(
            meta.get("user").unwrap().as_text().unwrap().iter().next().unwrap(),
            "beamline"
        );

        file.close().unwrap();
        let message = file.meta().unwrap().get("gain").unwrap_err().to_string();
        assert!(message.contains("\"run_test.SCALARS.h5\""), "{message}");
        assert!(message.contains("/meta/gain"), "{message}");
    }

    #[test]
    fn files_without_meta_have_none() {
        let file = DataFile::from_source("f.h5", Box::new(scalars()), &OpenOptions::default())
            .unwrap();
        assert!(file.meta().is_none());
    }

    #[test]
    fn offset_applies_to_every_channel() {
        let options = OpenOptions::default().with_pulse_id_offset(1);
        let file = DataFile::from_source("f.h5", Box::new(scalars()), &options).unwrap();
        assert_eq!(file.get("ch3").unwrap().pids().unwrap().to_vec(), vec![-1, 1]);
    }

    #[test]
    fn close_guards_channels_and_is_idempotent() {
        let file =
            DataFile::from_source("run_test.SCALARS.h5", Box::new(scalars()), &OpenOptions::default())
                .unwrap();
        let ch1 = file.get("ch1").unwrap();
        file.close().unwrap();
        file.close().unwrap();
        assert!(file.is_closed());
        let message = ch1.data().unwrap_err().to_string();
        assert!(message.contains("\"run_test.SCALARS.h5\""), "{message}");
        assert!(message.contains("/data/ch1"), "{message}");
    }

    #[test]
    fn drop_closes_the_file() {
        let ch1 = {
            let file =
                DataFile::from_source("f.h5", Box::new(scalars()), &OpenOptions::default()).unwrap();
            file.get("ch1").unwrap()
        };
        assert!(ch1.is_closed());
        assert!(ch1.pids().is_err());
    }

    fn open_memory(path: &Path, options: &OpenOptions) -> Result<DataFile> {
        let name = path.display().to_string();
        if name.contains("broken") {
            return Err(Error::InvalidFormat(format!("not an HDF5 file: {name}")));
        }
        let data: ArrayD<f64> = arr1(&[1.0, 2.0]).into_dyn();
        let file = MemoryFile::new(name.clone())
            .with_group(format!("{name}-ch"), MemoryGroup::channel(&[0, 1], data))
            .with_group("shared", MemoryGroup::channel(&[0], arr1(&[0.0]).into_dyn()));
        DataFile::from_source(path, Box::new(file), options)
    }

    #[test]
    fn files_are_merged_sorted_and_filtered() {
        let paths = [
            "run.B.h5",
            "run.A.h5",
            "run.PVCHANNELS.h5",
            "run.broken.h5",
            "run.A.h5",
        ];
        let files = DataFiles::load_with(paths, &OpenOptions::default(), open_memory).unwrap();
        assert_eq!(files.paths(), vec![Path::new("run.A.h5"), Path::new("run.B.h5")]);
        assert_eq!(files.names(), vec!["run.A.h5-ch", "shared", "run.B.h5-ch"]);
        assert_eq!(
            files.to_string(),
            "DataFiles(\"run.A.h5\", \"run.B.h5\"): 3 channels"
        );
        files.close().unwrap();
        assert!(files.files().iter().all(DataFile::is_closed));
    }

    #[test]
    fn nothing_to_open_is_an_error() {
        let none: [&str; 0] = [];
        assert!(matches!(
            DataFiles::load_with(none, &OpenOptions::default(), open_memory),
            Err(Error::NoMatchingFile(_))
        ));
        assert!(matches!(
            DataFiles::load_with(["run.PVCHANNELS.h5"], &OpenOptions::default(), open_memory),
            Err(Error::NoMatchingFile(_))
        ));
        assert!(matches!(
            DataFiles::load_with(["run.broken.h5"], &OpenOptions::default(), open_memory),
            Err(Error::NoUsableFile(_))
        ));
    }
}
