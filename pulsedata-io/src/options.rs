//! Options for opening data files.

use pulsedata_core::{ChannelLayout, PulseId};
use std::path::Path;

/// Group holding the channel groups of a file.
pub const DEFAULT_DATA_ROOT: &str = "data";

/// File types skipped when loading a run.
pub const IGNORED_FILETYPES: &[&str] = &["PVCHANNELS"];

/// How data files are opened and read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    /// Group holding the channel groups. Files without it keep their
    /// channels at the top level.
    pub data_root: String,
    /// Member names inside a channel group.
    pub layout: ChannelLayout,
    /// Offset subtracted from every pulse id.
    pub pulse_id_offset: PulseId,
    /// File types (`run.<TYPE>.h5`) that are never opened.
    pub ignored_filetypes: Vec<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            data_root: DEFAULT_DATA_ROOT.to_string(),
            layout: ChannelLayout::default(),
            pulse_id_offset: 0,
            ignored_filetypes: IGNORED_FILETYPES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl OpenOptions {
    /// Set the group holding the channel groups.
    #[must_use]
    pub fn with_data_root(mut self, data_root: impl Into<String>) -> Self {
        self.data_root = data_root.into();
        self
    }

    /// Set the member names inside a channel group.
    #[must_use]
    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the offset subtracted from every pulse id.
    #[must_use]
    pub fn with_pulse_id_offset(mut self, offset: PulseId) -> Self {
        self.pulse_id_offset = offset;
        self
    }

    /// Set the file types that are never opened.
    #[must_use]
    pub fn with_ignored_filetypes<I, S>(mut self, filetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_filetypes = filetypes.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if `path` is of an ignored file type.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        filetype(path).is_some_and(|ftype| self.ignored_filetypes.iter().any(|ign| ign == ftype))
    }

    /// Splits off paths of ignored file types, logging how many were dropped.
    pub fn remove_ignored<P: AsRef<Path>>(&self, paths: Vec<P>, context: &str) -> Vec<P> {
        let total = paths.len();
        let kept: Vec<P> = paths
            .into_iter()
            .filter(|path| !self.is_ignored(path.as_ref()))
            .collect();
        let nignored = total - kept.len();
        if nignored > 0 {
            log::warn!(
                "will ignore {nignored} file{} {context} of the type{}: {}",
                if nignored == 1 { "" } else { "s" },
                if self.ignored_filetypes.len() == 1 { "" } else { "s" },
                self.ignored_filetypes.join(", ")
            );
        }
        kept
    }
}

/// File type of `run.<TYPE>.h5`, the second-to-last dot-separated component.
#[must_use]
pub fn filetype(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.rsplit('.').nth(1)
}
