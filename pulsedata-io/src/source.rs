//! File-level store access.

use crate::Result;
use pulsedata_core::{GroupSource, Meta};

/// An open file of the backing store.
pub trait FileSource {
    /// Path of the file.
    fn file_name(&self) -> String;

    /// Channel groups below `root`, in storage order.
    ///
    /// Files without a `root` group keep their channel groups at the top
    /// level; members that are not groups are skipped.
    ///
    /// # Errors
    /// Returns an error if the file cannot be listed.
    fn channel_groups(&self, root: &str) -> Result<Vec<(String, Box<dyn GroupSource>)>>;

    /// Top-level metadata group `member`, `None` if absent.
    ///
    /// # Errors
    /// Returns an error if the group exists but cannot be opened.
    fn meta(&self, member: &str) -> Result<Option<Meta>>;

    /// Returns true until [`FileSource::close`] was called.
    fn is_open(&self) -> bool;

    /// Closes the file, invalidating every handle obtained from it.
    ///
    /// # Errors
    /// Returns an error if the store fails to close the file.
    fn close(&self) -> Result<()>;
}
