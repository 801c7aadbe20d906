//! Keyed collections of channels and cross-channel alignment.

use crate::align::{intersection, positions_in, union, PulseId};
use crate::channel::ChannelRef;
use crate::stats::{ChannelStats, Stats, StatsOptions};
use crate::{Error, Result};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

/// Name-keyed set of channels in insertion order.
///
/// A set holds its channels through [`ChannelRef`]s. Subsets made with
/// [`ChannelSet::subset`] share the channel objects with the set they were
/// taken from: [`ChannelSet::drop_missing`] or [`ChannelSet::reset_valid`] on
/// one of them changes what every set holding those channels reads.
#[derive(Clone, Default)]
pub struct ChannelSet {
    channels: Vec<ChannelRef>,
}

/// Lookup key for [`ChannelSet::select`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key<'a> {
    /// A single channel.
    Name(&'a str),
    /// A subset of channels.
    Names(Vec<&'a str>),
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&[&'a str]> for Key<'a> {
    fn from(names: &[&'a str]) -> Self {
        Self::Names(names.to_vec())
    }
}

impl<'a> From<Vec<&'a str>> for Key<'a> {
    fn from(names: Vec<&'a str>) -> Self {
        Self::Names(names)
    }
}

/// Result of [`ChannelSet::select`].
#[derive(Debug)]
pub enum Selection {
    Channel(ChannelRef),
    Set(ChannelSet),
}

impl ChannelSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `channel`, replacing a channel of the same name in place.
    ///
    /// Returns the replaced channel.
    pub fn insert(&mut self, channel: ChannelRef) -> Option<ChannelRef> {
        match self.position(channel.name()) {
            Some(i) => Some(std::mem::replace(&mut self.channels[i], channel)),
            None => {
                self.channels.push(channel);
                None
            }
        }
    }

    /// Adds every channel of `other`, sharing them.
    pub fn extend(&mut self, other: &ChannelSet) {
        for channel in &other.channels {
            self.insert(Rc::clone(channel));
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|ch| ch.name() == name)
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the set holds no channel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns true if a channel called `name` is in the set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Channel names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|ch| ch.name().to_string()).collect()
    }

    /// Channels in insertion order.
    #[must_use]
    pub fn channels(&self) -> &[ChannelRef] {
        &self.channels
    }

    /// Iterates over the channels in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChannelRef> {
        self.channels.iter()
    }

    /// The channel called `name`.
    ///
    /// # Errors
    /// Returns [`Error::KeyNotFound`] for unknown names.
    pub fn get(&self, name: &str) -> Result<ChannelRef> {
        self.position(name)
            .map(|i| Rc::clone(&self.channels[i]))
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))
    }

    /// New set sharing the named channels, in the order given.
    ///
    /// # Errors
    /// Returns [`Error::KeyNotFound`] for the first unknown name.
    pub fn subset<I, S>(&self, names: I) -> Result<ChannelSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut subset = ChannelSet::new();
        for name in names {
            subset.insert(self.get(name.as_ref())?);
        }
        Ok(subset)
    }

    /// A single channel for a name, a subset for a list of names.
    ///
    /// # Errors
    /// Returns [`Error::KeyNotFound`] for unknown names.
    pub fn select<'a>(&self, key: impl Into<Key<'a>>) -> Result<Selection> {
        match key.into() {
            Key::Name(name) => self.get(name).map(Selection::Channel),
            Key::Names(names) => self.subset(names).map(Selection::Set),
        }
    }

    /// Pulse ids present in every channel, through each channel's selector.
    ///
    /// # Errors
    /// Returns [`Error::EmptyChannelSet`] for an empty set, or a read error.
    pub fn pids(&self) -> Result<Vec<PulseId>> {
        intersection(self.pid_lists()?)
    }

    /// Pulse ids present in any channel, through each channel's selector.
    ///
    /// # Errors
    /// Returns [`Error::EmptyChannelSet`] for an empty set, or a read error.
    pub fn all_pids(&self) -> Result<Vec<PulseId>> {
        union(self.pid_lists()?)
    }

    fn pid_lists(&self) -> Result<Vec<Vec<PulseId>>> {
        self.channels
            .iter()
            .map(|ch| ch.pids().map(|ids| ids.to_vec()))
            .collect()
    }

    /// Restricts every channel to the pulse ids all channels share.
    ///
    /// Selectors are reset first, so the result does not depend on earlier
    /// calls. Channels that keep every record stay on [`crate::Valid::All`].
    ///
    /// # Errors
    /// Returns [`Error::EmptyChannelSet`] for an empty set, or a read error.
    pub fn drop_missing(&self) -> Result<()> {
        self.reset_valid();
        let common = self.pids()?;
        log::debug!(
            "aligning {} channels on {} common pulse ids",
            self.len(),
            common.len()
        );
        for ch in &self.channels {
            let ids = ch.raw_pids()?.to_vec();
            let keep = positions_in(&ids, &common);
            if keep.len() < ids.len() {
                log::trace!(
                    "channel {} keeps {} of {} records",
                    ch.name(),
                    keep.len(),
                    ids.len()
                );
                ch.set_valid_positions(keep)?;
            }
        }
        Ok(())
    }

    /// Makes every record of every channel valid again.
    pub fn reset_valid(&self) {
        for ch in &self.channels {
            ch.reset_valid();
        }
    }

    /// Guards every channel's handles.
    pub fn close(&self) {
        for ch in &self.channels {
            ch.close();
        }
    }

    /// Writes the channel names, one per line, to `path`.
    ///
    /// # Errors
    /// Fails with an I/O error of kind `AlreadyExists` if the file exists and
    /// `overwrite` is false, or with any other write error.
    pub fn save_names(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        let file = if overwrite {
            fs::File::create(path)?
        } else {
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)?
        };
        let mut writer = BufWriter::new(file);
        for name in self.names() {
            writeln!(writer, "{name}")?;
        }
        writer.flush()?;
        log::debug!("wrote {} channel names to {}", self.len(), path.display());
        Ok(())
    }

    /// Per-channel record counts against the union of pulse ids.
    ///
    /// # Errors
    /// Returns [`Error::EmptyChannelSet`] for an empty set, or a read error.
    pub fn stats(&self) -> Result<Stats> {
        let ntotal = self.all_pids()?.len();
        let ncommon = self.pids()?.len();
        let channels = self
            .channels
            .iter()
            .map(|ch| {
                Ok(ChannelStats {
                    name: ch.name().to_string(),
                    count: ch.nvalid()?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Stats {
            channels,
            ncommon,
            ntotal,
        })
    }

    /// Writes the missing-data report to `out`.
    ///
    /// # Errors
    /// Returns an alignment or read error, or an error of the writer.
    pub fn write_stats<W: Write>(&self, out: &mut W, options: &StatsOptions) -> Result<()> {
        self.stats()?.write(out, options)?;
        Ok(())
    }
}

impl FromIterator<ChannelRef> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = ChannelRef>>(iter: I) -> Self {
        let mut set = ChannelSet::new();
        for channel in iter {
            set.insert(channel);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ChannelSet {
    type Item = &'a ChannelRef;
    type IntoIter = std::slice::Iter<'a, ChannelRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.channels.iter()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelSet: {} channels", self.len())
    }
}

impl fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.channels.iter()).finish()
    }
}
