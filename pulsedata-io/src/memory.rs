//! In-memory files, laid out like the HDF5 files the loaders read.
//!
//! Used to exercise the loaders without touching disk, and as a small
//! backend for data assembled at runtime.

use crate::source::FileSource;
use crate::Result;
use ndarray::{Array1, ArrayD};
use pulsedata_core::{
    Column, Element, GroupSource, MemoryArray, Meta, PulseId, Records, Result as CoreResult,
    SourceRef, StoreState,
};
use std::rc::Rc;

type Entries = Vec<(String, Records)>;

fn entries<I, S, R>(entries: I) -> Entries
where
    I: IntoIterator<Item = (S, R)>,
    S: Into<String>,
    R: Into<Records>,
{
    entries
        .into_iter()
        .map(|(key, values)| (key.into(), values.into()))
        .collect()
}

/// Members of one channel group.
#[derive(Clone, Debug, Default)]
pub struct MemoryGroup {
    ints: Vec<(String, ArrayD<i64>)>,
    arrays: Entries,
    meta: Option<(String, Entries)>,
}

impl MemoryGroup {
    /// Creates a group without members.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Group with `pulse_id` and `data` members.
    #[must_use]
    pub fn channel(pids: &[PulseId], data: ArrayD<f64>) -> Self {
        Self::new()
            .with_ints("pulse_id", Array1::from(pids.to_vec()).into_dyn())
            .with_floats("data", data)
    }

    /// Add an integer member.
    #[must_use]
    pub fn with_ints(mut self, name: impl Into<String>, values: ArrayD<i64>) -> Self {
        self.ints.push((name.into(), values));
        self
    }

    /// Add a floating-point member.
    #[must_use]
    pub fn with_floats(self, name: impl Into<String>, values: ArrayD<f64>) -> Self {
        self.with_array(name, values)
    }

    /// Add a member of any supported element type.
    #[must_use]
    pub fn with_array(mut self, name: impl Into<String>, values: impl Into<Records>) -> Self {
        self.arrays.push((name.into(), values.into()));
        self
    }

    /// Add a metadata sub-group.
    #[must_use]
    pub fn with_meta<I, S, R>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (S, R)>,
        S: Into<String>,
        R: Into<Records>,
    {
        self.meta = Some((name.into(), entries(values)));
        self
    }
}

/// File held in memory.
pub struct MemoryFile {
    state: Rc<StoreState>,
    root: Option<String>,
    groups: Vec<(String, MemoryGroup)>,
    meta: Option<(String, Entries)>,
}

impl MemoryFile {
    /// Creates an open file whose channel groups live below `/data`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: StoreState::new(name),
            root: Some(crate::options::DEFAULT_DATA_ROOT.to_string()),
            groups: Vec::new(),
            meta: None,
        }
    }

    /// Place the channel groups below `root`, or at the top level for `None`.
    #[must_use]
    pub fn with_root(mut self, root: Option<&str>) -> Self {
        self.root = root.map(ToString::to_string);
        self
    }

    /// Add a channel group.
    #[must_use]
    pub fn with_group(mut self, name: impl Into<String>, group: MemoryGroup) -> Self {
        self.groups.push((name.into(), group));
        self
    }

    /// Add a top-level metadata group.
    #[must_use]
    pub fn with_meta<I, S, R>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (S, R)>,
        S: Into<String>,
        R: Into<Records>,
    {
        self.meta = Some((name.into(), entries(values)));
        self
    }

    /// Shared open/closed state of the file.
    #[must_use]
    pub fn state(&self) -> &Rc<StoreState> {
        &self.state
    }

    fn group_path(&self, name: &str) -> String {
        match &self.root {
            Some(root) => format!("/{root}/{name}"),
            None => format!("/{name}"),
        }
    }
}

fn array<T: Element>(state: &Rc<StoreState>, path: String, values: &ArrayD<T>) -> SourceRef<T> {
    Rc::new(MemoryArray::new(path, values.clone()).in_file(Rc::clone(state)))
}

fn column(state: &Rc<StoreState>, path: String, values: &Records) -> Column {
    match values {
        Records::Bool(values) => array(state, path, values).into(),
        Records::Int(values) => array(state, path, values).into(),
        Records::UInt(values) => array(state, path, values).into(),
        Records::Float(values) => array(state, path, values).into(),
        Records::Text(values) => array(state, path, values).into(),
    }
}

fn meta(state: &Rc<StoreState>, path: &str, entries: &Entries) -> Meta {
    Meta::new(
        entries
            .iter()
            .map(|(key, values)| (key.clone(), column(state, format!("{path}/{key}"), values)))
            .collect(),
    )
}

struct MemoryGroupSource {
    path: String,
    group: MemoryGroup,
    state: Rc<StoreState>,
}

impl MemoryGroupSource {
    fn member_path(&self, member: &str) -> String {
        format!("{}/{member}", self.path)
    }
}

impl GroupSource for MemoryGroupSource {
    fn name(&self) -> Option<String> {
        self.state.is_open().then(|| self.path.clone())
    }

    fn file_name(&self) -> Option<String> {
        self.state.is_open().then(|| self.state.name().to_string())
    }

    fn int_array(&self, member: &str) -> CoreResult<Option<SourceRef<i64>>> {
        Ok(self
            .group
            .ints
            .iter()
            .find(|(name, _)| name == member)
            .map(|(name, values)| array(&self.state, self.member_path(name), values)))
    }

    fn column(&self, member: &str) -> CoreResult<Option<Column>> {
        if let Some((name, values)) = self.group.arrays.iter().find(|(name, _)| name == member) {
            return Ok(Some(column(&self.state, self.member_path(name), values)));
        }
        Ok(self.int_array(member)?.map(Column::from))
    }

    fn meta(&self, member: &str) -> CoreResult<Option<Meta>> {
        let Some((name, entries)) = self.group.meta.as_ref().filter(|(name, _)| name == member)
        else {
            return Ok(None);
        };
        Ok(Some(meta(&self.state, &self.member_path(name), entries)))
    }
}

impl FileSource for MemoryFile {
    fn file_name(&self) -> String {
        self.state.name().to_string()
    }

    fn channel_groups(&self, root: &str) -> Result<Vec<(String, Box<dyn GroupSource>)>> {
        if self.root.as_deref().is_some_and(|own| own != root) {
            return Ok(Vec::new());
        }
        Ok(self
            .groups
            .iter()
            .map(|(name, group)| {
                let source: Box<dyn GroupSource> = Box::new(MemoryGroupSource {
                    path: self.group_path(name),
                    group: group.clone(),
                    state: Rc::clone(&self.state),
                });
                (name.clone(), source)
            })
            .collect())
    }

    fn meta(&self, member: &str) -> Result<Option<Meta>> {
        Ok(self
            .meta
            .as_ref()
            .filter(|(name, _)| name == member)
            .map(|(name, entries)| meta(&self.state, &format!("/{name}"), entries)))
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn close(&self) -> Result<()> {
        self.state.close();
        Ok(())
    }
}
