//! pulsedata-core: Channels, pulse-id alignment and windowed reads.
//!
//! This crate provides the store-independent part of pulsedata: the
//! [`RecordSource`] capability trait, per-channel valid-position tracking,
//! cross-channel alignment, batched windowed reads and the closed-file guard.
//!

pub mod align;
pub mod batch;
pub mod channel;
pub mod channelset;
pub mod column;
pub mod error;
pub mod guard;
pub mod mask;
pub mod meta;
pub mod shape;
pub mod source;
pub mod stats;
pub mod valid;

pub use align::PulseId;
pub use batch::{
    apply_batches, read_batches, Batch, BatchConfig, BatchReader, IndexWindower, Window,
    DEFAULT_BATCH_SIZE,
};
pub use channel::{Channel, ChannelLayout, ChannelRef, GroupSource};
pub use channelset::{ChannelSet, Key, Selection};
pub use column::{Column, Records};
pub use error::{ClosedError, Error, Result};
pub use guard::ClosedHandle;
pub use mask::{mask_to_coords, read_masked};
pub use meta::Meta;
pub use shape::normalize;
pub use source::{Dtype, Element, MemoryArray, RecordSource, SourceRef, StoreState};
pub use stats::{Stats, StatsOptions};
pub use valid::{Positions, Valid};
