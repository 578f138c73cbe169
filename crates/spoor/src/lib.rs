//! Spoor - Trace Corpus Analysis Core
//!
//! This crate provides the analysis primitives that let a tooling front end
//! work with trace/log corpora too large to hold in memory.
//!
//! # Components
//!
//! - [`CheckpointIndex`]: sparse, persistable fast-seek index over one
//!   record source
//! - [`FlowReconstructor`]: groups endpoint-tagged packets into
//!   bidirectional flows with running statistics
//! - [`EventMatcher`]: pairs causally related records across independently
//!   captured streams
//! - [`SyncGraph`]: clock-transform path and connectivity queries between
//!   traces
//!
//! All four consume the same abstraction: an ordered, restartable
//! [`RecordSource`] supplied by a format-specific decoder. The core never
//! parses a concrete trace format.
//!
//! # Example
//!
//! ```rust,ignore
//! use spoor::{CheckpointIndex, MemorySource};
//!
//! // Build a checkpoint index with one forward scan
//! let source = MemorySource::with_uniform_timestamps(0, 1_000_000, 100_000);
//! let index = CheckpointIndex::build(&source, 1000)?;
//!
//! // Locate a timestamp in O(log n), then scan forward from the context
//! let ctx = index.find_nearest(42_000_000_000);
//! let mut cursor = source.seek_context(&ctx)?;
//! while let Some(record) = cursor.next_record()? {
//!     // ...
//! }
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod flow;
pub mod index;
pub mod matcher;
pub mod source;
pub mod sync;

pub use error::{Result, SpoorError};
pub use flow::{Endpoint, Flow, FlowDirection, FlowReconstructor, PacketMeta, ProtocolKind};
pub use index::{
    spawn_build, BuildReport, BuildStatus, Checkpoint, CheckpointIndex, IndexBuilder,
    DEFAULT_CHECKPOINT_INTERVAL,
};
pub use matcher::{
    Classifier, Dependency, EventMatcher, MatchDirection, MatchKey, MatchStats, RecordRef,
};
pub use source::{
    Context, Fingerprint, Location, MemorySource, OffsetLocation, Rank, Record, RecordCursor,
    RecordSource, Timestamp,
};
pub use sync::{SyncEdge, SyncGraph};
