//! Checkpoint index: sparse fast-seek anchors over one record source.
//!
//! The index is built by a single full forward scan that samples a
//! [`Checkpoint`] every `interval` records. Lookups binary-search the stored
//! checkpoints and return a [`Context`] the caller resumes scanning from,
//! bounding a seek to `O(log(n / interval) + interval)`.
//!
//! # Lifecycle
//!
//! ```text
//! build (one forward scan) → frozen index → persist / share (read-only)
//!                                         → load on later runs if the
//!                                           source fingerprint still matches
//! ```
//!
//! A completed index is immutable; share it behind an `Arc` across any
//! number of readers. While a build is running the builder owns the index,
//! so partially built checkpoint state is never observable. Long builds run
//! on a dedicated thread via [`spawn_build`] and deliver their result as a
//! message; cancellation is requested through a shared flag checked every
//! [`CANCEL_CHECK_INTERVAL`] records.

mod file;

pub use file::{INDEX_HEADER_SIZE, INDEX_MAGIC, INDEX_MAGIC_REVERSE, INDEX_VERSION};

use crate::error::{Result, SpoorError};
use crate::source::{Context, Fingerprint, Location, Rank, RecordCursor, RecordSource, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, error};

/// Default spacing between checkpoints, in records.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 1000;

/// How often (in records) a build checks its cancellation flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// A stored `(timestamp, location, rank)` fast-seek anchor.
///
/// Seeking to `location` yields exactly the record with this `rank` and
/// `timestamp` as the next record read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint<L: Location> {
    /// Timestamp of the record at this checkpoint.
    pub timestamp: Timestamp,
    /// Source location of the record at this checkpoint.
    pub location: L,
    /// Rank of the record at this checkpoint.
    pub rank: Rank,
}

impl<L: Location> Context<L> {
    /// Returns a context seeded from a checkpoint.
    pub fn from_checkpoint(checkpoint: &Checkpoint<L>) -> Self {
        Self {
            location: Some(checkpoint.location.clone()),
            rank: checkpoint.rank,
        }
    }
}

/// Outcome of an index build.
#[derive(Debug)]
pub enum BuildStatus {
    /// The full source was scanned.
    Complete,
    /// The cancellation flag was raised; the index covers ranks scanned so
    /// far.
    Cancelled,
    /// The source reported a read error; the index covers ranks scanned
    /// before the failure.
    Aborted(SpoorError),
}

impl BuildStatus {
    /// Returns true if the build scanned the full source.
    pub fn is_complete(&self) -> bool {
        matches!(self, BuildStatus::Complete)
    }
}

/// The index produced by a build, together with how the build ended.
///
/// A partial index (cancelled or aborted build) is still usable for ranks
/// before the point the scan stopped.
#[derive(Debug)]
pub struct BuildReport<L: Location> {
    /// The built (possibly partial) index.
    pub index: CheckpointIndex<L>,
    /// How the build ended.
    pub status: BuildStatus,
}

/// Configures and runs index builds.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    interval: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl IndexBuilder {
    /// Creates a builder sampling a checkpoint every `interval` records.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new(interval: u64) -> Self {
        assert!(interval > 0, "checkpoint interval must be at least 1");
        Self {
            interval,
            cancel: None,
        }
    }

    /// Attaches a cancellation flag, checked every
    /// [`CANCEL_CHECK_INTERVAL`] records.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Performs one full forward scan of `source` and returns the index.
    ///
    /// The scan samples a checkpoint at every `interval`-th rank starting at
    /// rank 0. A zero- or one-record source yields an index with zero or one
    /// checkpoints. On cancellation or a source read error the checkpoints
    /// collected so far are returned with the corresponding status.
    pub fn run<S: RecordSource>(&self, source: &S) -> BuildReport<S::Loc> {
        let fingerprint = source.fingerprint();
        let mut checkpoints = Vec::new();
        let mut rank: Rank = 0;

        let mut cursor = match source.seek(None) {
            Ok(cursor) => cursor,
            Err(err) => {
                return BuildReport {
                    index: CheckpointIndex::from_parts(fingerprint, self.interval, 0, Vec::new()),
                    status: BuildStatus::Aborted(err),
                }
            }
        };

        let status = loop {
            if rank % CANCEL_CHECK_INTERVAL == 0 {
                if let Some(flag) = &self.cancel {
                    if flag.load(Ordering::Relaxed) {
                        break BuildStatus::Cancelled;
                    }
                }
            }

            // Location must be captured before the read so the checkpoint
            // points at the record it describes.
            let location = cursor.location();
            match cursor.next_record() {
                Ok(Some(record)) => {
                    if rank % self.interval == 0 {
                        checkpoints.push(Checkpoint {
                            timestamp: record.timestamp,
                            location,
                            rank,
                        });
                    }
                    rank += 1;
                }
                Ok(None) => break BuildStatus::Complete,
                Err(err) => break BuildStatus::Aborted(err),
            }
        };

        debug!(
            total_records = rank,
            checkpoints = checkpoints.len(),
            complete = status.is_complete(),
            "index build finished"
        );

        BuildReport {
            index: CheckpointIndex::from_parts(fingerprint, self.interval, rank, checkpoints),
            status,
        }
    }
}

/// Runs an index build on a dedicated thread.
///
/// The finished [`BuildReport`] is delivered through the returned channel;
/// until then no index state is observable. Raise `cancel` to stop the scan
/// early and receive the partial index.
pub fn spawn_build<S>(source: S, builder: IndexBuilder) -> mpsc::Receiver<BuildReport<S::Loc>>
where
    S: RecordSource + Send + 'static,
    S::Loc: Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || {
        let report = builder.run(&source);
        if let BuildStatus::Aborted(err) = &report.status {
            error!(%err, "background index build aborted");
        }
        // A dropped receiver means the caller no longer wants the index.
        let _ = sender.send(report);
    });
    receiver
}

/// An ordered sequence of checkpoints over exactly one record source.
///
/// Frozen after the build; all query methods take `&self` and the index is
/// safe to share read-only across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointIndex<L: Location> {
    fingerprint: Fingerprint,
    interval: u64,
    total_records: u64,
    checkpoints: Vec<Checkpoint<L>>,
}

impl<L: Location> CheckpointIndex<L> {
    /// Assembles an index from already-validated parts.
    pub(crate) fn from_parts(
        fingerprint: Fingerprint,
        interval: u64,
        total_records: u64,
        checkpoints: Vec<Checkpoint<L>>,
    ) -> Self {
        Self {
            fingerprint,
            interval,
            total_records,
            checkpoints,
        }
    }

    /// Builds an index with one full forward scan of `source`.
    ///
    /// Convenience wrapper around [`IndexBuilder`] for foreground builds
    /// without cancellation.
    ///
    /// # Errors
    ///
    /// Returns the source read error if the scan aborts; the partial index
    /// is discarded. Use [`IndexBuilder::run`] to keep it.
    pub fn build<S>(source: &S, interval: u64) -> Result<Self>
    where
        S: RecordSource<Loc = L>,
    {
        let report = IndexBuilder::new(interval).run(source);
        match report.status {
            BuildStatus::Complete => Ok(report.index),
            BuildStatus::Aborted(err) => Err(err),
            // No cancel flag is attached on this path.
            BuildStatus::Cancelled => Ok(report.index),
        }
    }

    /// Returns the context of the greatest checkpoint with
    /// `timestamp <= target`, ties broken by smallest rank.
    ///
    /// Returns the start-of-source context if `target` precedes all
    /// checkpoints or the index is empty. Callers then scan forward from the
    /// returned context to the exact target.
    ///
    /// With duplicate timestamps in the source, the returned context points
    /// at the first checkpoint carrying the target timestamp; records with
    /// the same timestamp at lower ranks are only reachable by scanning
    /// from an earlier context (e.g. [`find_nearest_rank`](Self::find_nearest_rank)).
    pub fn find_nearest(&self, target: Timestamp) -> Context<L> {
        // First checkpoint with timestamp >= target.
        let idx = self
            .checkpoints
            .partition_point(|cp| cp.timestamp < target);

        if let Some(cp) = self.checkpoints.get(idx) {
            if cp.timestamp == target {
                return Context::from_checkpoint(cp);
            }
        }
        if idx == 0 {
            return Context::start();
        }
        Context::from_checkpoint(&self.checkpoints[idx - 1])
    }

    /// Returns the context of the greatest checkpoint with
    /// `rank <= target_rank`, or the start-of-source context.
    pub fn find_nearest_rank(&self, target_rank: Rank) -> Context<L> {
        let idx = self
            .checkpoints
            .partition_point(|cp| cp.rank <= target_rank);
        if idx == 0 {
            return Context::start();
        }
        Context::from_checkpoint(&self.checkpoints[idx - 1])
    }

    /// Returns a context near the given fraction of the source.
    ///
    /// `fraction` is clamped to `[0.0, 1.0]`; the result is within one
    /// checkpoint interval of `fraction * total_records`.
    pub fn seek_to_fraction(&self, fraction: f64) -> Context<L> {
        let clamped = fraction.clamp(0.0, 1.0);
        let target = (clamped * self.total_records as f64).round() as u64;
        self.find_nearest_rank(target)
    }

    /// Returns the fingerprint of the source this index was built from.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Returns the configured checkpoint interval in records.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Returns the number of records scanned by the build.
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Returns the stored checkpoints in increasing rank order.
    pub fn checkpoints(&self) -> &[Checkpoint<L>] {
        &self.checkpoints
    }

    /// Returns the number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Returns true if the index stores no checkpoints.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, OffsetLocation};

    fn build_uniform(count: usize, interval: u64) -> CheckpointIndex<OffsetLocation> {
        // Timestamps 0, 10, 20, ...
        let source = MemorySource::with_uniform_timestamps(0, 10, count);
        CheckpointIndex::build(&source, interval).unwrap()
    }

    #[test]
    fn test_build_samples_every_interval() {
        let index = build_uniform(10, 4);

        assert_eq!(index.len(), 3); // ranks 0, 4, 8
        assert_eq!(index.total_records(), 10);
        let ranks: Vec<_> = index.checkpoints().iter().map(|cp| cp.rank).collect();
        assert_eq!(ranks, vec![0, 4, 8]);
    }

    #[test]
    fn test_build_empty_and_single_record_sources() {
        let empty = build_uniform(0, 5);
        assert!(empty.is_empty());
        assert_eq!(empty.total_records(), 0);

        let single = build_uniform(1, 5);
        assert_eq!(single.len(), 1);
        assert_eq!(single.checkpoints()[0].rank, 0);
    }

    #[test]
    fn test_build_is_idempotent() {
        let source = MemorySource::with_uniform_timestamps(100, 7, 50);
        let first = CheckpointIndex::build(&source, 8).unwrap();
        let second = CheckpointIndex::build(&source, 8).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_nearest_returns_preceding_checkpoint() {
        let index = build_uniform(20, 5); // checkpoint timestamps 0, 50, 100, 150

        let ctx = index.find_nearest(120);
        assert_eq!(ctx.rank, 10);

        let exact = index.find_nearest(50);
        assert_eq!(exact.rank, 5);

        let past_end = index.find_nearest(10_000);
        assert_eq!(past_end.rank, 15);
    }

    #[test]
    fn test_find_nearest_before_all_checkpoints() {
        let source = MemorySource::with_uniform_timestamps(1000, 10, 20);
        let index = CheckpointIndex::build(&source, 5).unwrap();

        let ctx = index.find_nearest(500);
        assert!(ctx.is_start());
    }

    #[test]
    fn test_find_nearest_tie_breaks_to_smallest_rank() {
        // All records share one timestamp, so every checkpoint has ts 42.
        let source = MemorySource::with_uniform_timestamps(42, 0, 12);
        let index = CheckpointIndex::build(&source, 4).unwrap();

        let ctx = index.find_nearest(42);
        assert_eq!(ctx.rank, 0);
    }

    #[test]
    fn test_find_nearest_rank() {
        let index = build_uniform(20, 5); // checkpoint ranks 0, 5, 10, 15

        assert_eq!(index.find_nearest_rank(0).rank, 0);
        assert_eq!(index.find_nearest_rank(7).rank, 5);
        assert_eq!(index.find_nearest_rank(15).rank, 15);
        assert_eq!(index.find_nearest_rank(u64::MAX).rank, 15);
    }

    #[test]
    fn test_seek_to_fraction_ratio_law() {
        let count = 100u64;
        let interval = 10u64;
        let index = build_uniform(count as usize, interval);

        for fraction in [0.0, 0.5, 1.0] {
            let ctx = index.seek_to_fraction(fraction);
            let target = (fraction * count as f64).round() as u64;
            assert!(
                target.saturating_sub(ctx.rank) <= interval,
                "fraction {fraction}: rank {} too far below target {target}",
                ctx.rank
            );
            assert!(ctx.rank <= target, "context rank must not overshoot");
        }
    }

    #[test]
    fn test_empty_index_lookups_return_start() {
        let index = build_uniform(0, 5);
        assert!(index.find_nearest(100).is_start());
        assert!(index.find_nearest_rank(100).is_start());
        assert!(index.seek_to_fraction(0.5).is_start());
    }

    #[test]
    fn test_cancelled_build_returns_partial_index() {
        let source = MemorySource::with_uniform_timestamps(0, 1, 5000);
        let cancel = Arc::new(AtomicBool::new(true));
        let report = IndexBuilder::new(100)
            .with_cancel_flag(Arc::clone(&cancel))
            .run(&source);

        assert!(matches!(report.status, BuildStatus::Cancelled));
        // Flag was raised before the scan started, so nothing was read.
        assert!(report.index.is_empty());
    }

    #[test]
    fn test_background_build_delivers_report() {
        let source = MemorySource::with_uniform_timestamps(0, 10, 250);
        let receiver = spawn_build(source, IndexBuilder::new(50));

        let report = receiver.recv().unwrap();
        assert!(report.status.is_complete());
        assert_eq!(report.index.total_records(), 250);
        assert_eq!(report.index.len(), 5);
    }
}
