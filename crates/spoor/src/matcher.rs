//! Event matching: pairing causally related records across independently
//! captured streams.
//!
//! The matcher holds one unmatched buffer per stream and direction, keyed by
//! a protocol-specific [`MatchKey`]. Each processed record either pops the
//! oldest compatible opposite-direction record (producing a [`Dependency`])
//! or is queued awaiting a partner. "Oldest" is global arrival order at the
//! matcher, not stream order, so pairing under repeated keys such as
//! retransmissions is strictly FIFO no matter how records are spread across
//! streams.
//!
//! Callers must feed each stream's records in non-decreasing timestamp
//! order; interleaving across streams may be arbitrary. The matcher is a
//! single-writer streaming component with no internal locking — parallel
//! ingestion must be serialized by the caller.

use crate::source::{Rank, Record, Timestamp};
use std::collections::{HashMap, VecDeque};

/// Protocol-specific correlation value (e.g. a sequence number).
pub type MatchKey = u64;

/// Causal direction of a classified record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDirection {
    /// The record initiates an exchange (e.g. a request or transmit event).
    Outbound,
    /// The record completes an exchange (e.g. a response or receive event).
    Inbound,
}

impl MatchDirection {
    /// Returns the direction a partner record must have.
    pub fn opposite(self) -> Self {
        match self {
            MatchDirection::Outbound => MatchDirection::Inbound,
            MatchDirection::Inbound => MatchDirection::Outbound,
        }
    }
}

/// Protocol-specific record classification.
///
/// Implementations extract a direction and correlation key from a record;
/// records that return `None` pass through the matcher untouched.
pub trait Classifier {
    /// Classifies a record, or `None` if it does not participate in
    /// matching.
    fn classify(&self, record: &Record) -> Option<(MatchDirection, MatchKey)>;
}

impl<F> Classifier for F
where
    F: Fn(&Record) -> Option<(MatchDirection, MatchKey)>,
{
    fn classify(&self, record: &Record) -> Option<(MatchDirection, MatchKey)> {
        self(record)
    }
}

/// A lightweight reference to a processed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef {
    /// Index of the stream the record arrived on.
    pub stream: usize,
    /// Rank of the record within its stream.
    pub rank: Rank,
    /// Timestamp of the record.
    pub timestamp: Timestamp,
}

/// A resolved causal pairing of two records.
///
/// The outbound record is always the source; the inbound record is the
/// destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    /// The record that initiated the exchange.
    pub source: RecordRef,
    /// The record that completed the exchange.
    pub destination: RecordRef,
}

/// Matching statistics for diagnostics.
///
/// Residual unmatched records are expected at trace boundaries and are not
/// an error condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchStats {
    /// Total dependencies found so far.
    pub dependencies: u64,
    /// Unmatched records still buffered, per stream.
    pub unmatched_per_stream: Vec<u64>,
}

impl MatchStats {
    /// Total unmatched records across all streams.
    pub fn unmatched_total(&self) -> u64 {
        self.unmatched_per_stream.iter().sum()
    }
}

/// A buffered record stamped with its arrival number at the matcher.
///
/// Arrival numbers are totally ordered across streams; queue fronts are
/// always the oldest entry per key.
#[derive(Debug, Clone, Copy)]
struct Buffered {
    arrival: u64,
    record: RecordRef,
}

/// Per-direction unmatched buffers for one stream.
#[derive(Debug, Default)]
struct StreamBuffers {
    outbound: HashMap<MatchKey, VecDeque<Buffered>>,
    inbound: HashMap<MatchKey, VecDeque<Buffered>>,
}

impl StreamBuffers {
    fn buffer(&self, direction: MatchDirection) -> &HashMap<MatchKey, VecDeque<Buffered>> {
        match direction {
            MatchDirection::Outbound => &self.outbound,
            MatchDirection::Inbound => &self.inbound,
        }
    }

    fn buffer_mut(&mut self, direction: MatchDirection) -> &mut HashMap<MatchKey, VecDeque<Buffered>> {
        match direction {
            MatchDirection::Outbound => &mut self.outbound,
            MatchDirection::Inbound => &mut self.inbound,
        }
    }

    fn unmatched_count(&self) -> u64 {
        let outbound: usize = self.outbound.values().map(VecDeque::len).sum();
        let inbound: usize = self.inbound.values().map(VecDeque::len).sum();
        (outbound + inbound) as u64
    }
}

/// Pairs causally related records across N labeled streams in one streaming
/// pass, O(1) amortized per record.
#[derive(Debug)]
pub struct EventMatcher<C: Classifier> {
    classifier: C,
    streams: Vec<StreamBuffers>,
    dependencies_found: u64,
    next_arrival: u64,
}

impl<C: Classifier> EventMatcher<C> {
    /// Creates a matcher over `stream_count` labeled streams.
    ///
    /// # Panics
    ///
    /// Panics if `stream_count` is zero.
    pub fn new(classifier: C, stream_count: usize) -> Self {
        assert!(stream_count >= 1, "matcher needs at least one stream");
        let streams = (0..stream_count).map(|_| StreamBuffers::default()).collect();
        Self {
            classifier,
            streams,
            dependencies_found: 0,
            next_arrival: 0,
        }
    }

    /// Returns the number of configured streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Processes one record from the given stream.
    ///
    /// Unclassified records return `None` without touching any buffer. A
    /// classified record searches the opposite direction's queues under the
    /// same key across all streams (matches may come from any stream,
    /// including the record's own); the partner that arrived at the matcher
    /// earliest wins, regardless of which stream buffered it. Without a
    /// partner the record is queued under its own direction and key.
    ///
    /// # Panics
    ///
    /// Panics if `stream_index` is out of range.
    pub fn process(&mut self, record: &Record, stream_index: usize) -> Option<Dependency> {
        assert!(
            stream_index < self.streams.len(),
            "stream index {stream_index} out of range"
        );

        let (direction, key) = self.classifier.classify(record)?;
        let current = RecordRef {
            stream: stream_index,
            rank: record.rank,
            timestamp: record.timestamp,
        };

        // Oldest compatible partner across all streams, by arrival number.
        let opposite = direction.opposite();
        let mut oldest: Option<(usize, u64)> = None;
        for (stream, buffers) in self.streams.iter().enumerate() {
            if let Some(front) = buffers.buffer(opposite).get(&key).and_then(VecDeque::front) {
                if oldest.is_none_or(|(_, arrival)| front.arrival < arrival) {
                    oldest = Some((stream, front.arrival));
                }
            }
        }

        if let Some((stream, _)) = oldest {
            let queues = self.streams[stream].buffer_mut(opposite);
            // The queue and its front were just observed above.
            let Some(queue) = queues.get_mut(&key) else {
                return None;
            };
            let Some(buffered) = queue.pop_front() else {
                return None;
            };
            if queue.is_empty() {
                queues.remove(&key);
            }
            self.dependencies_found += 1;
            let partner = buffered.record;
            return Some(match direction {
                MatchDirection::Inbound => Dependency {
                    source: partner,
                    destination: current,
                },
                MatchDirection::Outbound => Dependency {
                    source: current,
                    destination: partner,
                },
            });
        }

        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.streams[stream_index]
            .buffer_mut(direction)
            .entry(key)
            .or_default()
            .push_back(Buffered {
                arrival,
                record: current,
            });
        None
    }

    /// Returns matching statistics.
    pub fn stats(&self) -> MatchStats {
        MatchStats {
            dependencies: self.dependencies_found,
            unmatched_per_stream: self
                .streams
                .iter()
                .map(StreamBuffers::unmatched_count)
                .collect(),
        }
    }

    /// Discards all buffered records and counters for an explicit re-run.
    pub fn clear(&mut self) {
        for buffers in &mut self.streams {
            buffers.outbound.clear();
            buffers.inbound.clear();
        }
        self.dependencies_found = 0;
        self.next_arrival = 0;
    }
}
