//! Record source abstraction: records, locations, fingerprints, and cursors.
//!
//! Spoor never parses a concrete trace format. Format-specific decoders
//! implement [`RecordSource`] and [`RecordCursor`], yielding an ordered,
//! restartable sequence of [`Record`]s. Everything else in the crate is
//! written against these traits.
//!
//! # Positions
//!
//! A [`Location`] is an opaque, comparable token identifying a reader
//! position within one source (typically a byte offset). A [`Context`] is
//! the live cursor state (`location` + `rank`) that readers derive from an
//! index lookup and advance as they scan. Each reader owns its own Context;
//! Contexts are cheap to clone and must not be shared across threads.

use crate::error::Result;
use std::fmt;
use std::io::{Read, Write};

/// Timestamp in nanoseconds since the Unix epoch.
pub type Timestamp = i64;

/// 0-based position of a record within its source, strictly increasing.
pub type Rank = u64;

/// Size of an encoded [`Fingerprint`] in bytes.
pub const FINGERPRINT_SIZE: usize = 16;

/// An immutable record read from a source.
///
/// The payload is opaque to the core; protocol-specific classifiers and
/// packet extractors interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Timestamp of the record, monotonic non-decreasing per source.
    pub timestamp: Timestamp,
    /// Position of the record within its source.
    pub rank: Rank,
    /// Opaque record payload.
    pub payload: Vec<u8>,
}

impl Record {
    /// Creates a new record.
    pub fn new(timestamp: Timestamp, rank: Rank, payload: Vec<u8>) -> Self {
        Self {
            timestamp,
            rank,
            payload,
        }
    }
}

/// An opaque, comparable reader position within one record source.
///
/// Ordering must be consistent with rank order: for two locations
/// `L1 < L2` from the same source, seeking to `L1` and reading forward
/// always reaches `L2` before producing any record beyond `L2`'s record.
///
/// The byte encoding is fixed-width (`ENCODED_SIZE` bytes) so checkpoint
/// files stay fixed-record-size and truncation is detectable.
pub trait Location: Clone + Ord + fmt::Debug {
    /// Encoded size in bytes, fixed per implementation.
    const ENCODED_SIZE: usize;

    /// Writes the location using little-endian byte order.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()>;

    /// Reads a location using little-endian byte order.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    fn read_from<R: Read>(reader: &mut R) -> Result<Self>;
}

/// A location expressed as a single offset (byte offset or record index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OffsetLocation(pub u64);

impl Location for OffsetLocation {
    const ENCODED_SIZE: usize = 8;

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.0.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(Self(u64::from_le_bytes(buf)))
    }
}

/// A stable identifier of a record source's content.
///
/// Stable across runs if and only if the underlying data is unchanged; a
/// persisted checkpoint index stores the fingerprint of the source it was
/// built from so staleness is detected on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Creates a fingerprint from raw bytes.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Computes a content fingerprint over raw source bytes.
    ///
    /// Uses xxhash64 twice with different seeds to fill all 16 bytes.
    pub fn of_content(data: &[u8]) -> Self {
        let lo = xxhash_rust::xxh64::xxh64(data, 0);
        let hi = xxhash_rust::xxh64::xxh64(data, 1);
        let mut bytes = [0u8; FINGERPRINT_SIZE];
        bytes[..8].copy_from_slice(&lo.to_le_bytes());
        bytes[8..].copy_from_slice(&hi.to_le_bytes());
        Self(bytes)
    }

    /// Builds a cheap fingerprint from file size and modification time.
    ///
    /// Weaker than a content hash but does not require reading the source.
    pub fn from_len_and_mtime(len: u64, mtime_nanos: i64) -> Self {
        let mut bytes = [0u8; FINGERPRINT_SIZE];
        bytes[..8].copy_from_slice(&len.to_le_bytes());
        bytes[8..].copy_from_slice(&mtime_nanos.to_le_bytes());
        Self(bytes)
    }

    /// Returns the raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Live iteration state: an optional location plus the current rank.
///
/// `location = None` means start of source. Mutated only by the reader that
/// owns it; derive a fresh Context per reader from an index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context<L: Location> {
    /// Resume position, or `None` for start of source.
    pub location: Option<L>,
    /// Rank of the next record a cursor seeked to this context will yield.
    pub rank: Rank,
}

impl<L: Location> Context<L> {
    /// Returns the start-of-source context.
    pub fn start() -> Self {
        Self {
            location: None,
            rank: 0,
        }
    }

    /// Returns true if this context points at the start of the source.
    pub fn is_start(&self) -> bool {
        self.location.is_none()
    }
}

/// An ordered, restartable sequence of records.
///
/// Implemented by format-specific decoders. A source hands out independent
/// cursors; the core performs exactly one full forward scan per index build
/// and arbitrarily many checkpoint-seeded forward scans afterwards.
pub trait RecordSource {
    /// Location type used by this source.
    type Loc: Location;
    /// Cursor type produced by [`seek`](Self::seek).
    type Cursor: RecordCursor<Loc = Self::Loc>;

    /// Opens a cursor at the given location, or at the start for `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source cannot be opened.
    fn seek(&self, location: Option<&Self::Loc>) -> Result<Self::Cursor>;

    /// Opens a cursor at the position described by `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source cannot be opened.
    fn seek_context(&self, context: &Context<Self::Loc>) -> Result<Self::Cursor> {
        self.seek(context.location.as_ref())
    }

    /// Returns the fingerprint of the source's current content.
    fn fingerprint(&self) -> Fingerprint;

    /// Returns an estimate of the total record count, if known.
    fn len_estimate(&self) -> Option<u64>;
}

/// A forward-only reader over one record source.
pub trait RecordCursor {
    /// Location type used by the parent source.
    type Loc: Location;

    /// Reads the next record, or `None` at end of source.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails. After an error the
    /// cursor state is unspecified; callers should reseek.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Returns the location of the next record this cursor would yield.
    fn location(&self) -> Self::Loc;
}

/// In-memory record source.
///
/// Reference implementation of [`RecordSource`] used by tests, benches, and
/// tools; locations are record indices.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    /// Creates a source over `(timestamp, payload)` pairs, assigning ranks
    /// in order.
    pub fn new(entries: Vec<(Timestamp, Vec<u8>)>) -> Self {
        let records = entries
            .into_iter()
            .enumerate()
            .map(|(i, (ts, payload))| Record::new(ts, i as Rank, payload))
            .collect();
        Self { records }
    }

    /// Creates a source of `count` empty-payload records spaced
    /// `step_nanos` apart starting at `start`.
    pub fn with_uniform_timestamps(start: Timestamp, step_nanos: i64, count: usize) -> Self {
        let entries = (0..count)
            .map(|i| (start + step_nanos * i as i64, Vec::new()))
            .collect();
        Self::new(entries)
    }

    /// Returns the number of records in the source.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the source holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MemorySource {
    type Loc = OffsetLocation;
    type Cursor = MemoryCursor;

    fn seek(&self, location: Option<&OffsetLocation>) -> Result<MemoryCursor> {
        let position = location.map_or(0, |loc| loc.0 as usize);
        Ok(MemoryCursor {
            records: self.records.clone(),
            position,
        })
    }

    fn fingerprint(&self) -> Fingerprint {
        let mut data = Vec::with_capacity(self.records.len() * 16);
        for record in &self.records {
            data.extend_from_slice(&record.timestamp.to_le_bytes());
            data.extend_from_slice(&(record.payload.len() as u64).to_le_bytes());
            data.extend_from_slice(&record.payload);
        }
        Fingerprint::of_content(&data)
    }

    fn len_estimate(&self) -> Option<u64> {
        Some(self.records.len() as u64)
    }
}

/// Cursor over a [`MemorySource`].
#[derive(Debug)]
pub struct MemoryCursor {
    records: Vec<Record>,
    position: usize,
}

impl RecordCursor for MemoryCursor {
    type Loc = OffsetLocation;

    fn next_record(&mut self) -> Result<Option<Record>> {
        match self.records.get(self.position) {
            Some(record) => {
                self.position += 1;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    fn location(&self) -> OffsetLocation {
        OffsetLocation(self.position as u64)
    }
}
