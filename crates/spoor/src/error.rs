//! Error and Result types for Spoor operations.

use crate::source::Fingerprint;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for Spoor operations.
pub type Result<T> = std::result::Result<T, SpoorError>;

/// The error type for Spoor operations.
#[derive(Debug, Error)]
pub enum SpoorError {
    /// Invalid magic bytes in a persisted index header or footer.
    #[error("Invalid magic bytes: expected SPIX/XIPS, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported persisted index format version.
    #[error("Unsupported index version: {0}")]
    UnsupportedVersion(u16),

    /// Persisted index checksum does not match the computed value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// CRC32 stored in the file.
        expected: u32,
        /// CRC32 computed over the file contents.
        actual: u32,
    },

    /// Persisted index was built from a source with a different fingerprint.
    ///
    /// Callers are expected to discard the persisted index and rebuild.
    #[error("Stale index: stored fingerprint {actual} does not match source {expected}")]
    StaleIndex {
        /// Fingerprint of the live source.
        expected: Fingerprint,
        /// Fingerprint stored in the persisted index.
        actual: Fingerprint,
    },

    /// Persisted index is shorter than its declared checkpoint count.
    #[error("Truncated index: declared {declared} checkpoints, read {available}")]
    TruncatedIndex {
        /// Checkpoint count declared in the header.
        declared: u64,
        /// Checkpoints actually available before the file ended.
        available: u64,
    },

    /// Packet carried an empty endpoint identifier.
    #[error("Invalid packet: empty endpoint")]
    EmptyEndpoint,

    /// Packet source and destination endpoints are identical.
    #[error("Invalid packet: identical endpoints")]
    IdenticalEndpoints,

    /// Accumulating a packet's byte length would overflow the flow counter.
    #[error("Byte count overflow on flow {flow_id}")]
    ByteCountOverflow {
        /// Identifier of the flow whose counter would overflow.
        flow_id: u32,
    },

    /// Underlying I/O error, including read failures from a record source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
