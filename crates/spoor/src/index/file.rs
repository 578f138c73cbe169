//! Persisted checkpoint index format.
//!
//! Little-endian throughout, fixed-width checkpoint records so truncation is
//! detectable from the declared count alone.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Header (48 bytes)                                           │
//! │  - Magic: "SPIX" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! │  - Reserved: 2 bytes                                         │
//! │  - Source fingerprint (16 bytes)                             │
//! │  - Checkpoint interval: u64 (8 bytes)                        │
//! │  - Total records: u64 (8 bytes)                              │
//! │  - Checkpoint count: u64 (8 bytes)                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Checkpoints (count × (8 + N + 8) bytes)                     │
//! │  - Timestamp: i64, Location: N bytes, Rank: u64              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Footer (8 bytes)                                            │
//! │  - CRC32 of header + checkpoints (4 bytes)                   │
//! │  - Reverse magic: "XIPS" (4 bytes)                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `load` rejects rather than trusts: wrong magic or version, a fingerprint
//! that no longer matches the live source, a body shorter than the declared
//! checkpoint count, or a CRC mismatch all fail explicitly so the caller
//! falls back to a rebuild.

use super::{Checkpoint, CheckpointIndex};
use crate::error::{Result, SpoorError};
use crate::source::{Fingerprint, Location, RecordSource, FINGERPRINT_SIZE};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Magic bytes for a persisted index header: "SPIX".
pub const INDEX_MAGIC: [u8; 4] = *b"SPIX";

/// Reverse magic bytes for a persisted index footer: "XIPS".
pub const INDEX_MAGIC_REVERSE: [u8; 4] = *b"XIPS";

/// Current persisted index format version.
pub const INDEX_VERSION: u16 = 1;

/// Header size in bytes.
pub const INDEX_HEADER_SIZE: usize = 4 + 2 + 2 + FINGERPRINT_SIZE + 8 + 8 + 8;

/// Footer size in bytes.
const INDEX_FOOTER_SIZE: usize = 8;

/// Reads a full checkpoint record, mapping a short read to
/// `TruncatedIndex`.
fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    declared: u64,
    available: u64,
) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            SpoorError::TruncatedIndex {
                declared,
                available,
            }
        } else {
            SpoorError::Io(err)
        }
    })
}

impl<L: Location> CheckpointIndex<L> {
    /// Serialized size of one checkpoint record in bytes.
    const CHECKPOINT_RECORD_SIZE: usize = 8 + L::ENCODED_SIZE + 8;

    /// Writes the index in the persisted format described in the module
    /// docs.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `sink` fails.
    pub fn persist<W: Write>(&self, sink: &mut W) -> Result<()> {
        let count = self.checkpoints.len();
        let mut body =
            Vec::with_capacity(INDEX_HEADER_SIZE + count * Self::CHECKPOINT_RECORD_SIZE);

        // Header
        body.extend_from_slice(&INDEX_MAGIC);
        body.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        body.extend_from_slice(&[0u8; 2]);
        body.extend_from_slice(self.fingerprint.as_bytes());
        body.extend_from_slice(&self.interval.to_le_bytes());
        body.extend_from_slice(&self.total_records.to_le_bytes());
        body.extend_from_slice(&(count as u64).to_le_bytes());

        // Checkpoints
        for checkpoint in &self.checkpoints {
            body.extend_from_slice(&checkpoint.timestamp.to_le_bytes());
            checkpoint.location.write_to(&mut body)?;
            body.extend_from_slice(&checkpoint.rank.to_le_bytes());
        }

        let crc = crc32fast::hash(&body);

        sink.write_all(&body)?;
        sink.write_all(&crc.to_le_bytes())?;
        sink.write_all(&INDEX_MAGIC_REVERSE)?;

        Ok(())
    }

    /// Reads an index, validating it against the live source's fingerprint.
    ///
    /// # Errors
    ///
    /// - [`SpoorError::InvalidMagic`] / [`SpoorError::UnsupportedVersion`]
    ///   for an unrecognized file.
    /// - [`SpoorError::StaleIndex`] if the stored fingerprint does not match
    ///   `expected`.
    /// - [`SpoorError::TruncatedIndex`] if the body is shorter than the
    ///   declared checkpoint count.
    /// - [`SpoorError::ChecksumMismatch`] if the CRC does not verify.
    pub fn load<R: Read>(expected: Fingerprint, src: &mut R) -> Result<Self> {
        let mut header = [0u8; INDEX_HEADER_SIZE];
        src.read_exact(&mut header)?;

        // Magic (4 bytes)
        let magic: [u8; 4] = header[0..4].try_into().unwrap();
        if magic != INDEX_MAGIC {
            return Err(SpoorError::InvalidMagic(magic));
        }

        // Version (2 bytes), reserved (2 bytes) ignored
        let version = u16::from_le_bytes(header[4..6].try_into().unwrap());
        if version > INDEX_VERSION {
            return Err(SpoorError::UnsupportedVersion(version));
        }

        // Fingerprint (16 bytes)
        let stored =
            Fingerprint::from_bytes(header[8..8 + FINGERPRINT_SIZE].try_into().unwrap());
        if stored != expected {
            return Err(SpoorError::StaleIndex {
                expected,
                actual: stored,
            });
        }

        let mut offset = 8 + FINGERPRINT_SIZE;
        let interval = u64::from_le_bytes(header[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let total_records = u64::from_le_bytes(header[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let count = u64::from_le_bytes(header[offset..offset + 8].try_into().unwrap());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);

        // Checkpoints (fixed-width records)
        let mut checkpoints = Vec::with_capacity(count.min(1 << 20) as usize);
        let mut record_buf = vec![0u8; Self::CHECKPOINT_RECORD_SIZE];
        for available in 0..count {
            read_exact_or_truncated(src, &mut record_buf, count, available)?;
            hasher.update(&record_buf);

            let timestamp = i64::from_le_bytes(record_buf[0..8].try_into().unwrap());
            let mut location_bytes = &record_buf[8..8 + L::ENCODED_SIZE];
            let location = L::read_from(&mut location_bytes)?;
            let rank =
                u64::from_le_bytes(record_buf[8 + L::ENCODED_SIZE..].try_into().unwrap());

            checkpoints.push(Checkpoint {
                timestamp,
                location,
                rank,
            });
        }

        // Footer
        let mut footer = [0u8; INDEX_FOOTER_SIZE];
        read_exact_or_truncated(src, &mut footer, count, count)?;

        let stored_crc = u32::from_le_bytes(footer[0..4].try_into().unwrap());
        let actual_crc = hasher.finalize();
        if stored_crc != actual_crc {
            return Err(SpoorError::ChecksumMismatch {
                expected: stored_crc,
                actual: actual_crc,
            });
        }

        let magic_reverse: [u8; 4] = footer[4..8].try_into().unwrap();
        if magic_reverse != INDEX_MAGIC_REVERSE {
            return Err(SpoorError::InvalidMagic(magic_reverse));
        }

        Ok(Self::from_parts(
            expected,
            interval,
            total_records,
            checkpoints,
        ))
    }

    /// Persists the index to a file, syncing it to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn persist_to_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.persist(&mut writer)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        file.sync_all()?;
        Ok(())
    }

    /// Loads a persisted index from a file.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`load`](Self::load), plus file open errors.
    pub fn load_from_path(expected: Fingerprint, path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::load(expected, &mut reader)
    }

    /// Loads the index persisted at `path`, rebuilding it from `source` if
    /// the file is missing, stale, truncated, or corrupt.
    ///
    /// A rejected persisted index is logged and replaced; it is never
    /// trusted silently. After a rebuild the fresh index is persisted back
    /// to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild scan or the re-persist fails.
    pub fn load_or_rebuild<S>(path: &Path, source: &S, interval: u64) -> Result<Self>
    where
        S: RecordSource<Loc = L>,
    {
        let expected = source.fingerprint();
        if path.exists() {
            match Self::load_from_path(expected, path) {
                Ok(index) => {
                    debug!(path = %path.display(), checkpoints = index.len(), "loaded persisted index");
                    return Ok(index);
                }
                Err(err) => {
                    warn!(%err, path = %path.display(), "persisted index rejected, rebuilding");
                }
            }
        }

        let index = Self::build(source, interval)?;
        index.persist_to_path(path)?;
        Ok(index)
    }
}
