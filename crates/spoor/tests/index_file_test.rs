//! Integration tests for persisted checkpoint index files.

use spoor::{CheckpointIndex, MemorySource, OffsetLocation, RecordSource, SpoorError};
use tempfile::TempDir;

/// Helper to generate a source with mildly irregular timestamps.
fn generate_source(count: usize) -> MemorySource {
    let entries = (0..count)
        .map(|i| {
            let ts = 1_000_000_000 + (i as i64) * 1_000_000 + ((i % 7) as i64) * 100;
            (ts, vec![i as u8])
        })
        .collect();
    MemorySource::new(entries)
}

#[test]
fn test_persist_load_roundtrip_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trace.spix");

    let source = generate_source(500);
    let index = CheckpointIndex::build(&source, 50).unwrap();

    index.persist_to_path(&path).unwrap();
    let loaded =
        CheckpointIndex::<OffsetLocation>::load_from_path(source.fingerprint(), &path).unwrap();

    assert_eq!(loaded, index);
    assert_eq!(loaded.total_records(), 500);
    assert_eq!(loaded.interval(), 50);
}

#[test]
fn test_load_or_rebuild_creates_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trace.spix");

    let source = generate_source(200);
    let index = CheckpointIndex::load_or_rebuild(&path, &source, 25).unwrap();

    assert_eq!(index.total_records(), 200);
    assert!(path.exists());

    // Second call must load the persisted file and agree with the build.
    let reloaded = CheckpointIndex::load_or_rebuild(&path, &source, 25).unwrap();
    assert_eq!(reloaded, index);
}

#[test]
fn test_load_or_rebuild_replaces_stale_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trace.spix");

    let old_source = generate_source(100);
    CheckpointIndex::load_or_rebuild(&path, &old_source, 10).unwrap();

    // The source changed; the persisted index is now stale.
    let new_source = generate_source(150);
    let rebuilt = CheckpointIndex::load_or_rebuild(&path, &new_source, 10).unwrap();

    assert_eq!(rebuilt.total_records(), 150);
    assert_eq!(rebuilt.fingerprint(), new_source.fingerprint());

    // The replacement file must load cleanly against the new source.
    let loaded =
        CheckpointIndex::<OffsetLocation>::load_from_path(new_source.fingerprint(), &path)
            .unwrap();
    assert_eq!(loaded, rebuilt);
}

#[test]
fn test_load_or_rebuild_replaces_truncated_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trace.spix");

    let source = generate_source(300);
    let index = CheckpointIndex::load_or_rebuild(&path, &source, 20).unwrap();

    // Chop the tail off the persisted file.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 40]).unwrap();

    let direct = CheckpointIndex::<OffsetLocation>::load_from_path(source.fingerprint(), &path);
    assert!(matches!(direct, Err(SpoorError::TruncatedIndex { .. })));

    let recovered = CheckpointIndex::load_or_rebuild(&path, &source, 20).unwrap();
    assert_eq!(recovered, index);
}

#[test]
fn test_load_or_rebuild_replaces_corrupt_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trace.spix");

    let source = generate_source(300);
    let index = CheckpointIndex::load_or_rebuild(&path, &source, 20).unwrap();

    // Flip a byte in the middle of the checkpoint body.
    let mut bytes = std::fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let recovered = CheckpointIndex::load_or_rebuild(&path, &source, 20).unwrap();
    assert_eq!(recovered, index);
}
