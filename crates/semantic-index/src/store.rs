//! Snapshot files on disk.
//!
//! Writes go to a uniquely named temporary sibling that is renamed over the
//! target, so a reader sees either the old file or the new one, never a
//! partial write. Concurrent writers each get their own temporary file.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use core_serialization::{Snapshot, SnapshotHeader, decode_header, decode_snapshot, encode_snapshot};
use core_types::SearchError;
use core_types::config::{IndexBackend, IndexConfig};
use memmap2::Mmap;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{FlatIndex, IndexBuilder, VectorIndex};

/// Persist a snapshot atomically.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = encode_snapshot(snapshot).context("encode snapshot")?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("create index dir {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temporary file in {}", parent.display()))?;
    tmp.write_all(&bytes)
        .with_context(|| format!("write {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("rename into {}", path.display()))?;
    info!(
        path = %path.display(),
        documents = snapshot.documents.len(),
        bytes = bytes.len(),
        "snapshot written"
    );
    Ok(())
}

fn map_file(path: &Path) -> Result<Mmap, SearchError> {
    let file = File::open(path)
        .map_err(|e| SearchError::unavailable(format!("open {}: {e}", path.display())))?;
    // SAFETY: snapshots are replaced by rename, never modified in place, so the
    // mapped inode stays immutable for the lifetime of the map.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|e| SearchError::unavailable(format!("map {}: {e}", path.display())))?;
    Ok(mmap)
}

pub fn read_header(path: &Path) -> Result<SnapshotHeader, SearchError> {
    let mmap = map_file(path)?;
    decode_header(&mmap)
        .map_err(|e| SearchError::unavailable(format!("{}: {e}", path.display())))
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot, SearchError> {
    let mmap = map_file(path)?;
    decode_snapshot(&mmap)
        .map_err(|e| SearchError::unavailable(format!("{}: {e}", path.display())))
}

/// Load a snapshot into an exact index, re-validating every document.
pub fn load_flat(path: &Path) -> Result<FlatIndex, SearchError> {
    let snapshot = read_snapshot(path)?;
    let builder = IndexBuilder::from_snapshot(snapshot)?;
    let index = builder.build();
    info!(
        path = %path.display(),
        documents = index.len(),
        dimension = index.dimension(),
        metric = %index.metric(),
        "flat index loaded"
    );
    Ok(index)
}

/// Open the configured backend over the configured snapshot.
pub fn open_index(cfg: &IndexConfig) -> Result<Arc<dyn VectorIndex>, SearchError> {
    let path = Path::new(&cfg.path);
    let flat = load_flat(path)?;
    match cfg.backend {
        IndexBackend::Flat => Ok(Arc::new(flat)),
        IndexBackend::Hnsw => open_hnsw(flat, cfg.ef_search),
    }
}

#[cfg(feature = "hnsw")]
fn open_hnsw(flat: FlatIndex, ef_search: usize) -> Result<Arc<dyn VectorIndex>, SearchError> {
    let ann = crate::ann::HnswIndex::build(flat, ef_search)?;
    Ok(Arc::new(ann))
}

#[cfg(not(feature = "hnsw"))]
fn open_hnsw(flat: FlatIndex, _ef_search: usize) -> Result<Arc<dyn VectorIndex>, SearchError> {
    tracing::warn!("hnsw backend requested but the `hnsw` feature is disabled; using exact flat index");
    Ok(Arc::new(flat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{DistanceMetric, Document};
    use tempfile::tempdir;

    fn snapshot() -> Snapshot {
        let mut b = IndexBuilder::new(2, DistanceMetric::Cosine)
            .unwrap()
            .with_model_id("unit");
        b.add(Document::new("x", "line x", vec![1.0, 0.0])).unwrap();
        b.add(Document::new("y", "line y", vec![0.0, 1.0])).unwrap();
        b.into_snapshot()
    }

    #[test]
    fn write_then_load() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("idx").join("corpus.snap");
        write_snapshot(&path, &snapshot())?;

        let header = read_header(&path)?;
        assert_eq!(header.dimension, 2);
        assert_eq!(header.model_id, "unit");

        let index = load_flat(&path)?;
        let hits = index.search(&[0.0, 1.0], 1)?;
        assert_eq!(hits[0].document_id.as_str(), "y");
        assert_eq!(hits[0].text, "line y");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())?
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != "corpus.snap")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
        Ok(())
    }

    #[test]
    fn concurrent_writers_to_one_path_both_succeed() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shared.snap");
        std::thread::scope(|scope| {
            let writers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| write_snapshot(&path, &snapshot())))
                .collect();
            for writer in writers {
                writer.join().unwrap().unwrap();
            }
        });

        let index = load_flat(&path)?;
        assert_eq!(index.len(), 2);
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn missing_or_corrupt_files_are_unavailable() -> Result<()> {
        let dir = tempdir()?;
        let missing = dir.path().join("nope.snap");
        assert!(matches!(
            load_flat(&missing),
            Err(SearchError::IndexUnavailable(_))
        ));

        let corrupt = dir.path().join("corrupt.snap");
        fs::write(&corrupt, b"garbage that is not a snapshot")?;
        assert!(matches!(
            load_flat(&corrupt),
            Err(SearchError::IndexUnavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn open_index_uses_configured_path() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("corpus.snap");
        write_snapshot(&path, &snapshot())?;
        let cfg = IndexConfig {
            path: path.to_string_lossy().into_owned(),
            ..IndexConfig::default()
        };
        let index = open_index(&cfg)?;
        assert_eq!(index.len(), 2);
        assert_eq!(index.model_id().as_deref(), Some("unit"));
        Ok(())
    }
}
