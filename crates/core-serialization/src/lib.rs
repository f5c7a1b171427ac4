//! Snapshot codec shared across the workspace.
//!
//! Layout: 8 magic bytes, a little-endian `u32` format version, then the
//! bincode-encoded [`SnapshotHeader`] followed by the bincode-encoded
//! `Vec<DocumentWire>`. The header is readable without decoding documents so
//! tools can report dimension and metric cheaply.

use std::io::Cursor;

use core_types::{DistanceMetric, Document, DocumentId, MetadataValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SNAPSHOT_MAGIC: [u8; 8] = *b"SUBSNAP\0";
pub const FORMAT_VERSION: u32 = 1;
const PREAMBLE_LEN: usize = SNAPSHOT_MAGIC.len() + 4;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("not a snapshot file (bad magic)")]
    BadMagic,
    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
    #[error("snapshot truncated")]
    Truncated,
    #[error("header declares {declared} documents but {found} were decoded")]
    CountMismatch { declared: u64, found: u64 },
    #[error("{0} trailing bytes after snapshot body")]
    TrailingBytes(usize),
    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Index facts discoverable at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub dimension: u32,
    pub metric: DistanceMetric,
    pub model_id: String,
    pub doc_count: u64,
}

/// On-disk shape of a document, decoupled from the in-memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentWire {
    pub id: String,
    pub text: String,
    pub metadata: Vec<(String, MetadataValue)>,
    pub embedding: Vec<f32>,
}

impl From<Document> for DocumentWire {
    fn from(value: Document) -> Self {
        Self {
            id: value.id.0,
            text: value.text,
            metadata: value.metadata.into_iter().collect(),
            embedding: value.embedding,
        }
    }
}

impl From<DocumentWire> for Document {
    fn from(value: DocumentWire) -> Self {
        Self {
            id: DocumentId(value.id),
            text: value.text,
            metadata: value.metadata.into_iter().collect(),
            embedding: value.embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(
        dimension: usize,
        metric: DistanceMetric,
        model_id: impl Into<String>,
        documents: Vec<Document>,
    ) -> Self {
        let header = SnapshotHeader {
            dimension: u32::try_from(dimension).unwrap_or(u32::MAX),
            metric,
            model_id: model_id.into(),
            doc_count: documents.len() as u64,
        };
        Self { header, documents }
    }
}

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, SnapshotError> {
    let mut out = Vec::with_capacity(PREAMBLE_LEN + 64);
    out.extend_from_slice(&SNAPSHOT_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());

    let mut header = snapshot.header.clone();
    header.doc_count = snapshot.documents.len() as u64;
    bincode::serialize_into(&mut out, &header)?;

    let wire: Vec<DocumentWire> = snapshot
        .documents
        .iter()
        .cloned()
        .map(DocumentWire::from)
        .collect();
    bincode::serialize_into(&mut out, &wire)?;
    Ok(out)
}

fn check_preamble(bytes: &[u8]) -> Result<(), SnapshotError> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(if bytes.starts_with(&SNAPSHOT_MAGIC[..bytes.len().min(8)]) {
            SnapshotError::Truncated
        } else {
            SnapshotError::BadMagic
        });
    }
    if bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[SNAPSHOT_MAGIC.len()..PREAMBLE_LEN]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    Ok(())
}

fn map_eof(err: bincode::Error) -> SnapshotError {
    let eof = matches!(
        &*err,
        bincode::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof
    );
    if eof {
        SnapshotError::Truncated
    } else {
        SnapshotError::Codec(err)
    }
}

/// Decode only the header.
pub fn decode_header(bytes: &[u8]) -> Result<SnapshotHeader, SnapshotError> {
    check_preamble(bytes)?;
    let mut cursor = Cursor::new(&bytes[PREAMBLE_LEN..]);
    bincode::deserialize_from(&mut cursor).map_err(map_eof)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
    check_preamble(bytes)?;
    let body = &bytes[PREAMBLE_LEN..];
    let mut cursor = Cursor::new(body);
    let header: SnapshotHeader = bincode::deserialize_from(&mut cursor).map_err(map_eof)?;
    let wire: Vec<DocumentWire> = bincode::deserialize_from(&mut cursor).map_err(map_eof)?;

    let consumed = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
    if consumed < body.len() {
        return Err(SnapshotError::TrailingBytes(body.len() - consumed));
    }
    if wire.len() as u64 != header.doc_count {
        return Err(SnapshotError::CountMismatch {
            declared: header.doc_count,
            found: wire.len() as u64,
        });
    }

    Ok(Snapshot {
        header,
        documents: wire.into_iter().map(Document::from).collect(),
    })
}
