//! Conversion of pre-embedded JSONL corpora into index snapshots.
//!
//! Each non-blank line is one record:
//! `{"id": "...", "text": "...", "metadata": {...}, "embedding": [..]}`.
//! `metadata` is optional and may only hold scalars; `null` entries are
//! dropped. No embedding is computed here.

use std::io::BufRead;

use anyhow::{Context, Result, bail};
use core_serialization::Snapshot;
use core_types::{DistanceMetric, Document, Metadata, MetadataValue};
use indicatif::ProgressBar;
use semantic_index::IndexBuilder;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct ImportRecord {
    id: String,
    text: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

/// Convert a JSON object of scalars into document metadata.
fn metadata_from_json(map: Map<String, Value>) -> Result<Metadata> {
    let mut out = Metadata::new();
    for (key, value) in map {
        let value = match value {
            Value::Null => continue,
            Value::Bool(b) => MetadataValue::Bool(b),
            Value::String(s) => MetadataValue::Str(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => MetadataValue::Int(i),
                None => MetadataValue::Float(
                    n.as_f64()
                        .with_context(|| format!("metadata `{key}` is not representable"))?,
                ),
            },
            Value::Array(_) | Value::Object(_) => {
                bail!("metadata `{key}` must be a string, number or bool")
            }
        };
        out.insert(key, value);
    }
    Ok(out)
}

/// Read JSONL records into a snapshot. The dimension is taken from the first
/// record; every later record must match it. `progress` advances by bytes read.
pub fn import_jsonl<R: BufRead>(
    reader: R,
    metric: DistanceMetric,
    model_id: &str,
    progress: &ProgressBar,
) -> Result<Snapshot> {
    let mut builder: Option<IndexBuilder> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("read line {line_no}"))?;
        progress.inc(line.len() as u64 + 1);
        if line.trim().is_empty() {
            continue;
        }

        let record: ImportRecord =
            serde_json::from_str(&line).with_context(|| format!("parse line {line_no}"))?;
        let metadata = metadata_from_json(record.metadata)
            .with_context(|| format!("record `{}` (line {line_no})", record.id))?;
        let mut doc = Document::new(record.id, record.text, record.embedding);
        doc.metadata = metadata;

        if builder.is_none() {
            builder = Some(
                IndexBuilder::new(doc.dimension(), metric)
                    .with_context(|| format!("line {line_no}"))?
                    .with_model_id(model_id),
            );
        }
        if let Some(b) = builder.as_mut() {
            b.add(doc).with_context(|| format!("line {line_no}"))?;
        }
    }

    let Some(builder) = builder else {
        bail!("input contains no records");
    };
    Ok(builder.into_snapshot())
}
