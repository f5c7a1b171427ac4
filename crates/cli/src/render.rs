use std::fmt::Write as _;

use console::style;
use core_types::{Metadata, MetadataValue};
use ipc::SearchHit;
use serde_json::{Value, json};

const TEXT_WIDTH: usize = 72;

fn metadata_to_json(metadata: &Metadata) -> Value {
    let map = metadata
        .iter()
        .map(|(k, v)| {
            let value = match v {
                MetadataValue::Str(s) => Value::from(s.as_str()),
                MetadataValue::Int(i) => Value::from(*i),
                MetadataValue::Float(f) => Value::from(*f),
                MetadataValue::Bool(b) => Value::from(*b),
            };
            (k.clone(), value)
        })
        .collect();
    Value::Object(map)
}

/// Results as a JSON document, rank order preserved.
pub fn hits_to_json(query: &str, hits: &[SearchHit]) -> Value {
    let results: Vec<Value> = hits
        .iter()
        .enumerate()
        .map(|(rank, hit)| {
            json!({
                "rank": rank + 1,
                "id": hit.doc_id,
                "distance": hit.distance,
                "text": hit.text,
                "metadata": metadata_to_json(&hit.metadata),
            })
        })
        .collect();
    json!({ "query": query, "results": results })
}

/// Human-readable result table.
pub fn hits_table(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("{}\n", style("no results").yellow());
    }
    let mut out = String::new();
    for (rank, hit) in hits.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {} {}",
            rank + 1,
            style(format!("{:.4}", hit.distance)).cyan(),
            style(&hit.doc_id).bold(),
        );
        let _ = writeln!(out, "     {}", truncate(&hit.text, TEXT_WIDTH));
        if !hit.metadata.is_empty() {
            let meta: Vec<String> = hit
                .metadata
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            let _ = writeln!(out, "     {}", style(meta.join("  ")).dim());
        }
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    let line = text.replace('\n', " ");
    if line.chars().count() <= max_chars {
        return line;
    }
    let mut cut: String = line.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, distance: f32, text: &str) -> SearchHit {
        let mut metadata = Metadata::new();
        metadata.insert("movie".into(), MetadataValue::from("Aliens"));
        metadata.insert("minute".into(), MetadataValue::Int(88));
        SearchHit {
            doc_id: id.into(),
            distance,
            text: text.into(),
            metadata,
        }
    }

    #[test]
    fn json_keeps_rank_order_and_scalar_types() {
        let hits = vec![
            hit("aliens-0088", 0.25, "Game over, man!"),
            hit("aliens-0102", 0.5, "They mostly come at night."),
        ];
        let doc = hits_to_json("game over", &hits);
        assert_eq!(doc["query"], "game over");
        assert_eq!(doc["results"][0]["rank"], 1);
        assert_eq!(doc["results"][0]["id"], "aliens-0088");
        assert_eq!(doc["results"][1]["id"], "aliens-0102");
        assert_eq!(doc["results"][0]["metadata"]["minute"], 88);
        assert_eq!(doc["results"][0]["metadata"]["movie"], "Aliens");
    }

    #[test]
    fn table_lists_every_hit() {
        console::set_colors_enabled(false);
        let table = hits_table(&[hit("aliens-0088", 0.25, "Game over, man!\nGame over!")]);
        assert!(table.contains("  1. 0.2500 aliens-0088"));
        assert!(table.contains("Game over, man! Game over!"));
        assert!(table.contains("minute=88  movie=Aliens"));
        assert!(hits_table(&[]).contains("no results"));
    }

    #[test]
    fn long_text_is_truncated_on_char_boundary() {
        let long = "é".repeat(100);
        let cut = truncate(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with('…'));
    }
}
