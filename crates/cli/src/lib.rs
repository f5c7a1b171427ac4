//! Shared pieces of the `subsearch` CLI: corpus import and result rendering.

pub mod import;
pub mod render;

pub use import::import_jsonl;
pub use render::{hits_table, hits_to_json};
