//! Arrow schema definitions for `LanceDB` tables.

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Name of the document records table.
pub const RECORDS_TABLE: &str = "records";

/// Name of the vectors table.
pub const VECTORS_TABLE: &str = "vectors";

/// Schema for the records table.
///
/// Timestamps are RFC 3339 strings so they round-trip at full precision.
#[must_use]
pub fn records_schema() -> Schema {
    Schema::new(vec![
        // Identity
        Field::new("id", DataType::Utf8, false),
        Field::new("original_name", DataType::Utf8, false),
        Field::new("format", DataType::Utf8, false),
        // Lifecycle
        Field::new("status", DataType::Utf8, false),
        Field::new("error_detail", DataType::Utf8, true),
        Field::new("attempts", DataType::UInt32, false),
        // Content
        Field::new("size_bytes", DataType::UInt64, false),
        Field::new("content_hash", DataType::Utf8, false),
        // Timestamps
        Field::new("created_at", DataType::Utf8, false),
        Field::new("updated_at", DataType::Utf8, false),
    ])
}

/// Schema for the vectors table.
#[must_use]
pub fn vectors_schema(embedding_dim: usize) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                embedding_dim as i32,
            ),
            false,
        ),
        Field::new("indexed_at", DataType::Utf8, false),
    ])
}
