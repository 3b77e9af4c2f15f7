//! Search query processing for docsift.
//!
//! [`SearchProcessor`] embeds the query text, asks the vector index for the
//! nearest documents and joins them with their metadata records. Only
//! `COMPLETE` documents are returned.

pub mod processor;

pub use processor::{SearchConfig, SearchProcessor};
