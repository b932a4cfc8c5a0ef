//! Document ingestion: per-type text extraction and sliding-window chunking.

pub mod chunker;
pub mod parser;

pub use chunker::{DocumentChunk, TextChunker};
pub use parser::DocumentParser;
