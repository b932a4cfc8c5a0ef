//! Samvad: a document-grounded conversational agent with durable sessions.
//!
//! The crate wires five pieces behind [`engine::AgentEngine`]:
//! - `processing` turns heterogeneous sources (pdf, csv, txt, xls, json,
//!   URLs) into overlapping text chunks;
//! - `embeddings` and `index` persist each upload batch as an immutable
//!   similarity-searchable vector index;
//! - `rag` retrieves supporting chunks and drafts a grounded answer;
//! - `agent` runs the tool-calling control loop over the generation service;
//! - `session` records every completed interaction in SQLite.

pub mod agent;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod index;
pub mod llm;
pub mod processing;
pub mod rag;
pub mod session;

pub use config::AgentConfig;
pub use engine::{AgentEngine, IngestReport, InteractionResult};
pub use error::{Error, Result};
