//! Retrieval-augmented draft answering.
//!
//! Retrieves top-k chunks from every index for a query, merges them into one
//! bounded supporting-context set, and runs a single stuffed extraction pass.
//! The draft is intermediate evidence only: it may conflate distinct entities
//! found across adjacent chunks, so the control loop verifies it against the
//! supporting chunks instead of trusting it outright.

use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::index::{IndexStore, RetrievedChunk, VectorIndex};
use crate::llm::GenerationClient;

/// Draft answer plus the chunks that support it.
#[derive(Debug, Clone)]
pub struct GroundedDraft {
    pub draft_answer: String,
    pub supporting_chunks: Vec<RetrievedChunk>,
}

pub const NO_CONTEXT_DRAFT: &str =
    "The requested information is not available in the provided documents.";

pub struct RagAnswerer {
    top_k: usize,
    /// Hard ceiling on merged supporting chunks across all indexes.
    max_supporting: usize,
}

impl RagAnswerer {
    pub fn new(top_k: usize, max_supporting: usize) -> Self {
        Self {
            top_k,
            max_supporting,
        }
    }

    /// Retrieve and draft. Zero supporting chunks is not an error; the draft
    /// states the information is unavailable.
    pub async fn answer(
        &self,
        query: &str,
        indexes: &[VectorIndex],
        embedder: &dyn EmbeddingClient,
        generator: &dyn GenerationClient,
    ) -> Result<GroundedDraft> {
        // Merge order: by source index, then by similarity rank within it.
        let mut supporting = Vec::new();
        for index in indexes {
            let hits = IndexStore::search(index, query, self.top_k, embedder).await?;
            supporting.extend(hits);
            if supporting.len() >= self.max_supporting {
                break;
            }
        }
        supporting.truncate(self.max_supporting);

        if supporting.is_empty() {
            tracing::debug!(query, "no supporting chunks retrieved");
            return Ok(GroundedDraft {
                draft_answer: NO_CONTEXT_DRAFT.to_string(),
                supporting_chunks: supporting,
            });
        }

        let prompt = extraction_prompt(query, &supporting);
        let draft_answer = generator.generate(&prompt).await?;

        tracing::debug!(
            query,
            chunks = supporting.len(),
            "grounded draft produced"
        );
        Ok(GroundedDraft {
            draft_answer,
            supporting_chunks: supporting,
        })
    }
}

/// Fixed extraction template: answer strictly from context, and say so when
/// the requested information is absent.
fn extraction_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Document {} | chunk {} of {}]\n{}",
                i + 1,
                chunk.ordinal,
                chunk.total,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the question using only the context below. Quote values \
         exactly as they appear and do not merge information from separate \
         fields or lines. If the answer is not in the context, reply exactly: \
         \"answer is not available in the context\".\n\n\
         === CONTEXT ===\n{}\n=== END CONTEXT ===\n\nQuestion: {}\n\nAnswer:",
        context, query
    )
}
