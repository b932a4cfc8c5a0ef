//! Composition root: wires ingestion, retrieval, the control loop, and
//! session persistence behind two operations — `ingest` and `interact`.
//!
//! Service clients are constructed by the caller and injected here; the
//! engine owns their lifecycle for the duration of the process. Durable
//! session history is persisted on every interaction but never replayed
//! into the model context by this layer; reloading it is a surface concern.

use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::agent::{run_tool_loop, tools::ToolRegistry, LoopOutcome};
use crate::config::AgentConfig;
use crate::embeddings::EmbeddingClient;
use crate::error::{Error, Result};
use crate::index::{IndexStore, RetrievedChunk, VectorIndex};
use crate::llm::{ChatMessage, GenerationClient};
use crate::processing::{DocumentParser, TextChunker};
use crate::rag::{GroundedDraft, RagAnswerer};
use crate::session::SessionStore;

const SYNTHESIS_PROMPT: &str = "You are a helpful assistant. When the user \
message includes retrieved document context and a draft answer, treat the \
draft as a hypothesis: verify every value and name against the retrieved \
context before using it, and never merge values from unrelated fields. Use \
the add and subtract tools for integer arithmetic instead of computing \
yourself. Answer concisely.";

/// Outcome of one ingestion batch.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub index_id: String,
    pub chunk_count: usize,
}

/// Outcome of one interaction, ready for the chat surface.
#[derive(Debug, Clone)]
pub struct InteractionResult {
    pub final_text: String,
    pub tool_output: Option<String>,
    pub supporting_chunks: Vec<RetrievedChunk>,
}

pub struct AgentEngine {
    generation: Arc<dyn GenerationClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    parser: DocumentParser,
    chunker: TextChunker,
    index_store: IndexStore,
    sessions: SessionStore,
    tools: ToolRegistry,
    rag: RagAnswerer,
    max_tool_cycles: usize,
}

impl AgentEngine {
    pub fn new(
        config: &AgentConfig,
        generation: Arc<dyn GenerationClient>,
        embeddings: Arc<dyn EmbeddingClient>,
    ) -> Result<Self> {
        let timeout = std::time::Duration::from_secs(config.services.request_timeout_secs);
        let sessions = SessionStore::open(&config.data_dir.join("agent_memory.db"))?;

        Ok(Self {
            generation,
            embeddings,
            parser: DocumentParser::new(timeout),
            chunker: TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap),
            index_store: IndexStore::new(config.data_dir.join("indexes")),
            sessions,
            tools: ToolRegistry::new(),
            rag: RagAnswerer::new(config.retrieval.top_k, config.retrieval.max_supporting),
            max_tool_cycles: config.control.max_tool_cycles,
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Ingest a batch of files plus an optional URL into one fresh index.
    /// Returns `None` when nothing indexable was found (empty input is not
    /// an error).
    pub async fn ingest(
        &self,
        paths: &[PathBuf],
        url: Option<&str>,
    ) -> Result<Option<IngestReport>> {
        let text = self.parser.ingest(paths, url).await?;
        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            tracing::info!("ingestion produced no chunks; nothing to index");
            return Ok(None);
        }

        let index_id = format!("index_{}", Uuid::new_v4().simple());
        let index = self
            .index_store
            .build(&chunks, &index_id, self.embeddings.as_ref())
            .await?;

        Ok(Some(IngestReport {
            index_id,
            chunk_count: index.entries.len(),
        }))
    }

    /// One full interaction: optional grounding pass, control loop, then
    /// durable persistence of both turns. On any failure the whole turn
    /// fails and nothing is persisted, so the session stays consistent.
    pub async fn interact(
        &self,
        message: &str,
        session_id: &str,
        index_ids: &[String],
    ) -> Result<InteractionResult> {
        let indexes: Vec<VectorIndex> = index_ids
            .iter()
            .map(|id| self.index_store.load(id))
            .collect::<Result<_>>()?;

        let (user_message, supporting_chunks) = if indexes.is_empty() {
            (message.to_string(), Vec::new())
        } else {
            match self
                .rag
                .answer(message, &indexes, self.embeddings.as_ref(), self.generation.as_ref())
                .await
            {
                Ok(draft) => {
                    let augmented = augment_message(message, &draft);
                    (augmented, draft.supporting_chunks)
                }
                // Unable to ground the answer; fall back to the bare message.
                Err(Error::Generation(reason)) => {
                    tracing::warn!(%reason, "grounding pass failed, answering ungrounded");
                    (message.to_string(), Vec::new())
                }
                Err(other) => return Err(other),
            }
        };

        let mut transcript = vec![
            ChatMessage::system(SYNTHESIS_PROMPT),
            ChatMessage::user(&user_message),
        ];

        let LoopOutcome {
            final_text,
            last_tool_output,
            invocations,
        } = run_tool_loop(
            self.generation.as_ref(),
            &self.tools,
            &mut transcript,
            self.max_tool_cycles,
        )
        .await?;

        // Persist only after the loop succeeded: the raw message and the
        // finalized assistant text commit as one pair, then the tool log.
        self.sessions
            .append_exchange(session_id, message, &final_text)?;
        for invocation in &invocations {
            self.sessions.log_tool_invocation(
                session_id,
                &invocation.tool_name,
                &invocation.input,
                &invocation.output,
            )?;
        }

        tracing::info!(
            session_id,
            grounded = !supporting_chunks.is_empty(),
            tool_calls = invocations.len(),
            "interaction complete"
        );
        Ok(InteractionResult {
            final_text,
            tool_output: last_tool_output,
            supporting_chunks,
        })
    }
}

fn augment_message(message: &str, draft: &GroundedDraft) -> String {
    let context = draft
        .supporting_chunks
        .iter()
        .map(|chunk| format!("(chunk {} of {}) {}", chunk.ordinal, chunk.total, chunk.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n[Retrieved context]\n{}\n\n[Draft answer — verify against the \
         retrieved context before using]\n{}",
        message, context, draft.draft_answer
    )
}
