use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub control: ControlConfig,
    pub services: ServiceConfig,
}

/// Sliding-window chunk geometry. The 1000/200 defaults follow the finer of
/// the two variants found in production traffic; overlap must stay strictly
/// below chunk_size so the window always makes forward progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Top-k chunks retrieved per index.
    pub top_k: usize,
    /// Hard ceiling on supporting chunks merged across all indexes.
    pub max_supporting: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Maximum AGENT→TOOLS→AGENT cycles before the interaction fails.
    pub max_tool_cycles: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub generation_model: String,
    pub embedding_model: String,
    pub endpoint_base: String,
    /// API key; falls back to the GEMINI_API_KEY environment variable.
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl ServiceConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
    }
}

impl AgentConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.chunk_size == 0 {
            return Err("chunking.chunk_size must be > 0".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.retrieval.top_k == 0 {
            return Err("retrieval.top_k must be > 0".into());
        }
        if self.retrieval.max_supporting == 0 {
            return Err("retrieval.max_supporting must be > 0".into());
        }
        if self.control.max_tool_cycles == 0 {
            return Err("control.max_tool_cycles must be > 0".into());
        }
        if self.services.request_timeout_secs == 0 {
            return Err("services.request_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("samvad");

        Self {
            data_dir,
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
            },
            retrieval: RetrievalConfig {
                top_k: 4,
                max_supporting: 12,
            },
            control: ControlConfig { max_tool_cycles: 5 },
            services: ServiceConfig {
                generation_model: "gemini-1.5-flash".to_string(),
                embedding_model: "embedding-001".to_string(),
                endpoint_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: None,
                request_timeout_secs: 30,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut config = AgentConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tool_cycles_rejected() {
        let mut config = AgentConfig::default();
        config.control.max_tool_cycles = 0;
        assert!(config.validate().is_err());
    }
}
