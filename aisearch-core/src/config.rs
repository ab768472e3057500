//! Configuration system for aisearch.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/aisearch/config.toml` and/or `.aisearch/config.toml`
//! in the workspace directory, plus an optional explicit file.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub settings: IndexSettings,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub agentic: AgenticConfig,
    #[serde(default)]
    pub metadata: MetadataPipelineConfig,
    #[serde(default)]
    pub graph: GraphStoreConfig,
}

/// Configuration for the LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" (default), "ollama", "lmstudio", or any
    /// OpenAI-compatible endpoint set through `base_url`.
    pub provider: String,
    /// Generation model.
    pub model: String,
    /// API base URL, e.g. `https://api.openai.com/v1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// API key given directly (takes precedence over `api_key_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Context window used for models the provider does not know.
    pub context_window: usize,
    pub timeout_secs: u64,
    /// Cheaper model for metadata extraction and sub-question generation.
    pub question_model: String,
    /// Model answering over the metadata-enriched index.
    pub answer_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
            context_window: 4096,
            timeout_secs: 120,
            question_model: "gpt-3.5-turbo-0125".to_string(),
            answer_model: "gpt-4-turbo".to_string(),
        }
    }
}

impl LlmConfig {
    /// The API key from the config itself or from the configured env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "openai" (default) or "local".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensions (provider default if 0).
    #[serde(default)]
    pub dimensions: usize,
    /// Number of texts per embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// API base URL for the OpenAI embedder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_embedding_provider() -> String {
    "openai".into()
}

fn default_batch_size() -> usize {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dimensions: 0,
            batch_size: default_batch_size(),
            base_url: None,
        }
    }
}

/// Global chunking and prompt sizing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Context window assumed when packing retrieved text into prompts.
    pub context_window: usize,
    /// Tokens reserved for the answer.
    pub num_output: usize,
    pub similarity_top_k: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            context_window: 4096,
            num_output: 256,
            similarity_top_k: 2,
        }
    }
}

/// Data, storage and log locations. Relative paths resolve against the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub log_dir: PathBuf,
    pub questions_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/paul_graham_essay"),
            storage_dir: PathBuf::from("persistent"),
            log_dir: PathBuf::from("logs"),
            questions_dir: PathBuf::from("persistent/questions"),
        }
    }
}

impl PathsConfig {
    /// Resolve every relative path against `workspace`.
    pub fn resolved(&self, workspace: &Path) -> PathsConfig {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace.join(p)
            }
        };
        PathsConfig {
            data_dir: resolve(&self.data_dir),
            storage_dir: resolve(&self.storage_dir),
            log_dir: resolve(&self.log_dir),
            questions_dir: resolve(&self.questions_dir),
        }
    }
}

/// Settings for the multi-document agent pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenticConfig {
    /// Directory of downloaded documentation pages.
    pub source_dir: PathBuf,
    /// Maximum number of pages turned into agents.
    pub doc_limit: usize,
    /// Number of leading HTML elements skipped on every page (site navigation).
    pub toc_skip: usize,
    /// Tools offered to the top-level agent per question.
    pub tool_top_k: usize,
    /// Tools kept after reranking.
    pub rerank_top_n: usize,
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/docs.llamaindex.ai"),
            doc_limit: 1314,
            toc_skip: 72,
            tool_top_k: 10,
            rerank_top_n: 5,
        }
    }
}

/// A PDF and the page ranges kept from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingSource {
    pub path: PathBuf,
    /// Half-open `[start, end)` page ranges, zero based.
    pub page_ranges: Vec<(usize, usize)>,
}

/// Settings for the metadata extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataPipelineConfig {
    pub sources: Vec<FilingSource>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub similarity_top_k: usize,
}

impl Default for MetadataPipelineConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                FilingSource {
                    path: PathBuf::from("data/metadata/10k-132.pdf"),
                    page_ranges: vec![(0, 3), (63, 69)],
                },
                FilingSource {
                    path: PathBuf::from("data/metadata/10k-vFinal.pdf"),
                    page_ranges: vec![(0, 3), (68, 73)],
                },
            ],
            chunk_size: 512,
            chunk_overlap: 128,
            similarity_top_k: 10,
        }
    }
}

/// Which graph store backs the knowledge graph pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStoreConfig {
    /// "simple" (in-process, persisted as JSON) or "neo4j".
    pub store: String,
    pub neo4j_url: String,
    pub neo4j_user: String,
    pub neo4j_password_env: String,
    pub neo4j_database: String,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            store: "simple".to_string(),
            neo4j_url: "http://localhost:7474".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password_env: "NEO4J_PASSWORD".to_string(),
            neo4j_database: "neo4j".to_string(),
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `AISEARCH_`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.aisearch/config.toml`)
/// 4. User config (`~/.config/aisearch/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "aisearch", "aisearch") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".aisearch").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // AISEARCH_LLM__MODEL, AISEARCH_SETTINGS__CHUNK_SIZE, ...
    figment = figment.merge(Env::prefixed("AISEARCH_").split("__"));

    figment.extract().map_err(Box::new)
}
