//! Configuration for the retrieval engine
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The result is validated before use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::retrieval::SimilarityMetric;

/// File name of the SQLite index inside `index.storage_path`
pub const INDEX_FILE_NAME: &str = "index.sqlite3";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Retrieval and context assembly
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Source documents
    #[serde(default)]
    pub documents: DocumentsConfig,
}

impl RagConfig {
    /// Load configuration: defaults, optional TOML file, then process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.embeddings.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.embeddings.base_url = url;
        }
        if let Some(provider) = get("EMBEDDING_PROVIDER") {
            self.embeddings.provider = provider.parse()?;
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(dims) = get("EMBEDDING_DIMENSIONS") {
            self.embeddings.dimensions = parse_env("EMBEDDING_DIMENSIONS", &dims)?;
        }
        if let Some(host) = get("APP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("APP_PORT") {
            self.server.port = parse_env("APP_PORT", &port)?;
        }
        if let Some(path) = get("VECTOR_DB_PATH") {
            self.index.storage_path = PathBuf::from(path);
        }
        if let Some(path) = get("DOCUMENTS_PATH") {
            self.documents.path = PathBuf::from(path);
        }
        if let Some(size) = get("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("CHUNK_SIZE", &size)?;
        }
        if let Some(overlap) = get("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("CHUNK_OVERLAP", &overlap)?;
        }
        if let Some(max_chars) = get("CONTEXT_MAX_CHARS") {
            self.retrieval.context_max_chars = parse_env("CONTEXT_MAX_CHARS", &max_chars)?;
        }
        if let Some(metric) = get("SIMILARITY_METRIC") {
            self.index.metric = metric.parse()?;
        }

        Ok(())
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".to_string()));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::Config("embeddings.batch_size must be > 0".to_string()));
        }
        if self.embeddings.provider == EmbeddingBackend::OpenAi && self.embeddings.api_key.is_none() {
            return Err(Error::Config(
                "embeddings.provider = openai requires OPENAI_API_KEY".to_string(),
            ));
        }
        if self.retrieval.max_k == 0 {
            return Err(Error::Config("retrieval.max_k must be > 0".to_string()));
        }
        if self.retrieval.default_k == 0 || self.retrieval.default_k > self.retrieval.max_k {
            return Err(Error::Config(format!(
                "retrieval.default_k must be in 1..={}",
                self.retrieval.max_k
            )));
        }
        if self.retrieval.context_k == 0 || self.retrieval.context_k > self.retrieval.max_k {
            return Err(Error::Config(format!(
                "retrieval.context_k must be in 1..={}",
                self.retrieval.max_k
            )));
        }
        if self.retrieval.context_max_chars == 0 {
            return Err(Error::Config("retrieval.context_max_chars must be > 0".to_string()));
        }

        Ok(())
    }

    /// Full path of the SQLite index file
    pub fn index_file(&self) -> PathBuf {
        self.index.storage_path.join(INDEX_FILE_NAME)
    }

    /// Whether the deterministic mock embedder should be used
    pub fn use_mock_embeddings(&self) -> bool {
        match self.embeddings.provider {
            EmbeddingBackend::Mock => true,
            EmbeddingBackend::OpenAi => false,
            EmbeddingBackend::Auto => self.embeddings.api_key.is_none(),
        }
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", key, value, e)))
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            enable_cors: true,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI when an API key is configured, mock otherwise
    #[default]
    Auto,
    /// OpenAI-compatible `/v1/embeddings` endpoint
    OpenAi,
    /// Deterministic hashed bag-of-words, no network
    Mock,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("Unknown embedding provider: {}", other))),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend selection
    #[serde(default)]
    pub provider: EmbeddingBackend,
    /// API key (never serialized)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Embedding dimensions (1536 for text-embedding-3-small)
    pub dimensions: usize,
    /// Texts per embeddings request
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Auto,
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 100,
            timeout_secs: 60,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in tokens
    pub chunk_size: usize,
    /// Tokens shared between consecutive windows
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Create and validate chunk parameters
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// `chunk_size > 0` and `chunk_overlap < chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be > 0".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the index database
    pub storage_path: PathBuf,
    /// Similarity metric used for search
    #[serde(default)]
    pub metric: SimilarityMetric,
    /// Move a corrupt index aside and start empty instead of failing
    pub rebuild_on_corrupt: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./data/vector_db"),
            metric: SimilarityMetric::Cosine,
            rebuild_on_corrupt: true,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of search results
    pub default_k: usize,
    /// Default number of chunks assembled into a context
    pub context_k: usize,
    /// Upper bound accepted for `k`
    pub max_k: usize,
    /// Character budget of an assembled context
    pub context_max_chars: usize,
    /// Similarity floor applied when assembling context
    pub context_min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            context_k: 3,
            max_k: 100,
            context_max_chars: 8000,
            context_min_similarity: 0.0,
        }
    }
}

/// Source documents configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Directory scanned by directory ingestion
    pub path: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/documents"),
        }
    }
}
