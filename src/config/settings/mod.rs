
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::rag::NoContextPolicy;

pub const ENV_QDRANT_URL: &str = "QDRANT_URL";
pub const ENV_QDRANT_API_KEY: &str = "QDRANT_API_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_MODEL_NAME: &str = "MODEL_NAME";
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_DOCS_PATH: &str = "DOCS_PATH";

pub const DEFAULT_COLLECTION_NAME: &str = "humanoid_robotics_textbook";
pub const DEFAULT_VECTOR_SIZE: u32 = 768;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub qdrant: QdrantConfig,
    pub gemini: GeminiConfig,
    pub ingest: IngestConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: String,
    pub collection: String,
    pub vector_size: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    /// Points sent per upsert request
    pub upsert_batch_size: usize,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            collection: DEFAULT_COLLECTION_NAME.to_string(),
            vector_size: DEFAULT_VECTOR_SIZE,
            timeout_secs: 30,
            retry_attempts: 3,
            upsert_batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            generation_model: "gemini-1.5-pro-latest".to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub docs_dir: PathBuf,
    pub batch_size: usize,
    /// Pause after every embedding batch call, for upstream rate limits
    pub batch_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            batch_size: 50,
            batch_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub no_context_policy: NoContextPolicy,
    pub textbook_title: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            no_context_policy: NoContextPolicy::default(),
            textbook_title: "Humanoid Robotics Textbook".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost".to_string(),
                "http://localhost:3000".to_string(),
            ],
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required setting {0} is not set")]
    MissingValue(&'static str),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidEnvValue { name: &'static str, value: String },
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),
    #[error("Invalid vector size: {0} (must be between 64 and 4096)")]
    InvalidVectorSize(u32),
    #[error("Invalid embedding batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(usize),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 10000)")]
    InvalidUpsertBatchSize(usize),
    #[error("Invalid chunk size: {0} (must be between 100 and 8192)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    /// Build the configuration from an optional TOML file, then overlay
    /// values found through `lookup` (normally the process environment).
    ///
    /// Does not validate; call [`Config::validate`] before using the result.
    #[inline]
    pub fn from_sources<F>(file: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_overrides(lookup)?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(ENV_QDRANT_URL) {
            self.qdrant.url = url;
        }
        if let Some(key) = get(ENV_QDRANT_API_KEY) {
            self.qdrant.api_key = key;
        }
        if let Some(key) = get(ENV_GEMINI_API_KEY).or_else(|| get(ENV_GOOGLE_API_KEY)) {
            self.gemini.api_key = key;
        }
        if let Some(model) = get(ENV_MODEL_NAME) {
            self.gemini.generation_model = model;
        }
        if let Some(origins) = get(ENV_ALLOWED_ORIGINS) {
            for origin in origins.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                if !self.server.allowed_origins.iter().any(|o| o == origin) {
                    self.server.allowed_origins.push(origin.to_string());
                }
            }
        }
        if let Some(host) = get(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
                name: ENV_PORT,
                value: port.clone(),
            })?;
        }
        if let Some(dir) = get(ENV_DOCS_PATH) {
            self.ingest.docs_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Names of required settings that have no value
    #[inline]
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.qdrant.url.trim().is_empty() {
            missing.push(ENV_QDRANT_URL);
        }
        if self.qdrant.api_key.trim().is_empty() {
            missing.push(ENV_QDRANT_API_KEY);
        }
        if self.gemini.api_key.trim().is_empty() {
            missing.push(ENV_GEMINI_API_KEY);
        }
        missing
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = self.missing_required().first() {
            return Err(ConfigError::MissingValue(name));
        }
        self.qdrant.validate()?;
        self.gemini.validate()?;
        self.ingest.validate()?;
        self.validate_chunking_config()?;
        self.retrieval.validate()?;
        self.server.validate()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=8192).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    /// Socket address string the query service binds to
    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn validate_timeout(timeout_secs: u64) -> Result<(), ConfigError> {
    if !(1..=600).contains(&timeout_secs) {
        return Err(ConfigError::InvalidTimeout(timeout_secs));
    }
    Ok(())
}

fn validate_retry_attempts(attempts: u32) -> Result<(), ConfigError> {
    if !(1..=10).contains(&attempts) {
        return Err(ConfigError::InvalidRetryAttempts(attempts));
    }
    Ok(())
}

impl QdrantConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.collection.trim().is_empty() || self.collection.contains('/') {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }

        if !(64..=4096).contains(&self.vector_size) {
            return Err(ConfigError::InvalidVectorSize(self.vector_size));
        }

        if self.upsert_batch_size == 0 || self.upsert_batch_size > 10_000 {
            return Err(ConfigError::InvalidUpsertBatchSize(self.upsert_batch_size));
        }

        validate_retry_attempts(self.retry_attempts)?;
        validate_timeout(self.timeout_secs)
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.url)
    }
}

impl GeminiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.generation_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.generation_model.clone()));
        }

        validate_retry_attempts(self.retry_attempts)?;
        validate_timeout(self.timeout_secs)
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.base_url)
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // batchEmbedContents accepts at most 100 requests per call
        if self.batch_size == 0 || self.batch_size > 100 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 || self.top_k > 100 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        validate_timeout(self.request_timeout_secs)
    }
}

fn parse_http_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// Mask a secret for display, keeping the first and last four characters
#[inline]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return "(not set)".to_string();
    }
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
