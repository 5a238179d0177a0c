
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::retrieval::RetrievalConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "all-minilm:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// OpenAI-compatible chat completion endpoint used to write the report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-70b-8192".to_string(),
            temperature: 0.3,
            max_tokens: None,
            timeout_seconds: 60,
            api_key_env: "GROQ_API_KEY".to_string(),
        }
    }
}

/// Settings shared by the per-source collectors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub max_concurrency: usize,
    pub user_agent: String,
    pub newsapi_url: String,
    pub newsapi_key_env: String,
    pub news_page_size: u32,
    /// Download each article page and extract its body text
    pub fetch_full_text: bool,
    pub reddit_url: String,
    pub reddit_limit: u32,
    pub alpha_vantage_url: String,
    pub alpha_vantage_key_env: String,
    pub price_days: usize,
    /// Overrides the Algolia search URL derived from the application id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producthunt_url: Option<String>,
    pub producthunt_app_id_env: String,
    pub producthunt_api_key_env: String,
    pub producthunt_limit: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
            retry_attempts: 2,
            max_concurrency: 4,
            user_agent: "market-brief/0.1 (market intelligence collector)".to_string(),
            newsapi_url: "https://newsapi.org/v2/everything".to_string(),
            newsapi_key_env: "NEWS_API_KEY".to_string(),
            news_page_size: 50,
            fetch_full_text: true,
            reddit_url: "https://www.reddit.com/search.json".to_string(),
            reddit_limit: 10,
            alpha_vantage_url: "https://www.alphavantage.co/query".to_string(),
            alpha_vantage_key_env: "ALPHA_VANTAGE_API_KEY".to_string(),
            price_days: 30,
            producthunt_url: None,
            producthunt_app_id_env: "PRODUCTHUNT_APP_ID".to_string(),
            producthunt_api_key_env: "PRODUCTHUNT_API_KEY".to_string(),
            producthunt_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    /// Custom prompt template; the built-in template is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid chunk size: {0} words (must be between 1 and 10000)")]
    InvalidChunkWords(usize),
    #[error("Invalid top-k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid candidate pool size: {0} (must be between 1 and 1000)")]
    InvalidFetchK(usize),
    #[error("Invalid diversity lambda: {0} (must be between 0.0 and 1.0)")]
    InvalidLambda(f32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid timeout: {0} seconds (must be between 1 and 600)")]
    InvalidTimeout(u64),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid page size: {0} (must be between 1 and 100)")]
    InvalidPageSize(u32),
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
    #[error("Prompt template not found: {0}")]
    MissingTemplate(PathBuf),
    #[error("Invalid prompt template: {0}")]
    InvalidTemplate(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            llm: LlmConfig::default(),
            sources: SourcesConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompt: PromptConfig::default(),
            base_dir: Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl Config {
    /// Default location for configuration, collected articles, the index and reports
    #[inline]
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        dirs::data_dir()
            .map(|data| data.join("market-brief"))
            .or_else(|| dirs::home_dir().map(|home| home.join(".market-brief")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let config_path = base_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: base_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = base_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let base_dir = self.get_base_dir();

        fs::create_dir_all(base_dir).with_context(|| {
            format!("Failed to create config directory: {}", base_dir.display())
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.llm.validate()?;
        self.sources.validate()?;
        self.validate_chunking_config()?;
        self.validate_retrieval_config()?;
        self.validate_prompt_config()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let max_words = self.chunking.max_words;
        if !(1..=10_000).contains(&max_words) {
            return Err(ConfigError::InvalidChunkWords(max_words));
        }
        Ok(())
    }

    fn validate_retrieval_config(&self) -> Result<(), ConfigError> {
        let config = &self.retrieval;

        if !(1..=100).contains(&config.top_k) {
            return Err(ConfigError::InvalidTopK(config.top_k));
        }

        if !(1..=1000).contains(&config.fetch_k) {
            return Err(ConfigError::InvalidFetchK(config.fetch_k));
        }

        if !(0.0..=1.0).contains(&config.lambda) {
            return Err(ConfigError::InvalidLambda(config.lambda));
        }

        Ok(())
    }

    fn validate_prompt_config(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.prompt.template_path {
            let resolved = self.resolve_path(path);
            if !resolved.is_file() {
                return Err(ConfigError::MissingTemplate(resolved));
            }
        }
        Ok(())
    }

    /// Relative paths in the config file are relative to the base directory
    #[inline]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Raw per-source, per-keyword JSON files
    #[inline]
    pub fn articles_dir(&self) -> PathBuf {
        self.get_base_dir().join("articles")
    }

    /// Persisted similarity index
    #[inline]
    pub fn embeddings_dir(&self) -> PathBuf {
        self.get_base_dir().join("embeddings")
    }

    #[inline]
    pub fn reports_json_dir(&self) -> PathBuf {
        self.get_base_dir().join("reports").join("json")
    }

    #[inline]
    pub fn reports_pdf_dir(&self) -> PathBuf {
        self.get_base_dir().join("reports").join("pdf")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

/// Read a credential from the environment, failing when it is unset or blank
#[inline]
pub fn require_credential(env_name: &str) -> Result<String, ConfigError> {
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingCredential(env_name.to_string())),
    }
}

/// Read an optional credential; blank values count as unset
#[inline]
pub fn optional_credential(env_name: &str) -> Option<String> {
    require_credential(env_name).ok()
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidProtocol(parsed.scheme().to_string()));
    }
    Ok(())
}

fn validate_timeout(seconds: u64) -> Result<(), ConfigError> {
    if !(1..=600).contains(&seconds) {
        return Err(ConfigError::InvalidTimeout(seconds));
    }
    Ok(())
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(8..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(8..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.base_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        validate_timeout(self.timeout_seconds)?;

        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::MissingCredential(self.api_key_env.clone()));
        }

        Ok(())
    }

    /// API key for the chat completion endpoint; its absence is a startup error
    #[inline]
    pub fn api_key(&self) -> Result<String, ConfigError> {
        require_credential(&self.api_key_env)
    }

    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        validate_url(&base_url)?;
        self.base_url = base_url;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }
}

impl SourcesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout(self.timeout_seconds)?;

        if !(1..=64).contains(&self.max_concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrency));
        }

        if !(1..=100).contains(&self.news_page_size) {
            return Err(ConfigError::InvalidPageSize(self.news_page_size));
        }

        if !(1..=100).contains(&self.reddit_limit) {
            return Err(ConfigError::InvalidPageSize(self.reddit_limit));
        }

        validate_url(&self.newsapi_url)?;
        validate_url(&self.reddit_url)?;
        validate_url(&self.alpha_vantage_url)?;
        if let Some(url) = &self.producthunt_url {
            validate_url(url)?;
        }

        Ok(())
    }
}
