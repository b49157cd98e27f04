use crate::pipeline::PipelineConfig;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_SUMMARIZATION_MODEL: &str = "llama3.1";
const DEFAULT_TOKENIZER_MODEL: &str = "cl100k_base";
const DEFAULT_MAX_WORDS: usize = 200;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Process-level configuration for the Rusty Digest binaries.
///
/// The pipeline itself never reads this; binaries turn it into explicit [`PipelineConfig`]
/// values via [`Config::pipeline_config`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Summarizer adapter used by the binaries.
    pub summarization_provider: SummarizationProvider,
    /// Model identifier passed to Ollama.
    pub summarization_model: String,
    /// Word budget handed to summarizer adapters.
    pub summarization_max_words: usize,
    /// Per-call timeout for remote summarizers.
    pub summarization_timeout: Duration,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Model or encoding used for size estimates (`whitespace` selects the word counter).
    pub tokenizer_model: String,
    /// Default run parameters for requests that do not override them.
    pub pipeline: PipelineConfig,
    /// Optional whole-run timeout.
    pub run_timeout: Option<Duration>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported summarizer adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummarizationProvider {
    /// Deterministic offline summaries built from leading sentences.
    Extractive,
    /// Local Ollama runtime.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            summarization_provider: SummarizationProvider::Extractive,
            summarization_model: DEFAULT_SUMMARIZATION_MODEL.to_string(),
            summarization_max_words: DEFAULT_MAX_WORDS,
            summarization_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            tokenizer_model: DEFAULT_TOKENIZER_MODEL.to_string(),
            pipeline: PipelineConfig::default(),
            run_timeout: None,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let pipeline_defaults = defaults.pipeline;

        let summarization_provider = match load_env_optional("SUMMARIZATION_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("SUMMARIZATION_PROVIDER".into()))?,
            None => defaults.summarization_provider,
        };

        let pipeline = PipelineConfig {
            token_max: parse_env("PIPELINE_TOKEN_MAX")?.unwrap_or(pipeline_defaults.token_max),
            chunk_count_limit: parse_env("PIPELINE_CHUNK_COUNT_LIMIT")?
                .unwrap_or(pipeline_defaults.chunk_count_limit),
            recursion_limit: parse_env("PIPELINE_RECURSION_LIMIT")?
                .unwrap_or(pipeline_defaults.recursion_limit),
            chunk_size: parse_env("PIPELINE_CHUNK_SIZE")?.unwrap_or(pipeline_defaults.chunk_size),
            chunk_overlap: parse_env("PIPELINE_CHUNK_OVERLAP")?
                .unwrap_or(pipeline_defaults.chunk_overlap),
            map_concurrency: parse_env("PIPELINE_MAP_CONCURRENCY")?
                .unwrap_or(pipeline_defaults.map_concurrency),
        };
        pipeline
            .validate()
            .map_err(|error| ConfigError::InvalidValue(format!("PIPELINE_*: {error}")))?;

        Ok(Self {
            summarization_provider,
            summarization_model: load_env_optional("SUMMARIZATION_MODEL")
                .unwrap_or(defaults.summarization_model),
            summarization_max_words: parse_env("SUMMARIZATION_MAX_WORDS")?
                .unwrap_or(defaults.summarization_max_words),
            summarization_timeout: parse_env("SUMMARIZATION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.summarization_timeout),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            tokenizer_model: load_env_optional("TOKENIZER_MODEL")
                .unwrap_or(defaults.tokenizer_model),
            pipeline,
            run_timeout: parse_env("PIPELINE_RUN_TIMEOUT_SECS")?.map(Duration::from_secs),
            server_port: parse_env("SERVER_PORT")?,
        })
    }

    /// Default run parameters derived from the environment.
    pub fn pipeline_config(&self) -> PipelineConfig {
        self.pipeline
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for SummarizationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extractive" | "none" => Ok(Self::Extractive),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        provider = ?config.summarization_provider,
        model = %config.summarization_model,
        tokenizer = %config.tokenizer_model,
        pipeline = ?config.pipeline,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
