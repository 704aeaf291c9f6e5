use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::{LlmSettings, DEFAULT_MODEL};
use crate::pipeline::chunker::ChunkerConfig;
use crate::pipeline::embedding::{EmbeddingConfig, EmbeddingProviderKind};
use crate::pipeline::ranker::RankerConfig;
use crate::pipeline::scorer::ScoringConfig;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,
    pub max_concurrent_sessions: usize,
    pub llm: LlmSettings,
    pub embedding: EmbeddingConfig,
    pub chunker: ChunkerConfig,
    pub scoring: ScoringConfig,
    pub ranker: RankerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let llm_defaults = LlmSettings::default();
        let embedding_defaults = EmbeddingConfig::default();
        let chunker_defaults = ChunkerConfig::default();
        let scoring_defaults = ScoringConfig::default();

        let embedding_provider = match optional_env("EMBEDDING_PROVIDER") {
            Some(raw) => raw
                .parse::<EmbeddingProviderKind>()
                .map_err(anyhow::Error::msg)
                .context("EMBEDDING_PROVIDER must be 'hashing' or 'openai'")?,
            None => embedding_defaults.provider,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_concurrent_sessions: parse_env("MAX_CONCURRENT_SESSIONS", 2)?,
            llm: LlmSettings {
                api_key: optional_env("ANTHROPIC_API_KEY"),
                api_url: optional_env("LLM_API_URL").unwrap_or(llm_defaults.api_url),
                model: optional_env("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                timeout: Duration::from_secs(parse_env(
                    "LLM_TIMEOUT_SECS",
                    llm_defaults.timeout.as_secs(),
                )?),
                max_retries: parse_env("LLM_MAX_RETRIES", llm_defaults.max_retries)?,
            },
            embedding: EmbeddingConfig {
                provider: embedding_provider,
                model: optional_env("EMBEDDING_MODEL"),
                api_url: optional_env("EMBEDDING_API_URL").unwrap_or(embedding_defaults.api_url),
                api_key: optional_env("EMBEDDING_API_KEY"),
                dims: parse_env("EMBEDDING_DIMS", embedding_defaults.dims)?,
                ..embedding_defaults
            },
            chunker: ChunkerConfig {
                size: parse_env("CHUNK_SIZE", chunker_defaults.size)?,
                overlap: parse_env("CHUNK_OVERLAP", chunker_defaults.overlap)?,
            }
            .normalized(),
            scoring: ScoringConfig {
                fallback_score: parse_env("SCORE_FALLBACK", scoring_defaults.fallback_score)?
                    .min(100),
                jd_char_budget: parse_env("JD_CHAR_BUDGET", scoring_defaults.jd_char_budget)?,
                summary_char_budget: parse_env(
                    "SUMMARY_CHAR_BUDGET",
                    scoring_defaults.summary_char_budget,
                )?,
            },
            ranker: RankerConfig::default(),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank values both count as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_value(key, optional_env(key), default)
}

fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
