use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::index::EmbeddingConfig;
use crate::orchestration::OrchestratorSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!("STORAGE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    /// Required when `storage_backend` is Postgres.
    pub database_url: Option<String>,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub chunk_words: usize,
    pub embedding: EmbeddingConfig,
    pub orchestrator: OrchestratorSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let storage_backend: StorageBackend = env_or("STORAGE_BACKEND", "postgres").parse()?;
        let database_url = std::env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            bail!("Required environment variable 'DATABASE_URL' is not set (STORAGE_BACKEND=postgres)");
        }

        let defaults = OrchestratorSettings::default();
        let orchestrator = OrchestratorSettings {
            distance_threshold: parse_env("RETRIEVAL_DISTANCE_THRESHOLD", defaults.distance_threshold)?,
            top_k: parse_env("RETRIEVAL_TOP_K", defaults.top_k)?,
            history_turns: parse_env("HISTORY_TURNS", defaults.history_turns)?,
            ..defaults
        };

        Ok(Config {
            storage_backend,
            database_url,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
            chunk_words: parse_env("CHUNK_WORDS", 500)?,
            embedding: EmbeddingConfig {
                api_base: env_or("EMBEDDING_API_BASE", "https://api.openai.com/v1"),
                path: env_or("EMBEDDING_PATH", "/embeddings"),
                model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
                api_key: require_env("EMBEDDING_API_KEY")?,
                dimensions: parse_env("EMBEDDING_DIMENSIONS", 384)?,
                timeout: Duration::from_millis(parse_env("EMBEDDING_TIMEOUT_MS", 15_000)?),
            },
            orchestrator,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_parsing() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!(" Postgres ".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_parse_env_defaults_and_rejects_garbage() {
        assert_eq!(parse_env("TAILOR_TEST_UNSET_VAR", 0.8).unwrap(), 0.8);

        std::env::set_var("TAILOR_TEST_BAD_TOP_K", "three");
        assert!(parse_env::<usize>("TAILOR_TEST_BAD_TOP_K", 3).is_err());

        std::env::set_var("TAILOR_TEST_GOOD_TOP_K", " 7 ");
        assert_eq!(parse_env::<usize>("TAILOR_TEST_GOOD_TOP_K", 3).unwrap(), 7);
    }
}
