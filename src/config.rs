use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::crawler::CrawlerConfig;
use crate::external::{EmbeddingConfig, LlmConfig, ProviderPreference, QdrantConfig};
use crate::storage::PostgresConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl ApiConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub postgres: PostgresConfig,
    pub qdrant: QdrantConfig,
    pub api: ApiConfig,
    pub crawler: CrawlerConfig,
    pub log_level: String,
}

/// Read an optional variable, treating an empty value as unset
fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load LLM config
        let llm = LlmConfig {
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "meta-llama/llama-4-maverick-17b-128e-instruct".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            provider: ProviderPreference::parse(
                &env::var("LLM_PROVIDER").unwrap_or_else(|_| "auto".to_string()),
            ),
        };

        // Load embedding config
        let embedding = EmbeddingConfig {
            model: env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "all-MiniLM-L6-v2".to_string()),
        };

        // Load PostgreSQL config
        let postgres = PostgresConfig {
            host: env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("POSTGRES_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()
                .unwrap_or(5432),
            user: env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("POSTGRES_PASSWORD").unwrap_or_default(),
            database: env::var("POSTGRES_DATABASE").unwrap_or_else(|_| "crawler_db".to_string()),
            url: optional_var("POSTGRES_URL"),
        };

        // Load Qdrant config
        let qdrant = QdrantConfig {
            host: env::var("QDRANT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("QDRANT_PORT")
                .unwrap_or_else(|_| "6334".to_string())
                .parse()
                .unwrap_or(6334),
            url: optional_var("QDRANT_URL"),
            api_key: optional_var("QDRANT_API_KEY"),
            collection_name: env::var("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|_| "crawler_vectors".to_string()),
        };

        // Load API config
        let api = ApiConfig {
            host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
        };

        // Load crawler config
        let crawler = CrawlerConfig {
            user_agent: env::var("CRAWLER_USER_AGENT").unwrap_or_else(|_| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
            }),
            timeout_secs: env::var("CRAWLER_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            max_retries: env::var("CRAWLER_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            llm,
            embedding,
            postgres,
            qdrant,
            api,
            crawler,
            log_level,
        })
    }
}
