pub mod config;
pub mod crawler;
pub mod external;
pub mod rag;
pub mod schema_mapper;
pub mod server;
pub mod storage;

pub use config::Config;
pub use crawler::WebCrawler;
pub use external::{EmbeddingEngine, ExternalError, LlmClient, VectorDb};
pub use rag::RagPipeline;
pub use schema_mapper::SchemaMapper;
pub use storage::StorageManager;
