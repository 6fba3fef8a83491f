pub mod embedding;
pub mod error;
pub mod llm;
pub mod vectordb;

pub use embedding::{cosine_similarity, head, Embedder, EmbeddingConfig, EmbeddingEngine};
pub use error::ExternalError;
pub use llm::{ChatCompletion, ChatMessage, LlmClient, LlmConfig, ProviderPreference};
pub use vectordb::{QdrantConfig, VectorDb, VectorHit};
