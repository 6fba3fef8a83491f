use std::collections::HashMap;

use anyhow::Result;
use qdrant_client::{
    config::QdrantConfig as ClientConfig,
    qdrant::{
        point_id::PointIdOptions, points_selector::PointsSelectorOneOf, value::Kind,
        vectors_config::Config, CreateCollection, DeletePoints, Distance, PointId, PointStruct,
        PointsIdsList, PointsSelector, SearchPoints, UpsertPoints, Value, VectorParams,
        VectorsConfig, WithPayloadSelector, WriteOrdering,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::external::error::ExternalError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub host: String,
    pub port: u16,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub collection_name: String,
}

impl QdrantConfig {
    /// Endpoint URL for the Qdrant service: the cloud URL when set, host/port otherwise
    pub fn endpoint(&self) -> Result<String> {
        let url = match &self.url {
            Some(cloud_url) => cloud_url.clone(),
            None => {
                if self.host.starts_with("http://") || self.host.starts_with("https://") {
                    format!("{}:{}", self.host.trim_end_matches('/'), self.port)
                } else {
                    format!("http://{}:{}", self.host, self.port)
                }
            }
        };

        // Validate the URL
        Url::parse(&url).map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;

        Ok(url)
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6334,
            url: None,
            api_key: None,
            collection_name: "crawler_vectors".to_string(),
        }
    }
}

/// One vector-search match with its stored page URL
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub url: String,
    pub score: f32,
}

/// Point id derived from the page URL, stable across recrawls
fn point_id_for_url(url: &str) -> u64 {
    let digest = Sha256::digest(url.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Wrapper for the Qdrant vector database
pub struct VectorDb {
    client: Qdrant,
    config: QdrantConfig,
}

impl VectorDb {
    /// Connect to local or cloud Qdrant with the given configuration
    pub async fn connect(config: QdrantConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let mut client_config = ClientConfig::from_url(&endpoint);
        client_config.api_key = config.api_key.clone();

        let client = Qdrant::new(client_config)
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| ExternalError::VectorDbError(e.to_string()))?;

        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    /// Create the configured collection when it does not exist yet
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<()> {
        let existing = self.list_collection_names().await?;
        if existing.iter().any(|name| name == &self.config.collection_name) {
            return Ok(());
        }

        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: vector_size,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        let create_collection = CreateCollection {
            collection_name: self.config.collection_name.clone(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| ExternalError::VectorDbError(e.to_string()))?;

        tracing::info!(collection = %self.config.collection_name, "Created vector collection");
        Ok(())
    }

    /// Upsert one page vector; recrawling the same URL overwrites its point
    pub async fn upsert_page(
        &self,
        url: &str,
        vector: Vec<f32>,
        payload: HashMap<String, String>,
    ) -> Result<()> {
        let payload: HashMap<String, Value> =
            payload.into_iter().map(|(k, v)| (k, Value::from(v))).collect();

        let point = PointStruct {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Num(point_id_for_url(url))),
            }),
            payload,
            vectors: Some(vector.into()),
        };

        let upsert_points = UpsertPoints {
            collection_name: self.config.collection_name.clone(),
            points: vec![point],
            ordering: Some(WriteOrdering::default()),
            ..Default::default()
        };

        self.client
            .upsert_points(upsert_points)
            .await
            .map_err(|e| ExternalError::VectorDbError(e.to_string()))?;

        Ok(())
    }

    /// Search for the most similar page vectors
    pub async fn search(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<VectorHit>> {
        let search_request = SearchPoints {
            collection_name: self.config.collection_name.clone(),
            vector,
            limit,
            with_payload: Some(WithPayloadSelector::from(true)),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| ExternalError::VectorDbError(e.to_string()))?;

        // Points without a url payload cannot be hydrated and are skipped
        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                let url = point.payload.get("url").and_then(|value| match &value.kind {
                    Some(Kind::StringValue(s)) => Some(s.clone()),
                    _ => None,
                })?;
                Some(VectorHit {
                    url,
                    score: point.score,
                })
            })
            .collect())
    }

    /// Delete the points belonging to the given page URLs
    pub async fn delete_by_urls(&self, urls: &[String]) -> Result<()> {
        let ids: Vec<PointId> = urls
            .iter()
            .map(|url| PointId {
                point_id_options: Some(PointIdOptions::Num(point_id_for_url(url))),
            })
            .collect();

        let points_selector = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList { ids })),
        };

        let delete_points = DeletePoints {
            collection_name: self.config.collection_name.clone(),
            points: Some(points_selector),
            ordering: Some(WriteOrdering::default()),
            ..Default::default()
        };

        self.client
            .delete_points(delete_points)
            .await
            .map_err(|e| ExternalError::VectorDbError(e.to_string()))?;

        Ok(())
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_generation() {
        // Plain hostname
        let config = QdrantConfig::default();
        assert_eq!(config.endpoint().unwrap(), "http://localhost:6334");

        // Explicit scheme prefixes
        let config = QdrantConfig {
            host: "http://example.com".to_string(),
            ..QdrantConfig::default()
        };
        assert_eq!(config.endpoint().unwrap(), "http://example.com:6334");

        let config = QdrantConfig {
            host: "https://example.com".to_string(),
            ..QdrantConfig::default()
        };
        assert_eq!(config.endpoint().unwrap(), "https://example.com:6334");
    }

    #[test]
    fn test_cloud_url_overrides_host_and_port() {
        let config = QdrantConfig {
            url: Some("https://cluster.cloud.qdrant.io:6334".to_string()),
            api_key: Some("secret".to_string()),
            ..QdrantConfig::default()
        };
        assert_eq!(
            config.endpoint().unwrap(),
            "https://cluster.cloud.qdrant.io:6334"
        );
    }

    #[test]
    fn test_point_ids_are_stable_per_url() {
        let a = point_id_for_url("https://example.com/cards");
        let b = point_id_for_url("https://example.com/cards");
        let c = point_id_for_url("https://example.com/loans");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
