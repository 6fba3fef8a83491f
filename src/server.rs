use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::crawler::WebCrawler;
use crate::rag::{ComparisonAnswer, RagAnswer, RagPipeline};
use crate::schema_mapper::{normalize_to_jsonld, SchemaMapper};
use crate::storage::{
    NewPage, PageRecord, SimilarPage, SimilaritySearch, StorageManager, StorageStats,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub crawler: Arc<WebCrawler>,
    pub mapper: Arc<SchemaMapper>,
    pub storage: Arc<StorageManager>,
    pub rag: Arc<RagPipeline>,
}

/// Error envelope returned by every handler
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = %e, "Request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

/// Fetch failures are the caller's problem, everything else is ours
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Failed to crawl URL: {0}")]
    Fetch(anyhow::Error),
    #[error("{0}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for CrawlError {
    fn from(e: anyhow::Error) -> Self {
        CrawlError::Internal(e)
    }
}

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub url: String,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct CrawlResponse {
    pub success: bool,
    pub url: String,
    pub page_id: Option<Uuid>,
    pub industry: Option<String>,
    pub schema_type: Option<String>,
    pub extracted_data: Option<Value>,
    pub jsonld: Option<Value>,
    pub error: Option<String>,
}

impl CrawlResponse {
    fn from_record(record: PageRecord) -> Self {
        Self {
            success: true,
            url: record.url,
            page_id: Some(record.id),
            industry: record.industry,
            schema_type: record.schema_type,
            jsonld: Some(record.extracted_data.clone()),
            extracted_data: Some(record.extracted_data),
            error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: u64,
}

fn default_search_limit() -> u64 {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SimilarPage>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RagRequest {
    pub query: String,
    pub industry: Option<String>,
    #[serde(default = "default_true")]
    pub include_sources: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct IndustryParams {
    #[serde(default = "default_industry_limit")]
    pub limit: i64,
}

fn default_industry_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct IndustryResponse {
    pub industry: String,
    pub count: usize,
    pub results: Vec<PageRecord>,
}

/// Full crawl pipeline: fetch, classify, extract, normalize, persist.
/// Shared by the POST /crawl handler and the one-shot CLI command.
pub async fn run_crawl(
    state: &AppState,
    url: &str,
    force_refresh: bool,
) -> Result<CrawlResponse, CrawlError> {
    if !force_refresh {
        if let Some(existing) = state.storage.get_by_url(url).await? {
            tracing::debug!(url, "Serving previously crawled page");
            return Ok(CrawlResponse::from_record(existing));
        }
    }

    let page = match state.crawler.crawl(url).await {
        Ok(page) => page,
        Err(e) => {
            state.storage.record_failure(url, &e.to_string()).await?;
            return Err(CrawlError::Fetch(e));
        }
    };

    let industry = state.mapper.classify_industry(&page.text).await?;
    let schema_type = state.mapper.detect_schema_type(&page.text, industry).await?;
    let extracted_data = state.mapper.extract(&page.text, &schema_type).await;
    let jsonld = normalize_to_jsonld(&extracted_data, url);

    let record = NewPage {
        url: url.to_string(),
        title: page.metadata.title.clone(),
        description: page.metadata.description.clone(),
        industry: industry.to_string(),
        schema_type: schema_type.clone(),
        extracted_data: extracted_data.clone(),
        metadata: serde_json::to_value(&page.metadata).map_err(anyhow::Error::from)?,
        text: page.text,
    };
    let page_id = state.storage.save_page(&record).await?;

    tracing::info!(url, %industry, %schema_type, "Crawled and stored page");

    Ok(CrawlResponse {
        success: true,
        url: url.to_string(),
        page_id: Some(page_id),
        industry: Some(industry.to_string()),
        schema_type: Some(schema_type),
        extracted_data: Some(extracted_data),
        jsonld: Some(jsonld),
        error: None,
    })
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "schema_crawler API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /crawl": "Crawl and extract data from a URL",
            "GET /crawl/{url}": "Get crawled data by URL",
            "POST /search": "Search for similar content",
            "GET /industry/{industry}": "Get all pages by industry",
            "GET /stats": "Crawling statistics",
            "POST /rag/query": "RAG: Ask questions based on crawled data",
            "POST /rag/compare": "RAG: Compare products/services",
            "GET /health": "Health check",
        }
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    database: String,
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.storage.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                database: "ok".to_string(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                database: e.to_string(),
            }),
        ),
    }
}

async fn crawl_handler(
    State(state): State<AppState>,
    Json(request): Json<CrawlRequest>,
) -> Result<Json<CrawlResponse>, ApiError> {
    match run_crawl(&state, &request.url, request.force_refresh).await {
        Ok(response) => Ok(Json(response)),
        Err(CrawlError::Fetch(e)) => {
            Err(ApiError::bad_request(format!("Failed to crawl URL: {}", e)))
        }
        Err(CrawlError::Internal(e)) => Err(ApiError::from(e)),
    }
}

async fn get_crawled_handler(
    State(state): State<AppState>,
    Path(url): Path<String>,
) -> Result<Json<CrawlResponse>, ApiError> {
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url
    } else {
        format!("https://{}", url)
    };

    let record = state
        .storage
        .get_by_url(&url)
        .await?
        .ok_or_else(|| ApiError::not_found("URL not found in database"))?;

    Ok(Json(CrawlResponse::from_record(record)))
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = state
        .storage
        .search_similar(&request.query, request.limit)
        .await?;

    Ok(Json(SearchResponse {
        count: results.len(),
        results,
    }))
}

async fn industry_handler(
    State(state): State<AppState>,
    Path(industry): Path<String>,
    Query(params): Query<IndustryParams>,
) -> Result<Json<IndustryResponse>, ApiError> {
    let results = state.storage.get_by_industry(&industry, params.limit).await?;

    Ok(Json(IndustryResponse {
        industry,
        count: results.len(),
        results,
    }))
}

async fn stats_handler(State(state): State<AppState>) -> Result<Json<StorageStats>, ApiError> {
    Ok(Json(state.storage.stats().await?))
}

async fn rag_query_handler(
    State(state): State<AppState>,
    Json(request): Json<RagRequest>,
) -> Result<Json<RagAnswer>, ApiError> {
    let answer = state
        .rag
        .answer(&request.query, request.industry.as_deref(), request.include_sources)
        .await?;

    Ok(Json(answer))
}

async fn rag_compare_handler(
    State(state): State<AppState>,
    Json(request): Json<RagRequest>,
) -> Result<Json<ComparisonAnswer>, ApiError> {
    let answer = state
        .rag
        .compare(&request.query, request.industry.as_deref())
        .await?;

    Ok(Json(answer))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/crawl", post(crawl_handler))
        .route("/crawl/*url", get(get_crawled_handler))
        .route("/search", post(search_handler))
        .route("/industry/:industry", get(industry_handler))
        .route("/stats", get(stats_handler))
        .route("/rag/query", post(rag_query_handler))
        .route("/rag/compare", post(rag_compare_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr, "API server listening");

    axum::serve(listener, build_router(state))
        .await
        .context("Server error")?;
    Ok(())
}
