use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::external::{ChatCompletion, ChatMessage};
use crate::storage::{SimilarPage, SimilaritySearch};

const ANSWER_SYSTEM_PROMPT: &str = "You are an intelligent assistant that answers questions based on the provided context from crawled web pages.\n\
The context contains structured data extracted from various websites using Schema.org schemas.\n\
Answer the user's question accurately using only the information provided in the context.\n\
If the context doesn't contain enough information, say so clearly.\n\
Always cite sources when providing specific information.";

const COMPARISON_SYSTEM_PROMPT: &str = "You are a comparison expert. Compare the provided items based on the user's query.\n\
Highlight similarities, differences, advantages, and disadvantages.\n\
Present the comparison in a clear, structured format.";

/// Where an answer came from
#[derive(Debug, Clone, Serialize)]
pub struct RagSource {
    pub url: String,
    pub title: Option<String>,
    pub industry: Option<String>,
    pub schema_type: Option<String>,
    pub similarity_score: f32,
}

impl From<&SimilarPage> for RagSource {
    fn from(item: &SimilarPage) -> Self {
        Self {
            url: item.page.url.clone(),
            title: item.page.title.clone(),
            industry: item.page.industry.clone(),
            schema_type: item.page.schema_type.clone(),
            similarity_score: item.similarity_score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub query: String,
    pub model: Option<String>,
    pub sources: Option<Vec<RagSource>>,
    pub sources_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonAnswer {
    pub answer: String,
    pub query: String,
    pub items_compared: usize,
    pub sources: Vec<RagSource>,
}

/// Retrieval-augmented answering over the crawled corpus
pub struct RagPipeline {
    llm: Arc<dyn ChatCompletion>,
    retrieval: Arc<dyn SimilaritySearch>,
    max_context_items: u64,
}

impl RagPipeline {
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        retrieval: Arc<dyn SimilaritySearch>,
        max_context_items: u64,
    ) -> Self {
        Self {
            llm,
            retrieval,
            max_context_items,
        }
    }

    async fn retrieve(&self, query: &str, industry: Option<&str>) -> Result<Vec<SimilarPage>> {
        let mut results = self
            .retrieval
            .search_similar(query, self.max_context_items)
            .await?;

        if let Some(industry) = industry {
            results.retain(|r| r.page.industry.as_deref() == Some(industry));
        }

        Ok(results)
    }

    /// Numbered document blocks the LLM can cite by index
    fn format_context(items: &[SimilarPage]) -> String {
        let mut parts = Vec::new();

        for (i, item) in items.iter().enumerate() {
            let mut block = format!("\n[Document {}]\n", i + 1);
            block.push_str(&format!("URL: {}\n", item.page.url));
            block.push_str(&format!(
                "Title: {}\n",
                item.page.title.as_deref().unwrap_or("N/A")
            ));
            block.push_str(&format!(
                "Industry: {}\n",
                item.page.industry.as_deref().unwrap_or("N/A")
            ));
            block.push_str(&format!(
                "Schema Type: {}\n",
                item.page.schema_type.as_deref().unwrap_or("N/A")
            ));

            if let Value::Object(fields) = &item.page.extracted_data {
                if !fields.is_empty() {
                    block.push_str("Data:\n");
                    for (key, value) in fields {
                        if matches!(key.as_str(), "@type" | "@context" | "@id") || value.is_null() {
                            continue;
                        }
                        block.push_str(&format!("  - {}: {}\n", key, value));
                    }
                }
            }

            parts.push(block);
        }

        parts.join("\n")
    }

    /// Retrieve context and generate an answer
    pub async fn answer(
        &self,
        query: &str,
        industry: Option<&str>,
        include_sources: bool,
    ) -> Result<RagAnswer> {
        let retrieved = self.retrieve(query, industry).await?;

        if retrieved.is_empty() {
            return Ok(RagAnswer {
                answer: "No relevant information found in the crawled data.".to_string(),
                query: query.to_string(),
                model: None,
                sources: Some(Vec::new()),
                sources_count: Some(0),
            });
        }

        let context = Self::format_context(&retrieved);
        let user_prompt = format!(
            "Context from crawled web pages:\n{}\n\n\
            Question: {}\n\n\
            Please provide a comprehensive answer based on the context above. \
            If you reference specific information, mention which document it came from.",
            context, query
        );

        let messages = [
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];
        let answer = self.llm.chat_completion(&messages, 0.3, 1500).await?;

        let sources: Option<Vec<RagSource>> =
            include_sources.then(|| retrieved.iter().map(RagSource::from).collect());
        let sources_count = sources.as_ref().map(Vec::len);

        Ok(RagAnswer {
            answer,
            query: query.to_string(),
            model: Some(self.llm.provider()),
            sources,
            sources_count,
        })
    }

    /// Compare retrieved items; needs at least two matches to be meaningful
    pub async fn compare(&self, query: &str, industry: Option<&str>) -> Result<ComparisonAnswer> {
        let retrieved = self.retrieve(query, industry).await?;

        if retrieved.len() < 2 {
            return Ok(ComparisonAnswer {
                answer: "Need at least 2 items to compare. Found fewer items in database."
                    .to_string(),
                query: query.to_string(),
                items_compared: retrieved.len(),
                sources: retrieved.iter().map(RagSource::from).collect(),
            });
        }

        let candidates = &retrieved[..retrieved.len().min(5)];

        let mut context = String::from("Compare the following items:\n\n");
        for (i, item) in candidates.iter().enumerate() {
            context.push_str(&format!(
                "Item {}: {}\n",
                i + 1,
                item.page.title.as_deref().unwrap_or("N/A")
            ));
            context.push_str(&format!("URL: {}\n", item.page.url));
            context.push_str(&format!(
                "Data: {}\n\n",
                serde_json::to_string_pretty(&item.page.extracted_data)?
            ));
        }

        let user_prompt = format!(
            "{}\nUser Query: {}\n\nProvide a detailed comparison of the items above.",
            context, query
        );
        let messages = [
            ChatMessage::system(COMPARISON_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];
        let answer = self.llm.chat_completion(&messages, 0.3, 2000).await?;

        Ok(ComparisonAnswer {
            answer,
            query: query.to_string(),
            items_compared: candidates.len(),
            sources: candidates.iter().map(RagSource::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PageRecord;
    use chrono::Utc;
    use uuid::Uuid;

    fn similar_page(url: &str, industry: Option<&str>, data: Value) -> SimilarPage {
        SimilarPage {
            page: PageRecord {
                id: Uuid::new_v4(),
                url: url.to_string(),
                title: Some("Platinum Card".to_string()),
                description: None,
                industry: industry.map(str::to_string),
                schema_type: Some("FinancialProduct".to_string()),
                extracted_data: data,
                metadata: Value::Null,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            similarity_score: 0.9,
        }
    }

    #[test]
    fn test_format_context_numbers_documents() {
        let items = vec![
            similar_page(
                "https://a.example",
                Some("banking"),
                serde_json::json!({"@type": "FinancialProduct", "annualFee": "95 USD"}),
            ),
            similar_page("https://b.example", None, Value::Null),
        ];

        let context = RagPipeline::format_context(&items);

        assert!(context.contains("[Document 1]"));
        assert!(context.contains("[Document 2]"));
        assert!(context.contains("URL: https://a.example"));
        assert!(context.contains("Industry: banking"));
        // Missing industry falls back to N/A
        assert!(context.contains("Industry: N/A"));
        // Extracted fields are listed, JSON-LD markers are not
        assert!(context.contains("annualFee"));
        assert!(!context.contains("@type"));
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(RagPipeline::format_context(&[]), "");
    }
}
