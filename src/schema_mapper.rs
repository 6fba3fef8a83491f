use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::external::{cosine_similarity, head, ChatCompletion, ChatMessage, Embedder};

/// Industry segment a page belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Industry {
    Banking,
    Ecommerce,
    Insurance,
    General,
}

impl Industry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::Banking => "banking",
            Industry::Ecommerce => "ecommerce",
            Industry::Insurance => "insurance",
            Industry::General => "general",
        }
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Industry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "banking" => Ok(Industry::Banking),
            "ecommerce" => Ok(Industry::Ecommerce),
            "insurance" => Ok(Industry::Insurance),
            "general" => Ok(Industry::General),
            other => Err(format!("unknown industry: {}", other)),
        }
    }
}

const INDUSTRY_KEYWORDS: &[(Industry, &[&str])] = &[
    (
        Industry::Banking,
        &["credit card", "loan", "account", "interest rate", "bank", "deposit", "withdrawal"],
    ),
    (
        Industry::Ecommerce,
        &["product", "price", "buy", "cart", "shipping", "delivery", "review", "rating"],
    ),
    (
        Industry::Insurance,
        &["insurance", "policy", "premium", "coverage", "claim", "motor", "health"],
    ),
];

const SCHEMA_DESCRIPTIONS: &[(&str, &str)] = &[
    ("Product", "A product available for purchase with name, price, brand, description"),
    ("FinancialProduct", "Financial products like credit cards, loans, accounts with fees, interest rates"),
    ("Service", "Services offered by organizations with pricing and terms"),
    ("Offer", "Offers, deals, promotions with prices and conditions"),
    ("Review", "Customer reviews and ratings"),
    ("AggregateRating", "Aggregated ratings and review counts"),
    ("Organization", "Company or organization information"),
    ("WebPage", "Web page content and metadata"),
    ("InsuranceAgency", "Insurance products and policies"),
];

/// Candidate Schema.org types considered for each industry
fn candidate_types(industry: Industry) -> &'static [&'static str] {
    match industry {
        Industry::Banking => &["Product", "FinancialProduct", "Service", "Offer"],
        Industry::Ecommerce => &["Product", "Offer", "Review", "AggregateRating"],
        Industry::Insurance => &["Service", "Product", "Offer", "InsuranceAgency"],
        Industry::General => &["Product", "Service", "Organization", "WebPage"],
    }
}

/// Maps extracted page content onto Schema.org types with embeddings and an LLM
pub struct SchemaMapper {
    llm: Arc<dyn ChatCompletion>,
    embedder: Arc<dyn Embedder>,
    industry_embeddings: Vec<(Industry, Vec<f32>)>,
    schema_embeddings: HashMap<String, Vec<f32>>,
}

impl SchemaMapper {
    /// Build the mapper and precompute industry and schema type embeddings
    pub async fn new(llm: Arc<dyn ChatCompletion>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut industry_embeddings = Vec::new();
        for (industry, keywords) in INDUSTRY_KEYWORDS {
            let vector = embedder.embed(&keywords.join(" ")).await?;
            industry_embeddings.push((*industry, vector));
        }

        let mut schema_embeddings = HashMap::new();
        for (schema_type, description) in SCHEMA_DESCRIPTIONS {
            schema_embeddings.insert((*schema_type).to_string(), embedder.embed(description).await?);
        }

        Ok(Self {
            llm,
            embedder,
            industry_embeddings,
            schema_embeddings,
        })
    }

    /// Classify the industry of the content by embedding similarity
    pub async fn classify_industry(&self, content: &str) -> Result<Industry> {
        let content_embedding = self.embedder.embed(head(content, 1000)).await?;

        let mut best = Industry::General;
        let mut max_similarity = 0.0_f32;

        for (industry, keyword_embedding) in &self.industry_embeddings {
            let similarity = cosine_similarity(&content_embedding, keyword_embedding);
            if similarity > max_similarity {
                max_similarity = similarity;
                best = *industry;
            }
        }

        Ok(best)
    }

    /// Pick the Schema.org type whose description best matches the content
    pub async fn detect_schema_type(&self, content: &str, industry: Industry) -> Result<String> {
        let content_embedding = self.embedder.embed(head(content, 1000)).await?;

        let mut best = "Product".to_string();
        let mut max_similarity = 0.0_f32;

        for schema_type in candidate_types(industry) {
            if let Some(embedding) = self.schema_embeddings.get(*schema_type) {
                let similarity = cosine_similarity(&content_embedding, embedding);
                if similarity > max_similarity {
                    max_similarity = similarity;
                    best = (*schema_type).to_string();
                }
            }
        }

        Ok(best)
    }

    /// Extract structured data for the schema type with the LLM. Failures
    /// degrade to a stub record carrying the error, so a bad LLM response
    /// never aborts a crawl.
    pub async fn extract(&self, text: &str, schema_type: &str) -> Value {
        let prompt = format!(
            "Extract structured data from the following web content and normalize it according to Schema.org {schema_type} schema.\n\n\
            Content:\n{content}\n\n\
            Extract and return a JSON object with the following structure based on Schema.org {schema_type}:\n\
            - Include all relevant properties for {schema_type}\n\
            - Normalize field names to match Schema.org conventions\n\
            - Extract prices, ratings, dates, and other structured data\n\
            - Return only valid JSON, no markdown formatting\n\n\
            Schema.org {schema_type} properties to consider:\n\
            - name, description, brand, price, priceCurrency\n\
            - For FinancialProduct: annualFee, interestRate, rewards, benefits\n\
            - For Product: aggregateRating, reviewCount, availability, offers\n\
            - For Service: serviceType, areaServed, provider\n\
            - For Offer: price, priceCurrency, availability, validFrom, validThrough\n\n\
            Return JSON only:",
            schema_type = schema_type,
            content = head(text, 3000),
        );

        let messages = [
            ChatMessage::system(
                "You are a data extraction expert that extracts structured data according to \
                 Schema.org schemas. Always return valid JSON only.",
            ),
            ChatMessage::user(prompt),
        ];

        let raw = match self.llm.chat_completion(&messages, 0.1, 2000).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, schema_type, "LLM extraction failed");
                return extraction_stub(schema_type, &e.to_string());
            }
        };

        match serde_json::from_str::<Value>(&strip_markdown_fences(&raw)) {
            Ok(Value::Object(mut object)) => {
                object.insert("@type".to_string(), Value::String(schema_type.to_string()));
                object.insert(
                    "@context".to_string(),
                    Value::String("https://schema.org".to_string()),
                );
                Value::Object(object)
            }
            Ok(_) => {
                tracing::warn!(schema_type, "LLM returned JSON that is not an object");
                extraction_stub(schema_type, "LLM response was not a JSON object")
            }
            Err(e) => {
                tracing::warn!(error = %e, schema_type, "Failed to parse LLM response");
                extraction_stub(schema_type, "Failed to parse LLM response")
            }
        }
    }
}

/// Wrap extracted data in a JSON-LD envelope keyed by the page URL
pub fn normalize_to_jsonld(data: &Value, url: &str) -> Value {
    let mut jsonld = Map::new();
    jsonld.insert(
        "@context".to_string(),
        Value::String("https://schema.org".to_string()),
    );

    let schema_type = data.get("@type").and_then(Value::as_str).unwrap_or("Product");
    jsonld.insert("@type".to_string(), Value::String(schema_type.to_string()));
    jsonld.insert("@id".to_string(), Value::String(url.to_string()));

    if let Value::Object(fields) = data {
        for (key, value) in fields {
            if matches!(key.as_str(), "@type" | "@context" | "@id") || value.is_null() {
                continue;
            }
            jsonld.insert(key.clone(), value.clone());
        }
    }

    Value::Object(jsonld)
}

fn strip_markdown_fences(raw: &str) -> String {
    let fence = Regex::new(r"```(?:json)?").unwrap();
    fence.replace_all(raw, "").trim().to_string()
}

fn extraction_stub(schema_type: &str, error: &str) -> Value {
    serde_json::json!({
        "@type": schema_type,
        "@context": "https://schema.org",
        "error": error,
    })
}
