use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mockall::mock;

use schema_crawler::external::{ChatCompletion, ChatMessage, Embedder};
use schema_crawler::schema_mapper::{Industry, SchemaMapper};

mock! {
    pub Llm {}

    #[async_trait]
    impl ChatCompletion for Llm {
        async fn chat_completion(&self, messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Result<String>;
        fn provider(&self) -> String;
    }
}

mock! {
    pub Embed {}

    #[async_trait]
    impl Embedder for Embed {
        async fn embed(&self, text: &str) -> Result<Vec<f32>>;
        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
        fn dimension(&self) -> usize;
    }
}

/// Deterministic stand-in for the embedding model: texts about the same
/// topic land on the same axis, so cosine similarity is 1 within a topic
/// and 0 across topics.
fn direction_for(text: &str) -> Vec<f32> {
    let t = text.to_lowercase();
    if t.contains("credit card") || t.contains("interest rate") || t.contains("loan") {
        vec![1.0, 0.0, 0.0, 0.0]
    } else if t.contains("insurance") || t.contains("premium") {
        vec![0.0, 1.0, 0.0, 0.0]
    } else if t.contains("cart") || t.contains("shipping") {
        vec![0.0, 0.0, 1.0, 0.0]
    } else {
        vec![0.0, 0.0, 0.0, 1.0]
    }
}

fn fake_embedder() -> MockEmbed {
    let mut embedder = MockEmbed::new();
    embedder.expect_embed().returning(|text| Ok(direction_for(text)));
    embedder
}

async fn mapper_with_llm(llm: MockLlm) -> SchemaMapper {
    SchemaMapper::new(Arc::new(llm), Arc::new(fake_embedder()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_classify_industry_by_similarity() {
    let mapper = mapper_with_llm(MockLlm::new()).await;

    let industry = mapper
        .classify_industry("Apply for a credit card with a great interest rate today")
        .await
        .unwrap();
    assert_eq!(industry, Industry::Banking);

    let industry = mapper
        .classify_industry("Comprehensive motor insurance with a low monthly premium")
        .await
        .unwrap();
    assert_eq!(industry, Industry::Insurance);

    let industry = mapper
        .classify_industry("Free shipping on every cart over fifty dollars")
        .await
        .unwrap();
    assert_eq!(industry, Industry::Ecommerce);
}

#[tokio::test]
async fn test_classify_industry_defaults_to_general() {
    let mapper = mapper_with_llm(MockLlm::new()).await;

    let industry = mapper
        .classify_industry("A quiet essay about mountain hiking")
        .await
        .unwrap();
    assert_eq!(industry, Industry::General);
}

#[tokio::test]
async fn test_detect_schema_type_prefers_matching_description() {
    let mapper = mapper_with_llm(MockLlm::new()).await;

    let schema_type = mapper
        .detect_schema_type(
            "Apply for a credit card with a great interest rate today",
            Industry::Banking,
        )
        .await
        .unwrap();
    assert_eq!(schema_type, "FinancialProduct");
}

#[tokio::test]
async fn test_detect_schema_type_falls_back_to_product() {
    let mapper = mapper_with_llm(MockLlm::new()).await;

    let schema_type = mapper
        .detect_schema_type("A quiet essay about mountain hiking", Industry::General)
        .await
        .unwrap();
    assert_eq!(schema_type, "Product");
}

#[tokio::test]
async fn test_extract_parses_fenced_llm_output() {
    let mut llm = MockLlm::new();
    llm.expect_chat_completion()
        .withf(|messages, temperature, _| {
            messages.len() == 2
                && messages[0].role == "system"
                && messages[1].content.contains("FinancialProduct")
                && *temperature < 0.2
        })
        .times(1)
        .returning(|_, _, _| {
            Ok("```json\n{\"name\": \"Platinum Card\", \"annualFee\": \"95 USD\"}\n```".to_string())
        });

    let mapper = mapper_with_llm(llm).await;
    let extracted = mapper.extract("Platinum card content", "FinancialProduct").await;

    assert_eq!(extracted["@type"], "FinancialProduct");
    assert_eq!(extracted["@context"], "https://schema.org");
    assert_eq!(extracted["name"], "Platinum Card");
    assert_eq!(extracted["annualFee"], "95 USD");
    assert!(extracted.get("error").is_none());
}

#[tokio::test]
async fn test_extract_degrades_to_stub_on_unparseable_output() {
    let mut llm = MockLlm::new();
    llm.expect_chat_completion()
        .times(1)
        .returning(|_, _, _| Ok("I could not produce JSON, sorry.".to_string()));

    let mapper = mapper_with_llm(llm).await;
    let extracted = mapper.extract("some content", "Product").await;

    assert_eq!(extracted["@type"], "Product");
    assert_eq!(extracted["error"], "Failed to parse LLM response");
}

#[tokio::test]
async fn test_extract_degrades_to_stub_on_llm_failure() {
    let mut llm = MockLlm::new();
    llm.expect_chat_completion()
        .times(1)
        .returning(|_, _, _| Err(anyhow!("rate limited")));

    let mapper = mapper_with_llm(llm).await;
    let extracted = mapper.extract("some content", "Service").await;

    assert_eq!(extracted["@type"], "Service");
    assert!(extracted["error"].as_str().unwrap().contains("rate limited"));
}
