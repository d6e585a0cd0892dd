//! Pluggable AI backend abstraction
//!
//! Backend-agnostic interface for the three LLM touchpoints in the
//! pipeline: vision extraction of receipt images, item classification, and
//! free-text generation (per-item insights, weekly tips).
//!
//! - `AiBackend` trait: the interface every backend implements
//! - `AiClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `MockBackend`
//!
//! Configuration (environment variables):
//! - `AI_BACKEND`: backend to use (ollama, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: default model name (default: llama3.2)
//! - `OLLAMA_VISION_MODEL`: model for receipt extraction (default: llava)

mod mock;
mod ollama;
pub mod parsing;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Category, DigestSummary, ExtractedReceipt};

/// Classification of one item name into the category taxonomy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemClassification {
    pub category: Category,
    /// Model's self-reported confidence, when present
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Trait defining the interface for all AI backends
///
/// Backends are Send + Sync so they can be shared across async tasks.
/// Callers always carry a local fallback; backend errors never propagate
/// past the component that made the call.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Extract structured receipt data from an image
    async fn extract_receipt(
        &self,
        image_data: &[u8],
        filename_hint: &str,
    ) -> Result<ExtractedReceipt>;

    /// Classify an item name into the fixed category taxonomy
    async fn classify_item(&self, item_name: &str) -> Result<ItemClassification>;

    /// Generate a short free-text insight for a single purchased item
    async fn item_insight(
        &self,
        item_name: &str,
        price: f64,
        currency: &str,
        recurring: bool,
    ) -> Result<String>;

    /// Generate a natural-language tip for a weekly digest
    async fn weekly_tip(&self, summary: &DigestSummary) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Model name (for logging)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AiClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AiClient {
    /// Create an AI client from environment variables
    ///
    /// Returns None if the required variables are not set; the pipeline then
    /// runs on local fallbacks only.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AiClient::Ollama),
            "mock" => Some(AiClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AiClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AiClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AiClient::Mock(MockBackend::new())
    }

    /// Create a mock backend whose every call errors (for fallback tests)
    pub fn mock_unhealthy() -> Self {
        AiClient::Mock(MockBackend::unhealthy())
    }
}

#[async_trait]
impl AiBackend for AiClient {
    async fn extract_receipt(
        &self,
        image_data: &[u8],
        filename_hint: &str,
    ) -> Result<ExtractedReceipt> {
        match self {
            AiClient::Ollama(b) => b.extract_receipt(image_data, filename_hint).await,
            AiClient::Mock(b) => b.extract_receipt(image_data, filename_hint).await,
        }
    }

    async fn classify_item(&self, item_name: &str) -> Result<ItemClassification> {
        match self {
            AiClient::Ollama(b) => b.classify_item(item_name).await,
            AiClient::Mock(b) => b.classify_item(item_name).await,
        }
    }

    async fn item_insight(
        &self,
        item_name: &str,
        price: f64,
        currency: &str,
        recurring: bool,
    ) -> Result<String> {
        match self {
            AiClient::Ollama(b) => b.item_insight(item_name, price, currency, recurring).await,
            AiClient::Mock(b) => b.item_insight(item_name, price, currency, recurring).await,
        }
    }

    async fn weekly_tip(&self, summary: &DigestSummary) -> Result<String> {
        match self {
            AiClient::Ollama(b) => b.weekly_tip(summary).await,
            AiClient::Mock(b) => b.weekly_tip(summary).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AiClient::Ollama(b) => b.health_check().await,
            AiClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AiClient::Ollama(b) => b.model(),
            AiClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AiClient::Ollama(b) => b.host(),
            AiClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_client_mock() {
        let client = AiClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = AiClient::mock();
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_classify_item() {
        let client = AiClient::mock();
        let result = client.classify_item("whole milk").await.unwrap();
        assert_eq!(result.category, Category::Groceries);
    }
}
