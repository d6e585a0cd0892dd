//! Ollama backend implementation
//!
//! HTTP client for the Ollama API. Text prompts go through `/api/generate`;
//! receipt extraction sends the image as base64 to a vision model.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{DigestSummary, ExtractedReceipt};

use super::parsing::{parse_classification, parse_extraction, parse_free_text};
use super::{AiBackend, ItemClassification};

const EXTRACTION_PROMPT: &str = r#"You are reading a retail receipt image. Respond with ONLY a JSON object:
{"merchant": string|null, "date": "YYYY-MM-DD"|null, "category": string|null,
 "items": [{"name": string, "price": string|null, "quantity": number|null}],
 "subtotal_amount": string|null, "tax_amount": string|null, "total_amount": string|null,
 "payment_method": string|null, "currency": string|null,
 "currency_evidence": string|null, "notes": string|null}
Keep prices exactly as printed (do not convert decimal separators). If a
currency symbol or code is visible, set currency and describe where you saw
it in currency_evidence."#;

#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    vision_model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            vision_model: "llava".to_string(),
        }
    }

    /// Create a new instance with a different vision model
    pub fn with_vision_model(&self, vision_model: &str) -> Self {
        Self {
            vision_model: vision_model.to_string(),
            ..self.clone()
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        let backend = Self::new(&host, &model);
        Some(match std::env::var("OLLAMA_VISION_MODEL") {
            Ok(vision) => backend.with_vision_model(&vision),
            Err(_) => backend,
        })
    }

    async fn generate(&self, model: &str, prompt: String, images: Vec<String>) -> Result<String> {
        let request = OllamaRequest {
            model: model.to_string(),
            prompt,
            images,
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Http(response.error_for_status().unwrap_err()));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(model = model, "Ollama response: {}", ollama_response.response);
        Ok(ollama_response.response)
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AiBackend for OllamaBackend {
    async fn extract_receipt(
        &self,
        image_data: &[u8],
        filename_hint: &str,
    ) -> Result<ExtractedReceipt> {
        let base64_image = base64::engine::general_purpose::STANDARD.encode(image_data);
        let prompt = format!("{}\nFilename hint: {}", EXTRACTION_PROMPT, filename_hint);

        let response = self
            .generate(&self.vision_model, prompt, vec![base64_image])
            .await?;
        parse_extraction(&response)
    }

    async fn classify_item(&self, item_name: &str) -> Result<ItemClassification> {
        let prompt = format!(
            "Classify this purchased item into exactly one of these categories: \
             groceries, dining, transportation, entertainment, utilities, shopping, \
             health, household, other.\n\
             Item: \"{}\"\n\
             Respond with ONLY JSON: {{\"category\": \"<tag>\", \"confidence\": <0-1>}}",
            item_name
        );

        let response = self.generate(&self.model, prompt, vec![]).await?;
        parse_classification(&response)
    }

    async fn item_insight(
        &self,
        item_name: &str,
        price: f64,
        currency: &str,
        recurring: bool,
    ) -> Result<String> {
        let recurring_note = if recurring {
            "This item recurs in the buyer's history."
        } else {
            "This is not a recurring purchase."
        };
        let prompt = format!(
            "Write one short, practical money-saving observation (max 25 words) \
             about this purchase. {}\n\
             Item: {} at {:.2} {}\n\
             Respond with the sentence only, no JSON, no preamble.",
            recurring_note, item_name, price, currency
        );

        let response = self.generate(&self.model, prompt, vec![]).await?;
        parse_free_text(&response)
    }

    async fn weekly_tip(&self, summary: &DigestSummary) -> Result<String> {
        let top = summary
            .top_categories
            .iter()
            .map(|c| format!("{} ({:.0}%)", c.category, c.percent_of_total))
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "Write one encouraging, specific budgeting tip (max 30 words) for a \
             user whose week looked like this:\n\
             Total spend: {:.2}\nTop categories: {}\n\
             Budgets exceeded: {}\nRecurring items flagged: {}\n\
             Respond with the tip only, no JSON, no preamble.",
            summary.total_spend,
            if top.is_empty() { "none" } else { &top },
            summary.overspent_count,
            summary.recurring_count
        );

        let response = self.generate(&self.model, prompt, vec![]).await?;
        parse_free_text(&response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
    }

    #[test]
    fn test_vision_model_override() {
        let backend =
            OllamaBackend::new("http://localhost:11434", "llama3.2").with_vision_model("moondream");
        assert_eq!(backend.vision_model, "moondream");
        assert_eq!(backend.model(), "llama3.2");
    }
}
