//! Mock backend for testing
//!
//! Returns predictable responses for all AI operations. The unhealthy
//! variant errors on every call, which is how fallback paths are exercised
//! in tests.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Category, DigestSummary, ExtractedItem, ExtractedReceipt};

use super::{AiBackend, ItemClassification};

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// When false, every operation returns an error
    pub healthy: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self { healthy: true }
    }

    /// Create a mock backend whose every call fails
    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }

    fn check(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(Error::InvalidData("mock backend is unhealthy".into()))
        }
    }
}

#[async_trait]
impl AiBackend for MockBackend {
    async fn extract_receipt(
        &self,
        _image_data: &[u8],
        _filename_hint: &str,
    ) -> Result<ExtractedReceipt> {
        self.check()?;
        Ok(ExtractedReceipt {
            merchant: Some("Mock Mart".to_string()),
            date: Some("2024-01-15".to_string()),
            items: vec![
                ExtractedItem {
                    name: "Milk".to_string(),
                    price: Some("3.50".to_string()),
                    quantity: None,
                },
                ExtractedItem {
                    name: "Bread".to_string(),
                    price: Some("2.25".to_string()),
                    quantity: Some(2.0),
                },
            ],
            subtotal_amount: Some("8.00".to_string()),
            tax_amount: Some("0.64".to_string()),
            total_amount: Some("8.64".to_string()),
            currency: Some("USD".to_string()),
            currency_evidence: Some("$ symbol on totals".to_string()),
            ..Default::default()
        })
    }

    async fn classify_item(&self, item_name: &str) -> Result<ItemClassification> {
        self.check()?;
        let lower = item_name.to_lowercase();
        let category = if lower.contains("milk") || lower.contains("bread") || lower.contains("egg")
        {
            Category::Groceries
        } else if lower.contains("uber") || lower.contains("taxi") {
            Category::Transportation
        } else if lower.contains("pizza") || lower.contains("coffee") {
            Category::Dining
        } else if lower.contains("netflix") || lower.contains("cinema") {
            Category::Entertainment
        } else if lower.contains("soap") || lower.contains("detergent") {
            Category::Household
        } else {
            Category::Other
        };

        Ok(ItemClassification {
            category,
            confidence: Some(0.9),
        })
    }

    async fn item_insight(
        &self,
        item_name: &str,
        price: f64,
        currency: &str,
        recurring: bool,
    ) -> Result<String> {
        self.check()?;
        Ok(if recurring {
            format!(
                "You buy {} regularly; a larger pack could beat {:.2} {} per purchase.",
                item_name, price, currency
            )
        } else {
            format!("{} cost {:.2} {} this time.", item_name, price, currency)
        })
    }

    async fn weekly_tip(&self, summary: &DigestSummary) -> Result<String> {
        self.check()?;
        Ok(format!(
            "You spent {:.2} this week; keeping an eye on your top category would go a long way.",
            summary.total_spend
        ))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_classify_item() {
        let mock = MockBackend::new();
        let result = mock.classify_item("Whole Milk").await.unwrap();
        assert_eq!(result.category, Category::Groceries);
    }

    #[tokio::test]
    async fn test_mock_extract_receipt() {
        let mock = MockBackend::new();
        let receipt = mock.extract_receipt(b"fake-bytes", "receipt.jpg").await.unwrap();
        assert_eq!(receipt.merchant.as_deref(), Some("Mock Mart"));
        assert_eq!(receipt.items.len(), 2);
    }

    #[tokio::test]
    async fn test_unhealthy_mock_errors_everywhere() {
        let mock = MockBackend::unhealthy();
        assert!(!mock.health_check().await);
        assert!(mock.classify_item("milk").await.is_err());
        assert!(mock.item_insight("milk", 3.5, "USD", false).await.is_err());
        assert!(mock.extract_receipt(b"x", "a.jpg").await.is_err());
    }
}
