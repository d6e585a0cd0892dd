//! JSON parsing helpers for AI backend responses
//!
//! Model responses often wrap the JSON payload in prose. These helpers pull
//! out the first balanced JSON object and deserialize it; malformed output
//! becomes `Error::InvalidData` so callers can fall back instead of crashing.

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::{Category, ExtractedReceipt};

use super::ItemClassification;

/// Slice out the first balanced `{...}` object in a response
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0;
    for (i, c) in response[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate_for_error(s: &str) -> String {
    if s.len() > 200 {
        format!("{}...", &s[..200])
    } else {
        s.to_string()
    }
}

/// Parse an extracted receipt from an AI response
pub fn parse_extraction(response: &str) -> Result<ExtractedReceipt> {
    let json_str = extract_json(response.trim()).ok_or_else(|| {
        Error::InvalidData(format!(
            "No JSON found in AI extraction response | Raw: {}",
            truncate_for_error(response)
        ))
    })?;
    serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid extraction JSON from AI: {} | Raw: {}",
            e,
            truncate_for_error(json_str)
        ))
    })
}

/// Raw classification response from AI (category as free text)
#[derive(Debug, serde::Deserialize)]
struct ClassificationResponse {
    category: String,
    confidence: Option<f64>,
}

/// Parse an item classification from an AI response
///
/// A category outside the taxonomy is invalid data; the categorizer then
/// falls back to its keyword table.
pub fn parse_classification(response: &str) -> Result<ItemClassification> {
    let json_str = extract_json(response.trim()).ok_or_else(|| {
        Error::InvalidData(format!(
            "No JSON found in AI classification response | Raw: {}",
            truncate_for_error(response)
        ))
    })?;
    let raw: ClassificationResponse = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid classification JSON from AI: {} | Raw: {}",
            e,
            truncate_for_error(json_str)
        ))
    })?;

    let category = Category::from_str(&raw.category)
        .map_err(|e| Error::InvalidData(format!("Classification outside taxonomy: {}", e)))?;

    Ok(ItemClassification {
        category,
        confidence: raw.confidence,
    })
}

/// Parse free text from an AI response, stripping whitespace and quotes
///
/// Insight and tip prompts ask for plain text; some models still quote or
/// pad their answer.
pub fn parse_free_text(response: &str) -> Result<String> {
    let text = response.trim().trim_matches('"').trim();
    if text.is_empty() {
        return Err(Error::InvalidData("Empty AI text response".into()));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classification() {
        let response = r#"{"category": "groceries", "confidence": 0.92}"#;
        let result = parse_classification(response).unwrap();
        assert_eq!(result.category, Category::Groceries);
        assert_eq!(result.confidence, Some(0.92));
    }

    #[test]
    fn test_parse_classification_with_prose() {
        let response = r#"Sure! Here's the classification:
{"category": "dining"}
Hope that helps."#;
        let result = parse_classification(response).unwrap();
        assert_eq!(result.category, Category::Dining);
    }

    #[test]
    fn test_parse_classification_outside_taxonomy() {
        let response = r#"{"category": "cryptocurrency"}"#;
        assert!(parse_classification(response).is_err());
    }

    #[test]
    fn test_parse_classification_no_json() {
        assert!(parse_classification("I can't classify that.").is_err());
    }

    #[test]
    fn test_parse_extraction() {
        let response = r#"{
            "merchant": "Tesco Express",
            "date": "2024-03-02",
            "items": [
                {"name": "Milk", "price": "1.20"},
                {"name": "Bread", "price": "0.95", "quantity": 2}
            ],
            "total_amount": "3.10",
            "currency": null,
            "notes": "London branch"
        }"#;
        let receipt = parse_extraction(response).unwrap();
        assert_eq!(receipt.merchant.as_deref(), Some("Tesco Express"));
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[1].quantity, Some(2.0));
        assert!(receipt.currency.is_none());
    }

    #[test]
    fn test_parse_extraction_nested_braces() {
        let response = r#"The receipt: {"merchant": "A", "items": [], "notes": "{weird}"} done"#;
        let receipt = parse_extraction(response).unwrap();
        assert_eq!(receipt.merchant.as_deref(), Some("A"));
    }

    #[test]
    fn test_parse_free_text() {
        assert_eq!(
            parse_free_text("\"Buy store-brand milk to save.\"").unwrap(),
            "Buy store-brand milk to save."
        );
        assert!(parse_free_text("   ").is_err());
    }
}
