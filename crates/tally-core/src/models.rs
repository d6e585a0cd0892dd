//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Insight processing status of a receipt (and of individual insight items)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsightStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for InsightStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown insight status: {}", s)),
        }
    }
}

impl std::fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed item category taxonomy (closed set, lowercase tags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Groceries,
    Dining,
    Transportation,
    Entertainment,
    Utilities,
    Shopping,
    Health,
    Household,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "groceries",
            Self::Dining => "dining",
            Self::Transportation => "transportation",
            Self::Entertainment => "entertainment",
            Self::Utilities => "utilities",
            Self::Shopping => "shopping",
            Self::Health => "health",
            Self::Household => "household",
            Self::Other => "other",
        }
    }

    /// All categories, in display order
    pub fn all() -> &'static [Category] {
        &[
            Self::Groceries,
            Self::Dining,
            Self::Transportation,
            Self::Entertainment,
            Self::Utilities,
            Self::Shopping,
            Self::Health,
            Self::Household,
            Self::Other,
        ]
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groceries" | "grocery" => Ok(Self::Groceries),
            "dining" | "restaurant" | "food" => Ok(Self::Dining),
            "transportation" | "transport" => Ok(Self::Transportation),
            "entertainment" => Ok(Self::Entertainment),
            "utilities" | "utility" => Ok(Self::Utilities),
            "shopping" => Ok(Self::Shopping),
            "health" | "healthcare" => Ok(Self::Health),
            "household" => Ok(Self::Household),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Budget utilization status for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Normal,
    Warning,
    Exceeded,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Exceeded => "exceeded",
        }
    }

    /// Classify a utilization percentage
    pub fn from_percent(percent_used: f64) -> Self {
        if percent_used >= 100.0 {
            Self::Exceeded
        } else if percent_used >= 80.0 {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Price trend relative to the previous observation of the same item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        }
    }
}

impl std::str::FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "stable" => Ok(Self::Stable),
            _ => Err(format!("Unknown trend: {}", s)),
        }
    }
}

/// A stored receipt with its embedded line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub user_id: String,
    pub merchant: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    /// Receipt-level category hint from extraction (free text, not the item taxonomy)
    pub category: Option<String>,
    pub items: Vec<ReceiptItem>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    /// Standardized ISO 4217 code
    pub currency: String,
    /// Human-readable signal that produced the currency decision
    pub currency_evidence: String,
    /// Confidence in [0, 1]; below 0.7 is flagged for user review
    pub currency_confidence: f64,
    pub insight_status: InsightStatus,
    pub created_at: DateTime<Utc>,
}

impl Receipt {
    /// Whether the currency decision should be surfaced for user review
    pub fn currency_needs_review(&self) -> bool {
        self.currency_confidence < 0.7
    }
}

/// A line item embedded in a receipt
///
/// The optional fields are filled in by the insight orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub price: f64,
    pub quantity: f64,
    pub category: Option<Category>,
    pub recurring: Option<bool>,
    pub insight: Option<String>,
    pub market_price: Option<f64>,
    pub savings_estimate: Option<f64>,
}

impl ReceiptItem {
    pub fn new(name: &str, price: f64) -> Self {
        Self {
            name: name.to_string(),
            price,
            quantity: 1.0,
            category: None,
            recurring: None,
            insight: None,
            market_price: None,
            savings_estimate: None,
        }
    }

    /// Spend attributed to this line (price times quantity)
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity
    }
}

/// A detached, queryable record of one categorization/insight event
///
/// Created once per item during orchestration; never mutated afterwards
/// except for status correction on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightItem {
    pub id: i64,
    pub user_id: String,
    pub receipt_id: i64,
    pub item_name: String,
    pub item_price: f64,
    pub category: Category,
    pub recurring: bool,
    pub insight: Option<String>,
    pub status: InsightStatus,
    pub detected_at: DateTime<Utc>,
}

/// A new insight item to be persisted
#[derive(Debug, Clone)]
pub struct NewInsightItem {
    pub user_id: String,
    pub receipt_id: i64,
    pub item_name: String,
    pub item_price: f64,
    pub category: Category,
    pub recurring: bool,
    pub insight: Option<String>,
    pub status: InsightStatus,
}

/// One category's monthly budget within a user's config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBudget {
    pub id: i64,
    /// Category name, unique per config (case-insensitive)
    pub category: String,
    pub monthly_limit: f64,
    pub current_spend: f64,
    /// Set once the 80% threshold notification has fired this month
    pub notified_80: bool,
    /// Set once the 100% threshold notification has fired this month
    pub notified_100: bool,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl CategoryBudget {
    pub fn percent_used(&self) -> f64 {
        if self.monthly_limit <= 0.0 {
            return 0.0;
        }
        self.current_spend / self.monthly_limit * 100.0
    }
}

/// A user's budget configuration
///
/// Lazily created with an empty budget list on first access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub id: i64,
    pub user_id: String,
    pub categories: Vec<CategoryBudget>,
    pub notifications_enabled: bool,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub last_summary_sent_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in the digest's top-category ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopCategory {
    pub category: Category,
    pub amount: f64,
    pub percent_of_total: f64,
}

/// A category whose windowed spend exceeded its configured monthly limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverspentCategory {
    pub category: String,
    pub spent: f64,
    pub limit: f64,
}

/// A recurring item called out in a weekly digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringAlert {
    pub item_name: String,
    pub occurrences: usize,
    pub suggestion: String,
}

/// One user's weekly rollup; immutable after creation except send status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyDigest {
    pub id: i64,
    pub user_id: String,
    pub week_start: NaiveDate,
    pub total_spend: f64,
    pub top_categories: Vec<TopCategory>,
    pub overspent: Vec<OverspentCategory>,
    pub recurring_alerts: Vec<RecurringAlert>,
    pub tip: String,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only price observation for an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    pub id: i64,
    pub user_id: String,
    pub item_name: String,
    pub price: f64,
    pub merchant: Option<String>,
    pub category: Category,
    pub currency: String,
    pub trend: Trend,
    pub percent_change: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Raw receipt shape returned by the vision/LLM extraction service
///
/// Every field may be null or absent; prices arrive as raw strings in
/// whatever format the model read off the image ("12,50", "1.299", "8").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedReceipt {
    pub merchant: Option<String>,
    pub date: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
    pub subtotal_amount: Option<String>,
    pub tax_amount: Option<String>,
    pub total_amount: Option<String>,
    pub payment_method: Option<String>,
    pub currency: Option<String>,
    pub currency_evidence: Option<String>,
    pub notes: Option<String>,
}

/// One extracted line item (raw)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub name: String,
    /// Raw price text as read off the receipt
    pub price: Option<String>,
    pub quantity: Option<f64>,
}

impl ExtractedItem {
    /// Parse the raw price text into a number, tolerating both decimal
    /// separator conventions. Returns None when the text is absent or
    /// unparseable.
    pub fn parsed_price(&self) -> Option<f64> {
        parse_price_text(self.price.as_deref()?)
    }
}

/// Parse raw price text ("12,50", "1.299,00", "$4.75") into a number
pub fn parse_price_text(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    // Strip anything that is not a digit or separator (currency symbols etc.)
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();

    // "12,50" -> comma decimal; "1.299,00" -> thousands + comma decimal
    let normalized = if cleaned.contains(',') && !cleaned.contains('.') {
        cleaned.replace(',', ".")
    } else if cleaned.contains(',') && cleaned.contains('.') {
        if cleaned.rfind(',') > cleaned.rfind('.') {
            cleaned.replace('.', "").replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else {
        cleaned
    };

    normalized.parse().ok()
}

/// A weekly-summary snapshot handed to the AI backend for tip generation
#[derive(Debug, Clone, Serialize)]
pub struct DigestSummary {
    pub total_spend: f64,
    pub top_categories: Vec<TopCategory>,
    pub overspent_count: usize,
    pub recurring_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_insight_status_round_trip() {
        for status in [
            InsightStatus::Pending,
            InsightStatus::Processing,
            InsightStatus::Completed,
            InsightStatus::Failed,
        ] {
            assert_eq!(InsightStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_category_tags_are_lowercase() {
        for cat in Category::all() {
            assert_eq!(cat.as_str(), cat.as_str().to_lowercase());
        }
    }

    #[test]
    fn test_budget_status_from_percent() {
        assert_eq!(BudgetStatus::from_percent(45.0), BudgetStatus::Normal);
        assert_eq!(BudgetStatus::from_percent(80.0), BudgetStatus::Warning);
        assert_eq!(BudgetStatus::from_percent(99.9), BudgetStatus::Warning);
        assert_eq!(BudgetStatus::from_percent(100.0), BudgetStatus::Exceeded);
        assert_eq!(BudgetStatus::from_percent(150.0), BudgetStatus::Exceeded);
    }

    #[test]
    fn test_parsed_price_comma_decimal() {
        let item = ExtractedItem {
            name: "Milk".to_string(),
            price: Some("12,50".to_string()),
            quantity: None,
        };
        assert_eq!(item.parsed_price(), Some(12.50));
    }

    #[test]
    fn test_parsed_price_thousands_separators() {
        let item = ExtractedItem {
            name: "TV".to_string(),
            price: Some("1.299,00".to_string()),
            quantity: None,
        };
        assert_eq!(item.parsed_price(), Some(1299.0));

        let item = ExtractedItem {
            name: "TV".to_string(),
            price: Some("1,299.00".to_string()),
            quantity: None,
        };
        assert_eq!(item.parsed_price(), Some(1299.0));
    }

    #[test]
    fn test_parsed_price_with_symbol() {
        let item = ExtractedItem {
            name: "Coffee".to_string(),
            price: Some("$4.75".to_string()),
            quantity: None,
        };
        assert_eq!(item.parsed_price(), Some(4.75));
    }

    #[test]
    fn test_parsed_price_garbage() {
        let item = ExtractedItem {
            name: "???".to_string(),
            price: Some("n/a".to_string()),
            quantity: None,
        };
        assert_eq!(item.parsed_price(), None);
    }

    #[test]
    fn test_line_total_defaults_quantity() {
        let item = ReceiptItem::new("Eggs", 3.20);
        assert_eq!(item.quantity, 1.0);
        assert!((item.line_total() - 3.20).abs() < f64::EPSILON);
    }
}
