//! Item categorization with keyword fallback
//!
//! The primary path asks the AI backend to classify an item name into the
//! fixed category taxonomy. Every failure mode (rate limit, timeout, bad
//! JSON, backend down) falls back to a local keyword table; categorization
//! itself never fails.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::ai::{AiBackend, AiClient};
use crate::models::Category;

/// Default classification request cap per rolling minute
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: usize = 100;

/// Keyword -> category fallback table, matched case-insensitively by
/// substring against the item name. First match wins.
const KEYWORD_TABLE: &[(&str, Category)] = &[
    // groceries
    ("milk", Category::Groceries),
    ("bread", Category::Groceries),
    ("eggs", Category::Groceries),
    ("cheese", Category::Groceries),
    ("butter", Category::Groceries),
    ("yogurt", Category::Groceries),
    ("banana", Category::Groceries),
    ("apple", Category::Groceries),
    ("chicken", Category::Groceries),
    ("rice", Category::Groceries),
    ("pasta", Category::Groceries),
    ("cereal", Category::Groceries),
    // dining
    ("restaurant", Category::Dining),
    ("pizza", Category::Dining),
    ("burger", Category::Dining),
    ("sushi", Category::Dining),
    ("coffee", Category::Dining),
    ("latte", Category::Dining),
    ("sandwich", Category::Dining),
    ("takeout", Category::Dining),
    // transportation
    ("uber", Category::Transportation),
    ("lyft", Category::Transportation),
    ("taxi", Category::Transportation),
    ("fuel", Category::Transportation),
    ("gasoline", Category::Transportation),
    ("petrol", Category::Transportation),
    ("parking", Category::Transportation),
    ("bus ticket", Category::Transportation),
    ("train", Category::Transportation),
    // entertainment
    ("netflix", Category::Entertainment),
    ("spotify", Category::Entertainment),
    ("cinema", Category::Entertainment),
    ("movie", Category::Entertainment),
    ("concert", Category::Entertainment),
    ("game", Category::Entertainment),
    // utilities
    ("electric", Category::Utilities),
    ("water bill", Category::Utilities),
    ("internet", Category::Utilities),
    ("broadband", Category::Utilities),
    ("phone plan", Category::Utilities),
    // health
    ("pharmacy", Category::Health),
    ("vitamin", Category::Health),
    ("medicine", Category::Health),
    ("ibuprofen", Category::Health),
    ("aspirin", Category::Health),
    // household
    ("detergent", Category::Household),
    ("soap", Category::Household),
    ("shampoo", Category::Household),
    ("toothpaste", Category::Household),
    ("paper towel", Category::Household),
    ("toilet paper", Category::Household),
    ("cleaner", Category::Household),
    // shopping
    ("t-shirt", Category::Shopping),
    ("shirt", Category::Shopping),
    ("shoes", Category::Shopping),
    ("jacket", Category::Shopping),
    ("headphones", Category::Shopping),
    ("charger", Category::Shopping),
];

/// Rolling one-minute request limiter for the classification service
///
/// An explicitly-scoped instance rather than process-wide state; timestamps
/// are injectable so tests do not need clock control. Requests beyond the
/// cap fail fast so the caller can fall back immediately instead of
/// blocking.
pub struct RateLimiter {
    max_per_minute: usize,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to take a slot now
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Try to take a slot at an explicit timestamp (for tests)
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now.checked_sub(Duration::from_secs(60));
        if let Some(cutoff) = cutoff {
            while window.front().is_some_and(|t| *t <= cutoff) {
                window.pop_front();
            }
        }
        if window.len() >= self.max_per_minute {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Requests currently inside the rolling window
    pub fn in_flight(&self) -> usize {
        self.window.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS_PER_MINUTE)
    }
}

/// Categorizes item names, AI-first with keyword fallback
pub struct ItemCategorizer {
    ai: Option<AiClient>,
    limiter: RateLimiter,
}

impl ItemCategorizer {
    pub fn new(ai: Option<AiClient>) -> Self {
        Self {
            ai,
            limiter: RateLimiter::default(),
        }
    }

    pub fn with_limiter(ai: Option<AiClient>, limiter: RateLimiter) -> Self {
        Self { ai, limiter }
    }

    /// Map a free-text item name to a category tag
    ///
    /// Never fails: AI errors and rate-limit rejections fall through to the
    /// keyword table, and an unmatched name lands on `Category::Other`.
    pub async fn categorize(&self, item_name: &str) -> Category {
        if let Some(ref ai) = self.ai {
            if self.limiter.try_acquire() {
                match ai.classify_item(item_name).await {
                    Ok(classification) => {
                        debug!(
                            item = item_name,
                            category = %classification.category,
                            "Classified item via AI backend"
                        );
                        return classification.category;
                    }
                    Err(e) => {
                        warn!(item = item_name, error = %e, "AI classification failed, using keyword fallback");
                    }
                }
            } else {
                debug!(
                    item = item_name,
                    "Classification rate limit reached, using keyword fallback"
                );
            }
        }

        Self::keyword_fallback(item_name)
    }

    /// Local case-insensitive substring lookup against the keyword table
    pub fn keyword_fallback(item_name: &str) -> Category {
        let lower = item_name.to_lowercase();
        for (keyword, category) in KEYWORD_TABLE {
            if lower.contains(keyword) {
                return *category;
            }
        }
        Category::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_fallback_matches() {
        assert_eq!(
            ItemCategorizer::keyword_fallback("Whole Milk 2L"),
            Category::Groceries
        );
        assert_eq!(
            ItemCategorizer::keyword_fallback("UBER TRIP HELP.UBER.COM"),
            Category::Transportation
        );
        assert_eq!(
            ItemCategorizer::keyword_fallback("Laundry Detergent"),
            Category::Household
        );
    }

    #[test]
    fn test_keyword_fallback_unknown_is_other() {
        assert_eq!(
            ItemCategorizer::keyword_fallback("Mystery SKU 0042"),
            Category::Other
        );
    }

    #[test]
    fn test_rate_limiter_caps_requests() {
        let limiter = RateLimiter::new(3);
        let now = Instant::now();
        assert!(limiter.try_acquire_at(now));
        assert!(limiter.try_acquire_at(now));
        assert!(limiter.try_acquire_at(now));
        assert!(!limiter.try_acquire_at(now));
    }

    #[test]
    fn test_rate_limiter_window_expiry() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start));
        assert!(limiter.try_acquire_at(start));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(30)));
        // Both slots fall out of the window after a minute
        assert!(limiter.try_acquire_at(start + Duration::from_secs(61)));
        assert_eq!(limiter.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_categorize_without_backend_uses_fallback() {
        let categorizer = ItemCategorizer::new(None);
        assert_eq!(categorizer.categorize("Oat Milk").await, Category::Groceries);
        assert_eq!(categorizer.categorize("widget").await, Category::Other);
    }

    #[tokio::test]
    async fn test_categorize_falls_back_when_backend_errors() {
        let categorizer = ItemCategorizer::new(Some(AiClient::mock_unhealthy()));
        assert_eq!(
            categorizer.categorize("Cheddar Cheese").await,
            Category::Groceries
        );
    }

    #[tokio::test]
    async fn test_categorize_falls_back_when_rate_limited() {
        let categorizer =
            ItemCategorizer::with_limiter(Some(AiClient::mock()), RateLimiter::new(0));
        // Cap of zero rejects every request; keyword table still answers
        assert_eq!(categorizer.categorize("espresso latte").await, Category::Dining);
    }
}
