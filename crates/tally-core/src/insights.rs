//! Insight orchestration
//!
//! Drives a receipt through the pipeline: categorize each item, detect
//! recurrence, generate insight text, attribute spend to budgets, and record
//! price history. The receipt's `insight_status` is the state machine:
//! pending -> processing -> completed | failed.
//!
//! Items are walked strictly in order with no fan-out. Sequential processing
//! respects the classifier's rate limiter and keeps budget attribution
//! deterministic. A single item's failure is contained: the item stays
//! unannotated, the rest of the receipt still completes.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::ai::{AiBackend, AiClient};
use crate::budget::BudgetLedger;
use crate::categorize::ItemCategorizer;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{InsightItem, InsightStatus, NewInsightItem, Receipt, ReceiptItem};

/// Lookback for market-price comparison against past observations
const PRICE_LOOKBACK_DAYS: i64 = 90;

/// The outcome of one orchestration run (or the stored result of a past one)
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptInsights {
    pub receipt_id: i64,
    pub status: InsightStatus,
    pub items: Vec<InsightItem>,
}

/// Orchestrates per-receipt insight generation
pub struct InsightEngine {
    db: Database,
    ai: Option<AiClient>,
    categorizer: ItemCategorizer,
    ledger: BudgetLedger,
}

impl InsightEngine {
    pub fn new(db: Database, ai: Option<AiClient>, ledger: BudgetLedger) -> Self {
        let categorizer = ItemCategorizer::new(ai.clone());
        Self {
            db,
            ai,
            categorizer,
            ledger,
        }
    }

    /// Run the insight pipeline for one receipt
    ///
    /// A completed receipt short-circuits: the stored insight items come
    /// back unchanged and nothing is re-attributed. Pending, failed, and
    /// stuck-processing receipts are (re)processed.
    pub async fn generate_for_receipt(&self, receipt_id: i64) -> Result<ReceiptInsights> {
        let receipt = self
            .db
            .get_receipt(receipt_id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {} not found", receipt_id)))?;

        if receipt.insight_status == InsightStatus::Completed {
            return Ok(ReceiptInsights {
                receipt_id,
                status: InsightStatus::Completed,
                items: self.db.list_insight_items_for_receipt(receipt_id)?,
            });
        }

        self.db
            .update_insight_status(receipt_id, InsightStatus::Processing)?;

        match self.process_items(&receipt).await {
            Ok(items) => {
                self.db
                    .update_insight_status(receipt_id, InsightStatus::Completed)?;
                info!(
                    receipt_id = receipt_id,
                    items = items.len(),
                    "Receipt insights completed"
                );
                Ok(ReceiptInsights {
                    receipt_id,
                    status: InsightStatus::Completed,
                    items,
                })
            }
            Err(e) => {
                // Leave the receipt re-triggerable
                if let Err(mark_err) = self
                    .db
                    .update_insight_status(receipt_id, InsightStatus::Failed)
                {
                    warn!(receipt_id = receipt_id, error = %mark_err, "Failed to mark receipt failed");
                }
                Err(e)
            }
        }
    }

    async fn process_items(&self, receipt: &Receipt) -> Result<Vec<InsightItem>> {
        let mut annotated = receipt.items.clone();
        let mut results = Vec::new();

        for item in annotated.iter_mut() {
            match self.process_one(receipt, item).await {
                Ok(insight_item) => results.push(insight_item),
                Err(e) => {
                    // Contained: this item stays unannotated
                    warn!(
                        receipt_id = receipt.id,
                        item = %item.name,
                        error = %e,
                        "Item insight failed, continuing with remaining items"
                    );
                }
            }
        }

        self.db.update_receipt_items(receipt.id, &annotated)?;
        Ok(results)
    }

    async fn process_one(&self, receipt: &Receipt, item: &mut ReceiptItem) -> Result<InsightItem> {
        let category = self.categorizer.categorize(&item.name).await;
        let recurring = self.db.is_recurring_item(&receipt.user_id, &item.name)?;

        let insight_text = match &self.ai {
            Some(ai) => ai
                .item_insight(&item.name, item.price, &receipt.currency, recurring)
                .await
                .map_err(|e| {
                    warn!(item = %item.name, error = %e, "AI insight failed, using template");
                    e
                })
                .ok(),
            None => None,
        }
        .unwrap_or_else(|| fallback_insight(item, &receipt.currency, recurring));

        // Compare against past observations before recording this one
        if let Some((best, _merchant)) = self
            .db
            .best_price(&receipt.user_id, &item.name, PRICE_LOOKBACK_DAYS)?
        {
            if best < item.price {
                item.market_price = Some(best);
                item.savings_estimate = Some(item.price - best);
            }
        }

        item.category = Some(category);
        item.recurring = Some(recurring);
        item.insight = Some(insight_text.clone());

        let new_item = NewInsightItem {
            user_id: receipt.user_id.clone(),
            receipt_id: receipt.id,
            item_name: item.name.clone(),
            item_price: item.price,
            category,
            recurring,
            insight: Some(insight_text.clone()),
            status: InsightStatus::Completed,
        };
        let id = self.db.insert_insight_item(&new_item)?;

        self.ledger
            .attribute_spend(&receipt.user_id, category.as_str(), item.line_total())?;
        self.db.record_price(
            &receipt.user_id,
            &item.name,
            item.price,
            receipt.merchant.as_deref(),
            category,
            &receipt.currency,
        )?;

        Ok(InsightItem {
            id,
            user_id: new_item.user_id,
            receipt_id: new_item.receipt_id,
            item_name: new_item.item_name,
            item_price: new_item.item_price,
            category,
            recurring,
            insight: new_item.insight,
            status: InsightStatus::Completed,
            detected_at: Utc::now(),
        })
    }
}

/// Template insight used when no AI backend is available or it fails
fn fallback_insight(item: &ReceiptItem, currency: &str, recurring: bool) -> String {
    if recurring {
        format!(
            "{} appears to be a recurring purchase. Compare prices across stores before the next one.",
            item.name
        )
    } else {
        format!("Item: {} - {:.2} {}", item.name, item.price, currency)
    }
}
