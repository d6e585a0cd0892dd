//! Budget ledger
//!
//! Attributes categorized spend to the user's monthly category budgets and
//! fires threshold notifications at 80% and 100% of the limit. Each
//! threshold fires at most once per month: the notified flags are monotonic
//! until `reset_spending` or the month rollover clears them.
//!
//! Known limitation: configs are read-modify-write, so two concurrent
//! attributions to the same category can lose an update or double-fire a
//! threshold. Single-writer deployments do not hit this.

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::jobs::{Job, JobQueue};
use crate::models::BudgetStatus;

/// Minimum gap between weekly summary dispatches
const SUMMARY_COOLDOWN_DAYS: i64 = 7;

/// One category's analytics row
#[derive(Debug, Clone, Serialize)]
pub struct CategoryAnalytics {
    pub category: String,
    pub spent: f64,
    pub limit: f64,
    pub percent_used: f64,
    pub status: BudgetStatus,
}

/// Budget analytics for one user
#[derive(Debug, Clone, Serialize)]
pub struct BudgetAnalytics {
    pub categories: Vec<CategoryAnalytics>,
    /// Current-month spend in categories with no configured budget.
    /// Reported only; never threshold-checked.
    pub uncategorized_spend: f64,
    pub total_spent: f64,
}

/// Spend attribution and threshold alerting over budget configs
#[derive(Clone)]
pub struct BudgetLedger {
    db: Database,
    jobs: JobQueue,
}

impl BudgetLedger {
    pub fn new(db: Database, jobs: JobQueue) -> Self {
        Self { db, jobs }
    }

    /// Attribute spend to a category budget
    ///
    /// A user without a config, or without a budget for this category, is a
    /// no-op. Crossing 80% and 100% in the same call fires both alerts.
    pub fn attribute_spend(&self, user_id: &str, category: &str, amount: f64) -> Result<()> {
        if amount <= 0.0 {
            return Ok(());
        }

        let Some(config) = self.db.get_budget_config(user_id)? else {
            return Ok(());
        };
        let Some(budget) = config
            .categories
            .iter()
            .find(|b| b.category.eq_ignore_ascii_case(category))
        else {
            return Ok(());
        };

        let mut budget = budget.clone();
        budget.current_spend += amount;
        let percent = budget.percent_used();

        let mut fired = Vec::new();
        if percent >= 80.0 && !budget.notified_80 {
            budget.notified_80 = true;
            fired.push(80u8);
        }
        if percent >= 100.0 && !budget.notified_100 {
            budget.notified_100 = true;
            fired.push(100u8);
        }
        if !fired.is_empty() {
            budget.last_notified_at = Some(Utc::now());
        }

        self.db.update_category_budget_state(&budget)?;

        for threshold in fired {
            info!(
                user_id = user_id,
                category = %budget.category,
                threshold = threshold,
                spent = budget.current_spend,
                "Budget threshold crossed"
            );
            if config.notifications_enabled {
                self.jobs.enqueue(Job::ThresholdAlert {
                    user_id: user_id.to_string(),
                    category: budget.category.clone(),
                    threshold,
                    spent: budget.current_spend,
                    limit: budget.monthly_limit,
                })?;
            }
        }

        Ok(())
    }

    /// Zero all spends and re-arm both thresholds
    pub fn reset_spending(&self, user_id: &str) -> Result<()> {
        self.db.reset_budget_spending(user_id)?;
        info!(user_id = user_id, "Budget spending reset");
        Ok(())
    }

    /// Scheduled month-rollover step: re-arm threshold flags when the
    /// calendar month has moved past the config's last update
    ///
    /// Clears flags only. Spend is the user's to reset.
    pub fn reconcile_month_rollover(&self, user_id: &str) -> Result<()> {
        self.reconcile_month_rollover_at(user_id, Utc::now())
    }

    fn reconcile_month_rollover_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(config) = self.db.get_budget_config(user_id)? else {
            return Ok(());
        };

        let stale = config.updated_at.month() != now.month()
            || config.updated_at.year() != now.year();
        if stale {
            self.db.clear_threshold_flags(config.id)?;
            info!(user_id = user_id, "Month rollover: threshold flags re-armed");
        }
        Ok(())
    }

    /// Per-category utilization plus the uncategorized bucket
    ///
    /// Sunday reads additionally dispatch the weekly summary, at most once
    /// per 7 days.
    pub fn get_analytics(&self, user_id: &str) -> Result<BudgetAnalytics> {
        self.get_analytics_at(user_id, Utc::now())
    }

    fn get_analytics_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<BudgetAnalytics> {
        let config = self.db.get_or_create_budget_config(user_id)?;

        let categories: Vec<CategoryAnalytics> = config
            .categories
            .iter()
            .map(|b| CategoryAnalytics {
                category: b.category.clone(),
                spent: b.current_spend,
                limit: b.monthly_limit,
                percent_used: b.percent_used(),
                status: BudgetStatus::from_percent(b.percent_used()),
            })
            .collect();

        let month_totals = self.db.category_totals_this_month(user_id)?;
        let uncategorized_spend: f64 = month_totals
            .iter()
            .filter(|(cat, _)| {
                !config
                    .categories
                    .iter()
                    .any(|b| b.category.eq_ignore_ascii_case(cat.as_str()))
            })
            .map(|(_, total)| total)
            .sum();

        let total_spent = categories.iter().map(|c| c.spent).sum::<f64>() + uncategorized_spend;

        // Weekly summary dispatch rides along with Sunday analytics reads
        if now.weekday() == Weekday::Sun && config.notifications_enabled {
            let due = match config.last_summary_sent_at {
                Some(sent) => (now - sent).num_days() >= SUMMARY_COOLDOWN_DAYS,
                None => true,
            };
            if due {
                debug!(user_id = user_id, "Dispatching weekly summary");
                if let Err(e) = self.jobs.enqueue(Job::WeeklySummary {
                    user_id: user_id.to_string(),
                }) {
                    warn!(user_id = user_id, error = %e, "Weekly summary enqueue failed");
                } else {
                    self.db.mark_summary_sent(config.id, now)?;
                }
            }
        }

        Ok(BudgetAnalytics {
            categories,
            uncategorized_spend,
            total_spent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{QueueConfig, RecordingSink};
    use crate::models::{Category, InsightStatus, NewInsightItem};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;

    fn ledger_with_sink() -> (BudgetLedger, Arc<RecordingSink>, Database) {
        let db = Database::in_memory().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let jobs = JobQueue::start(QueueConfig::default(), sink.clone());
        (BudgetLedger::new(db.clone(), jobs), sink, db)
    }

    fn threshold_alerts(sink: &RecordingSink) -> Vec<u8> {
        sink.delivered()
            .into_iter()
            .filter_map(|job| match job {
                Job::ThresholdAlert { threshold, .. } => Some(threshold),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_attribute_without_config_is_noop() {
        let (ledger, sink, _db) = ledger_with_sink();
        ledger.attribute_spend("user-1", "Dining", 50.0).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_thresholds_fire_once_each() {
        let (ledger, sink, db) = ledger_with_sink();
        db.upsert_category_budget("user-1", "Dining", 400.0).unwrap();

        // 390 of 400 crosses 80%
        ledger.attribute_spend("user-1", "Dining", 390.0).unwrap();
        // 405 of 400 crosses 100%; 80% must not re-fire
        ledger.attribute_spend("user-1", "Dining", 15.0).unwrap();
        // Further spend fires nothing
        ledger.attribute_spend("user-1", "Dining", 20.0).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(threshold_alerts(&sink), vec![80, 100]);

        let config = db.get_budget_config("user-1").unwrap().unwrap();
        assert!((config.categories[0].current_spend - 425.0).abs() < 1e-9);
        assert!(config.categories[0].notified_80);
        assert!(config.categories[0].notified_100);
    }

    #[tokio::test]
    async fn test_both_thresholds_in_one_call() {
        let (ledger, sink, db) = ledger_with_sink();
        db.upsert_category_budget("user-1", "Groceries", 100.0).unwrap();

        ledger.attribute_spend("user-1", "groceries", 105.0).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(threshold_alerts(&sink), vec![80, 100]);
    }

    #[tokio::test]
    async fn test_reset_rearms_thresholds() {
        let (ledger, sink, db) = ledger_with_sink();
        db.upsert_category_budget("user-1", "Dining", 100.0).unwrap();

        ledger.attribute_spend("user-1", "Dining", 85.0).unwrap();
        ledger.reset_spending("user-1").unwrap();
        ledger.attribute_spend("user-1", "Dining", 85.0).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // 80% alert fired twice, once per armed period
        assert_eq!(threshold_alerts(&sink), vec![80, 80]);
    }

    #[tokio::test]
    async fn test_disabled_notifications_still_set_flags() {
        let (ledger, sink, db) = ledger_with_sink();
        db.upsert_category_budget("user-1", "Dining", 100.0).unwrap();
        db.set_notifications_enabled("user-1", false).unwrap();

        ledger.attribute_spend("user-1", "Dining", 90.0).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.delivered().is_empty());
        let config = db.get_budget_config("user-1").unwrap().unwrap();
        assert!(config.categories[0].notified_80);
    }

    #[tokio::test]
    async fn test_rollover_clears_flags_only_on_month_change() {
        let (ledger, _sink, db) = ledger_with_sink();
        db.upsert_category_budget("user-1", "Dining", 100.0).unwrap();
        ledger.attribute_spend("user-1", "Dining", 85.0).unwrap();

        // Same month as the config's last update: nothing changes
        ledger.reconcile_month_rollover("user-1").unwrap();
        let config = db.get_budget_config("user-1").unwrap().unwrap();
        assert!(config.categories[0].notified_80);

        // A later month re-arms the flags but keeps the spend
        let next_year = Utc.with_ymd_and_hms(Utc::now().year() + 1, 1, 15, 12, 0, 0).unwrap();
        ledger
            .reconcile_month_rollover_at("user-1", next_year)
            .unwrap();
        let config = db.get_budget_config("user-1").unwrap().unwrap();
        assert!(!config.categories[0].notified_80);
        assert!((config.categories[0].current_spend - 85.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_analytics_statuses_and_uncategorized() {
        let (ledger, _sink, db) = ledger_with_sink();
        db.upsert_category_budget("user-1", "Dining", 100.0).unwrap();
        db.upsert_category_budget("user-1", "Groceries", 200.0).unwrap();
        ledger.attribute_spend("user-1", "Dining", 120.0).unwrap();
        ledger.attribute_spend("user-1", "Groceries", 170.0).unwrap();

        // Entertainment has no configured budget
        let receipt_id = db
            .create_receipt(
                "user-1",
                &crate::models::ExtractedReceipt::default(),
                &crate::currency::CurrencyResolution {
                    currency: "USD".to_string(),
                    evidence: "test".to_string(),
                    confidence: 0.9,
                },
            )
            .unwrap();
        db.insert_insight_item(&NewInsightItem {
            user_id: "user-1".to_string(),
            receipt_id,
            item_name: "Cinema ticket".to_string(),
            item_price: 14.0,
            category: Category::Entertainment,
            recurring: false,
            insight: None,
            status: InsightStatus::Completed,
        })
        .unwrap();

        // A weekday read: no summary side effects to worry about
        let monday = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let analytics = ledger.get_analytics_at("user-1", monday).unwrap();

        let dining = analytics
            .categories
            .iter()
            .find(|c| c.category == "Dining")
            .unwrap();
        assert_eq!(dining.status, BudgetStatus::Exceeded);
        let groceries = analytics
            .categories
            .iter()
            .find(|c| c.category == "Groceries")
            .unwrap();
        assert_eq!(groceries.status, BudgetStatus::Warning);
        assert!((analytics.uncategorized_spend - 14.0).abs() < 1e-9);
        assert!((analytics.total_spent - 304.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sunday_analytics_sends_summary_once_per_week() {
        let (ledger, sink, db) = ledger_with_sink();
        db.upsert_category_budget("user-1", "Dining", 100.0).unwrap();

        let sunday = Utc.with_ymd_and_hms(2024, 6, 9, 12, 0, 0).unwrap();
        ledger.get_analytics_at("user-1", sunday).unwrap();
        // Same Sunday again: cooldown suppresses the second dispatch
        ledger.get_analytics_at("user-1", sunday).unwrap();
        // Next Sunday: due again
        let next_sunday = Utc.with_ymd_and_hms(2024, 6, 16, 12, 0, 0).unwrap();
        ledger.get_analytics_at("user-1", next_sunday).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let summaries = sink
            .delivered()
            .into_iter()
            .filter(|job| matches!(job, Job::WeeklySummary { .. }))
            .count();
        assert_eq!(summaries, 2);
    }
}
