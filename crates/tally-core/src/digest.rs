//! Weekly digest aggregation
//!
//! Batch job that rolls each user's trailing 7 days of insight items into a
//! single digest record: total spend, top three categories, budgets the week
//! overshot, recurring purchases, and a closing tip. One user's failure is
//! logged and does not stop the run.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::ai::{AiBackend, AiClient};
use crate::db::{Database, NewWeeklyDigest};
use crate::error::Result;
use crate::jobs::{Job, JobQueue};
use crate::models::{DigestSummary, OverspentCategory, RecurringAlert, TopCategory};
use crate::recurrence::RecurrenceScanner;

/// Digest aggregation window
const WINDOW_DAYS: i64 = 7;

/// Categories listed in the digest ranking
const TOP_CATEGORY_COUNT: usize = 3;

const FALLBACK_TIP: &str =
    "Review your top spending category this week; small cuts there add up fastest.";

/// Counters for one batch run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DigestRunResults {
    pub users_processed: usize,
    pub digests_created: usize,
    pub users_failed: usize,
}

/// Builds weekly digests for all users
pub struct DigestAggregator {
    db: Database,
    ai: Option<AiClient>,
    jobs: JobQueue,
    scanner: RecurrenceScanner,
}

impl DigestAggregator {
    pub fn new(db: Database, ai: Option<AiClient>, jobs: JobQueue) -> Self {
        let scanner = RecurrenceScanner::new(db.clone());
        Self {
            db,
            ai,
            jobs,
            scanner,
        }
    }

    /// Run the digest for every known user, isolating per-user failures
    pub async fn run_for_all_users(&self) -> Result<DigestRunResults> {
        let users = self.db.list_user_ids()?;
        let mut results = DigestRunResults::default();

        for user_id in users {
            results.users_processed += 1;
            match self.run_for_user(&user_id).await {
                Ok(Some(digest_id)) => {
                    results.digests_created += 1;
                    info!(user_id = %user_id, digest_id = digest_id, "Weekly digest created");
                }
                Ok(None) => {}
                Err(e) => {
                    results.users_failed += 1;
                    warn!(user_id = %user_id, error = %e, "Weekly digest failed for user");
                }
            }
        }

        info!(
            processed = results.users_processed,
            created = results.digests_created,
            failed = results.users_failed,
            "Weekly digest run complete"
        );
        Ok(results)
    }

    /// Build one user's digest for the trailing 7 days
    ///
    /// Returns None when the user had no activity in the window or already
    /// has a digest covering this week. The week start slides with the run
    /// time, so the guard checks the whole trailing window; back-to-back
    /// runs on consecutive days are no-ops, not near-duplicate digests.
    pub async fn run_for_user(&self, user_id: &str) -> Result<Option<i64>> {
        let week_start = (Utc::now() - Duration::days(WINDOW_DAYS)).date_naive();
        if self.db.has_digest_since(user_id, week_start)? {
            return Ok(None);
        }

        let items = self.db.list_insight_items_window(user_id, WINDOW_DAYS)?;
        if items.is_empty() {
            return Ok(None);
        }

        let total_spend: f64 = items.iter().map(|i| i.item_price).sum();

        // Fold totals in encounter order so equal amounts rank by first seen
        let mut totals: Vec<(crate::models::Category, f64)> = Vec::new();
        for item in &items {
            match totals.iter_mut().find(|(cat, _)| *cat == item.category) {
                Some((_, sum)) => *sum += item.item_price,
                None => totals.push((item.category, item.item_price)),
            }
        }
        let mut ranked = totals.clone();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let top_categories: Vec<TopCategory> = ranked
            .iter()
            .take(TOP_CATEGORY_COUNT)
            .map(|(category, amount)| TopCategory {
                category: *category,
                amount: *amount,
                percent_of_total: if total_spend > 0.0 {
                    amount / total_spend * 100.0
                } else {
                    0.0
                },
            })
            .collect();

        // Budgets the week's spend alone already overshoots
        let mut overspent = Vec::new();
        if let Some(config) = self.db.get_budget_config(user_id)? {
            for budget in &config.categories {
                let windowed = totals
                    .iter()
                    .find(|(cat, _)| cat.as_str().eq_ignore_ascii_case(&budget.category))
                    .map(|(_, sum)| *sum)
                    .unwrap_or(0.0);
                if windowed > budget.monthly_limit {
                    overspent.push(OverspentCategory {
                        category: budget.category.clone(),
                        spent: windowed,
                        limit: budget.monthly_limit,
                    });
                }
            }
        }

        // Recurring groups that were actually purchased this week
        let window_floor = Utc::now() - Duration::days(WINDOW_DAYS);
        let recurring_alerts: Vec<RecurringAlert> = self
            .scanner
            .scan_user(user_id)?
            .into_iter()
            .filter(|group| group.last_seen >= window_floor)
            .map(|group| RecurringAlert {
                item_name: group.name,
                occurrences: group.occurrences,
                suggestion: group.suggestion,
            })
            .collect();

        let summary = DigestSummary {
            total_spend,
            top_categories: top_categories.clone(),
            overspent_count: overspent.len(),
            recurring_count: recurring_alerts.len(),
        };
        let tip = match &self.ai {
            Some(ai) => match ai.weekly_tip(&summary).await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(user_id = user_id, error = %e, "AI tip failed, using fallback");
                    FALLBACK_TIP.to_string()
                }
            },
            None => FALLBACK_TIP.to_string(),
        };

        let digest_id = self.db.insert_digest(&NewWeeklyDigest {
            user_id: user_id.to_string(),
            week_start,
            total_spend,
            top_categories,
            overspent,
            recurring_alerts,
            tip,
        })?;

        if let Err(e) = self.jobs.enqueue(Job::DigestReady {
            user_id: user_id.to_string(),
            digest_id,
        }) {
            warn!(user_id = user_id, error = %e, "Digest notification enqueue failed");
        }

        Ok(Some(digest_id))
    }
}
