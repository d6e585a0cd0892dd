//! Recurrence detection
//!
//! Two entry points share the same matching rule (case-insensitive substring
//! containment in either direction):
//! - `Database::is_recurring_item` answers the per-item question during
//!   insight orchestration (see `db/insight_items.rs`).
//! - `RecurrenceScanner` runs as a batch over a user's trailing 30 days of
//!   receipts, grouping items and phrasing a suggestion per group.
//!
//! The substring rule is intentionally naive: "Milk" groups with
//! "Whole Milk 2L", but it also groups "Tea" with "Tea Towel". That is the
//! accepted trade-off for a matcher with no curated product list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::db::Database;
use crate::error::Result;

/// Window over which purchases count as recurring
const SCAN_WINDOW_DAYS: i64 = 30;

/// Monthly frequency at or above which the suggestion shifts to bulk buying
const BULK_FREQUENCY_PER_MONTH: f64 = 4.0;

/// A group of matching purchases found by the batch scanner
#[derive(Debug, Clone, Serialize)]
pub struct RecurringGroup {
    /// Representative name (the shortest member, which is usually the most
    /// generic form)
    pub name: String,
    pub occurrences: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Purchases per 30 days, extrapolated from the observed span
    pub frequency_per_month: f64,
    pub average_price: f64,
    pub suggestion: String,
}

/// Batch recurrence scanner over recent receipts
#[derive(Clone)]
pub struct RecurrenceScanner {
    db: Database,
}

struct Occurrence {
    name: String,
    price: f64,
    seen_at: DateTime<Utc>,
}

struct Group {
    members: Vec<usize>,
    key: String,
}

impl RecurrenceScanner {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Scan one user's trailing 30 days of receipt items
    ///
    /// Groups with at least 2 members are recurring. Groups whose normalized
    /// names are substrings of each other are merged before counting.
    pub fn scan_user(&self, user_id: &str) -> Result<Vec<RecurringGroup>> {
        let receipts = self.db.list_recent_receipts(user_id, SCAN_WINDOW_DAYS)?;

        let mut occurrences = Vec::new();
        for receipt in &receipts {
            for item in &receipt.items {
                let name = item.name.trim().to_lowercase();
                if name.is_empty() {
                    continue;
                }
                occurrences.push(Occurrence {
                    name,
                    price: item.price,
                    seen_at: receipt.created_at,
                });
            }
        }

        // Build groups, merging keys that contain each other
        let mut groups: Vec<Group> = Vec::new();
        for (idx, occ) in occurrences.iter().enumerate() {
            let existing = groups
                .iter_mut()
                .find(|g| g.key.contains(&occ.name) || occ.name.contains(&g.key));
            match existing {
                Some(group) => {
                    group.members.push(idx);
                    // Keep the shorter name as the representative key
                    if occ.name.len() < group.key.len() {
                        group.key = occ.name.clone();
                    }
                }
                None => groups.push(Group {
                    members: vec![idx],
                    key: occ.name.clone(),
                }),
            }
        }

        let mut recurring = Vec::new();
        for group in groups {
            if group.members.len() < 2 {
                continue;
            }

            let first_seen = group
                .members
                .iter()
                .map(|&i| occurrences[i].seen_at)
                .min()
                .unwrap_or_else(Utc::now);
            let last_seen = group
                .members
                .iter()
                .map(|&i| occurrences[i].seen_at)
                .max()
                .unwrap_or_else(Utc::now);
            let total_price: f64 = group.members.iter().map(|&i| occurrences[i].price).sum();

            let span_days = (last_seen - first_seen).num_days().max(1) as f64;
            let frequency = group.members.len() as f64 / (span_days / 30.0);
            let suggestion = if frequency >= BULK_FREQUENCY_PER_MONTH {
                "Bought often; buying in bulk could cut the per-unit cost".to_string()
            } else {
                "Recurs monthly; check for better deals before the next purchase".to_string()
            };

            recurring.push(RecurringGroup {
                name: group.key,
                occurrences: group.members.len(),
                first_seen,
                last_seen,
                frequency_per_month: frequency,
                average_price: total_price / group.members.len() as f64,
                suggestion,
            });
        }

        recurring.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        debug!(
            user_id = user_id,
            groups = recurring.len(),
            "Recurrence scan complete"
        );
        Ok(recurring)
    }
}
