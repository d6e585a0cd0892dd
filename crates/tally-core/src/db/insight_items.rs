//! Insight item operations
//!
//! One row per line item per orchestration run. These rows back recurrence
//! detection, budget analytics, and the weekly digest, so they are written
//! once and queried by time window.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Category, InsightItem, NewInsightItem};

impl Database {
    /// Insert an insight item record
    pub fn insert_insight_item(&self, item: &NewInsightItem) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO insight_items (user_id, receipt_id, item_name, item_price,
             category, recurring, insight, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                item.user_id,
                item.receipt_id,
                item.item_name,
                item.item_price,
                item.category.as_str(),
                item.recurring,
                item.insight,
                item.status.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get the insight items recorded for a receipt, in item order
    pub fn list_insight_items_for_receipt(&self, receipt_id: i64) -> Result<Vec<InsightItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, receipt_id, item_name, item_price, category,
                    recurring, insight, status, detected_at
             FROM insight_items WHERE receipt_id = ? ORDER BY id ASC",
        )?;

        let items = stmt
            .query_map(params![receipt_id], |row| Self::row_to_insight_item(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// List a user's insight items, newest first
    pub fn list_insight_items(&self, user_id: &str, limit: u32) -> Result<Vec<InsightItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, receipt_id, item_name, item_price, category,
                    recurring, insight, status, detected_at
             FROM insight_items WHERE user_id = ?
             ORDER BY detected_at DESC, id DESC LIMIT ?",
        )?;

        let items = stmt
            .query_map(params![user_id, limit], |row| Self::row_to_insight_item(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// A user's insight items within the trailing `days` window, oldest
    /// first (encounter order)
    pub fn list_insight_items_window(&self, user_id: &str, days: i64) -> Result<Vec<InsightItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, receipt_id, item_name, item_price, category,
                    recurring, insight, status, detected_at
             FROM insight_items
             WHERE user_id = ? AND detected_at >= datetime('now', '-' || ? || ' days')
             ORDER BY detected_at ASC, id ASC",
        )?;

        let items = stmt
            .query_map(params![user_id, days], |row| Self::row_to_insight_item(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// Whether an item name recurs in the user's trailing 30-day history
    ///
    /// Two or more prior items count as recurring. Names match
    /// case-insensitively by substring containment in either direction, so
    /// "Milk" matches "Whole Milk 2L" and vice versa.
    pub fn is_recurring_item(&self, user_id: &str, item_name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT item_name FROM insight_items
             WHERE user_id = ? AND detected_at >= datetime('now', '-30 days')",
        )?;

        let names = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let needle = item_name.to_lowercase();
        let matches = names
            .iter()
            .filter(|name| {
                let candidate = name.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
            .count();

        Ok(matches >= 2)
    }

    /// Per-category spend totals over the trailing `days` window
    pub fn category_totals(&self, user_id: &str, days: i64) -> Result<Vec<(Category, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, SUM(item_price) FROM insight_items
             WHERE user_id = ? AND detected_at >= datetime('now', '-' || ? || ' days')
             GROUP BY category ORDER BY SUM(item_price) DESC",
        )?;

        let rows = stmt
            .query_map(params![user_id, days], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(cat, total)| (cat.parse().unwrap_or_default(), total))
            .collect())
    }

    /// Per-category spend totals for the current calendar month
    pub fn category_totals_this_month(&self, user_id: &str) -> Result<Vec<(Category, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, SUM(item_price) FROM insight_items
             WHERE user_id = ? AND detected_at >= datetime('now', 'start of month')
             GROUP BY category ORDER BY SUM(item_price) DESC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(cat, total)| (cat.parse().unwrap_or_default(), total))
            .collect())
    }

    /// Helper to convert a row to InsightItem
    fn row_to_insight_item(row: &rusqlite::Row) -> rusqlite::Result<InsightItem> {
        let category_str: String = row.get(5)?;
        let status_str: String = row.get(8)?;
        let detected_at_str: String = row.get(9)?;

        Ok(InsightItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            receipt_id: row.get(2)?,
            item_name: row.get(3)?,
            item_price: row.get(4)?,
            category: category_str.parse().unwrap_or_default(),
            recurring: row.get(6)?,
            insight: row.get(7)?,
            status: status_str.parse().unwrap_or_default(),
            detected_at: parse_datetime(&detected_at_str),
        })
    }
}
