//! Weekly digest operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{OverspentCategory, RecurringAlert, TopCategory, WeeklyDigest};

/// A digest as produced by the aggregator, before it has an id
#[derive(Debug, Clone)]
pub struct NewWeeklyDigest {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub total_spend: f64,
    pub top_categories: Vec<TopCategory>,
    pub overspent: Vec<OverspentCategory>,
    pub recurring_alerts: Vec<RecurringAlert>,
    pub tip: String,
}

impl Database {
    /// Store a weekly digest
    pub fn insert_digest(&self, digest: &NewWeeklyDigest) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO weekly_digests (user_id, week_start, total_spend,
             top_categories, overspent, recurring_alerts, tip)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                digest.user_id,
                digest.week_start.to_string(),
                digest.total_spend,
                serde_json::to_string(&digest.top_categories)?,
                serde_json::to_string(&digest.overspent)?,
                serde_json::to_string(&digest.recurring_alerts)?,
                digest.tip,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a digest by ID
    pub fn get_digest(&self, id: i64) -> Result<Option<WeeklyDigest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, week_start, total_spend, top_categories,
                    overspent, recurring_alerts, tip, sent, created_at
             FROM weekly_digests WHERE id = ?",
        )?;

        let digest = stmt
            .query_row(params![id], |row| Self::row_to_digest(row))
            .optional()?;

        Ok(digest)
    }

    /// List a user's digests, newest week first
    pub fn list_digests(&self, user_id: &str) -> Result<Vec<WeeklyDigest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, week_start, total_spend, top_categories,
                    overspent, recurring_alerts, tip, sent, created_at
             FROM weekly_digests WHERE user_id = ?
             ORDER BY week_start DESC, id DESC",
        )?;

        let digests = stmt
            .query_map(params![user_id], |row| Self::row_to_digest(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(digests)
    }

    /// Mark a digest as sent
    pub fn mark_digest_sent(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE weekly_digests SET sent = 1 WHERE id = ?",
            params![id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Digest {} not found", id)));
        }
        Ok(())
    }

    /// Whether the user already has a digest whose week starts on or after
    /// the given date
    ///
    /// The aggregator's week start slides with the run time, so dedupe has
    /// to cover the whole trailing window, not one exact date. ISO dates
    /// compare correctly as strings.
    pub fn has_digest_since(&self, user_id: &str, since: NaiveDate) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM weekly_digests WHERE user_id = ? AND week_start >= ?",
            params![user_id, since.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn row_to_digest(row: &rusqlite::Row) -> rusqlite::Result<WeeklyDigest> {
        let week_start_str: String = row.get(2)?;
        let top_json: String = row.get(4)?;
        let overspent_json: String = row.get(5)?;
        let recurring_json: String = row.get(6)?;
        let created_at_str: String = row.get(9)?;

        Ok(WeeklyDigest {
            id: row.get(0)?,
            user_id: row.get(1)?,
            week_start: NaiveDate::parse_from_str(&week_start_str, "%Y-%m-%d")
                .unwrap_or_default(),
            total_spend: row.get(3)?,
            top_categories: serde_json::from_str(&top_json).unwrap_or_default(),
            overspent: serde_json::from_str(&overspent_json).unwrap_or_default(),
            recurring_alerts: serde_json::from_str(&recurring_json).unwrap_or_default(),
            tip: row.get(7)?,
            sent: row.get(8)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
