//! Price history operations
//!
//! Append-only. Each new observation is classified against the previous
//! observation of the same item (case-insensitive name match) at write time,
//! so reads never need to recompute trends.

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Category, PriceHistory, Trend};

impl Database {
    /// Append a price observation, classifying its trend against the
    /// previous observation of the same item
    pub fn record_price(
        &self,
        user_id: &str,
        item_name: &str,
        price: f64,
        merchant: Option<&str>,
        category: Category,
        currency: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let previous: Option<f64> = conn
            .query_row(
                "SELECT price FROM price_history
                 WHERE user_id = ? AND LOWER(item_name) = LOWER(?)
                 ORDER BY recorded_at DESC, id DESC LIMIT 1",
                params![user_id, item_name],
                |row| row.get(0),
            )
            .optional()?;

        let (trend, percent_change) = match previous {
            Some(prev) if prev > 0.0 => {
                let change = (price - prev) / prev * 100.0;
                let trend = if change > 0.01 {
                    Trend::Up
                } else if change < -0.01 {
                    Trend::Down
                } else {
                    Trend::Stable
                };
                (trend, change)
            }
            _ => (Trend::Stable, 0.0),
        };

        conn.execute(
            "INSERT INTO price_history (user_id, item_name, price, merchant,
             category, currency, trend, percent_change)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                item_name,
                price,
                merchant,
                category.as_str(),
                currency,
                trend.as_str(),
                percent_change,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// An item's observations over the trailing `days` window, newest first
    pub fn list_price_history(
        &self,
        user_id: &str,
        item_name: &str,
        days: i64,
    ) -> Result<Vec<PriceHistory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, item_name, price, merchant, category, currency,
                    trend, percent_change, recorded_at
             FROM price_history
             WHERE user_id = ? AND LOWER(item_name) = LOWER(?)
               AND recorded_at >= datetime('now', '-' || ? || ' days')
             ORDER BY recorded_at DESC, id DESC",
        )?;

        let history = stmt
            .query_map(params![user_id, item_name, days], |row| {
                Self::row_to_price_history(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(history)
    }

    /// Lowest observed price (and where) for an item within the window
    pub fn best_price(
        &self,
        user_id: &str,
        item_name: &str,
        days: i64,
    ) -> Result<Option<(f64, Option<String>)>> {
        let conn = self.conn()?;
        let best = conn
            .query_row(
                "SELECT price, merchant FROM price_history
                 WHERE user_id = ? AND LOWER(item_name) = LOWER(?)
                   AND recorded_at >= datetime('now', '-' || ? || ' days')
                 ORDER BY price ASC LIMIT 1",
                params![user_id, item_name, days],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;
        Ok(best)
    }

    fn row_to_price_history(row: &rusqlite::Row) -> rusqlite::Result<PriceHistory> {
        let category_str: String = row.get(5)?;
        let trend_str: String = row.get(7)?;
        let recorded_at_str: String = row.get(9)?;

        Ok(PriceHistory {
            id: row.get(0)?,
            user_id: row.get(1)?,
            item_name: row.get(2)?,
            price: row.get(3)?,
            merchant: row.get(4)?,
            category: category_str.parse().unwrap_or_default(),
            currency: row.get(6)?,
            trend: trend_str.parse().unwrap_or(Trend::Stable),
            percent_change: row.get(8)?,
            recorded_at: parse_datetime(&recorded_at_str),
        })
    }
}
