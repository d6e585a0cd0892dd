//! Budget configuration operations
//!
//! The threshold/notification decisions live in `crate::budget`; this module
//! provides the persistence primitives: lazy config creation, category
//! upserts with case-insensitive uniqueness, and spend/flag updates.

use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{BudgetConfig, CategoryBudget};

impl Database {
    /// Get a user's budget config, creating an empty one on first access
    pub fn get_or_create_budget_config(&self, user_id: &str) -> Result<BudgetConfig> {
        if let Some(config) = self.get_budget_config(user_id)? {
            return Ok(config);
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO budget_configs (user_id) VALUES (?)",
            params![user_id],
        )?;
        drop(conn);

        self.get_budget_config(user_id)?
            .ok_or_else(|| Error::InvalidData(format!("Budget config for {} vanished", user_id)))
    }

    /// Get a user's budget config if one exists
    pub fn get_budget_config(&self, user_id: &str) -> Result<Option<BudgetConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, notifications_enabled, last_reset_at,
                    last_summary_sent_at, updated_at
             FROM budget_configs WHERE user_id = ?",
        )?;

        let header = stmt
            .query_row(params![user_id], |row| {
                let last_reset: Option<String> = row.get(3)?;
                let last_summary: Option<String> = row.get(4)?;
                let updated_at: String = row.get(5)?;
                Ok(BudgetConfig {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    categories: Vec::new(),
                    notifications_enabled: row.get(2)?,
                    last_reset_at: last_reset.map(|s| parse_datetime(&s)),
                    last_summary_sent_at: last_summary.map(|s| parse_datetime(&s)),
                    updated_at: parse_datetime(&updated_at),
                })
            })
            .optional()?;

        let Some(mut config) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, category, monthly_limit, current_spend, notified_80,
                    notified_100, last_notified_at
             FROM category_budgets WHERE config_id = ? ORDER BY category COLLATE NOCASE",
        )?;

        config.categories = stmt
            .query_map(params![config.id], |row| {
                let last_notified: Option<String> = row.get(6)?;
                Ok(CategoryBudget {
                    id: row.get(0)?,
                    category: row.get(1)?,
                    monthly_limit: row.get(2)?,
                    current_spend: row.get(3)?,
                    notified_80: row.get(4)?,
                    notified_100: row.get(5)?,
                    last_notified_at: last_notified.map(|s| parse_datetime(&s)),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(config))
    }

    /// Create or update a category budget (category names are unique per
    /// config, case-insensitively; an update keeps accumulated spend)
    pub fn upsert_category_budget(
        &self,
        user_id: &str,
        category: &str,
        monthly_limit: f64,
    ) -> Result<()> {
        if monthly_limit <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Monthly limit must be positive, got {}",
                monthly_limit
            )));
        }

        let config = self.get_or_create_budget_config(user_id)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO category_budgets (config_id, category, monthly_limit)
             VALUES (?, ?, ?)
             ON CONFLICT (config_id, category)
             DO UPDATE SET monthly_limit = excluded.monthly_limit",
            params![config.id, category, monthly_limit],
        )?;
        self.touch_budget_config(config.id)?;
        Ok(())
    }

    /// Remove a category budget
    pub fn remove_category_budget(&self, user_id: &str, category: &str) -> Result<()> {
        let config = self.get_or_create_budget_config(user_id)?;
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM category_budgets
             WHERE config_id = ? AND category = ?",
            params![config.id, category],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!(
                "No budget for category {} (user {})",
                category, user_id
            )));
        }
        self.touch_budget_config(config.id)?;
        Ok(())
    }

    /// Write back a category's spend and notification flags
    pub fn update_category_budget_state(&self, budget: &CategoryBudget) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE category_budgets SET current_spend = ?, notified_80 = ?,
             notified_100 = ?, last_notified_at = ? WHERE id = ?",
            params![
                budget.current_spend,
                budget.notified_80,
                budget.notified_100,
                budget.last_notified_at.map(format_datetime),
                budget.id,
            ],
        )?;
        Ok(())
    }

    /// Zero all spends and clear both notification flags for a user
    pub fn reset_budget_spending(&self, user_id: &str) -> Result<()> {
        let config = self.get_or_create_budget_config(user_id)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE category_budgets SET current_spend = 0, notified_80 = 0,
             notified_100 = 0, last_notified_at = NULL WHERE config_id = ?",
            params![config.id],
        )?;
        conn.execute(
            "UPDATE budget_configs SET last_reset_at = CURRENT_TIMESTAMP,
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![config.id],
        )?;
        Ok(())
    }

    /// Clear both notification flags without touching spend (month rollover)
    pub fn clear_threshold_flags(&self, config_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE category_budgets SET notified_80 = 0, notified_100 = 0
             WHERE config_id = ?",
            params![config_id],
        )?;
        self.touch_budget_config(config_id)?;
        Ok(())
    }

    /// Enable or disable threshold/summary notifications for a user
    pub fn set_notifications_enabled(&self, user_id: &str, enabled: bool) -> Result<()> {
        let config = self.get_or_create_budget_config(user_id)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budget_configs SET notifications_enabled = ?,
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![enabled, config.id],
        )?;
        Ok(())
    }

    /// Stamp the weekly-summary dispatch time
    pub fn mark_summary_sent(
        &self,
        config_id: i64,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budget_configs SET last_summary_sent_at = ? WHERE id = ?",
            params![format_datetime(at), config_id],
        )?;
        Ok(())
    }

    fn touch_budget_config(&self, config_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budget_configs SET updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![config_id],
        )?;
        Ok(())
    }
}
