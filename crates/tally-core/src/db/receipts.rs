//! Receipt operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::currency::CurrencyResolution;
use crate::error::{Error, Result};
use crate::models::{ExtractedReceipt, InsightStatus, Receipt, ReceiptItem};

impl Database {
    /// Store an extracted receipt together with its currency resolution
    ///
    /// Raw extraction prices are parsed here; items whose price text is
    /// unreadable land with price 0 rather than being dropped.
    pub fn create_receipt(
        &self,
        user_id: &str,
        extracted: &ExtractedReceipt,
        resolution: &CurrencyResolution,
    ) -> Result<i64> {
        let items: Vec<ReceiptItem> = extracted
            .items
            .iter()
            .map(|item| {
                let mut receipt_item = ReceiptItem::new(&item.name, item.parsed_price().unwrap_or(0.0));
                if let Some(qty) = item.quantity {
                    receipt_item.quantity = qty;
                }
                receipt_item
            })
            .collect();

        let parse_amount =
            |raw: &Option<String>| raw.as_deref().and_then(crate::models::parse_price_text);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO receipts (user_id, merchant, receipt_date, category, items_json,
             subtotal, tax, total, currency, currency_evidence, currency_confidence, insight_status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
            params![
                user_id,
                extracted.merchant,
                extracted.date,
                extracted.category,
                serde_json::to_string(&items)?,
                parse_amount(&extracted.subtotal_amount),
                parse_amount(&extracted.tax_amount),
                parse_amount(&extracted.total_amount),
                resolution.currency,
                resolution.evidence,
                resolution.confidence,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get receipt by ID
    pub fn get_receipt(&self, id: i64) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, merchant, receipt_date, category, items_json,
                    subtotal, tax, total, currency, currency_evidence,
                    currency_confidence, insight_status, created_at
             FROM receipts WHERE id = ?",
        )?;

        let receipt = stmt
            .query_row(params![id], |row| Self::row_to_receipt(row))
            .optional()?;

        Ok(receipt)
    }

    /// Get receipt by ID, erroring when it does not exist
    pub fn require_receipt(&self, id: i64) -> Result<Receipt> {
        self.get_receipt(id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {} not found", id)))
    }

    /// List a user's receipts, newest first
    pub fn list_receipts(&self, user_id: &str) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, merchant, receipt_date, category, items_json,
                    subtotal, tax, total, currency, currency_evidence,
                    currency_confidence, insight_status, created_at
             FROM receipts WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )?;

        let receipts = stmt
            .query_map(params![user_id], |row| Self::row_to_receipt(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(receipts)
    }

    /// List a user's receipts created within the trailing `days` window
    pub fn list_recent_receipts(&self, user_id: &str, days: i64) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, merchant, receipt_date, category, items_json,
                    subtotal, tax, total, currency, currency_evidence,
                    currency_confidence, insight_status, created_at
             FROM receipts
             WHERE user_id = ? AND created_at >= datetime('now', '-' || ? || ' days')
             ORDER BY created_at DESC, id DESC",
        )?;

        let receipts = stmt
            .query_map(params![user_id, days], |row| Self::row_to_receipt(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(receipts)
    }

    /// Update a receipt's insight processing status
    pub fn update_insight_status(&self, id: i64, status: InsightStatus) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE receipts SET insight_status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Receipt {} not found", id)));
        }
        Ok(())
    }

    /// Persist the orchestrator's per-item annotations (category, recurring,
    /// insight text) back onto the receipt
    pub fn update_receipt_items(&self, id: i64, items: &[ReceiptItem]) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE receipts SET items_json = ? WHERE id = ?",
            params![serde_json::to_string(items)?, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Receipt {} not found", id)));
        }
        Ok(())
    }

    /// Apply a user's currency correction
    ///
    /// The correction is authoritative: evidence becomes "manually set" and
    /// confidence goes to 1.0 so the receipt is never flagged for review again.
    pub fn correct_currency(&self, id: i64, currency: &str) -> Result<()> {
        let standardized = crate::currency::standardize_currency(currency);
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE receipts SET currency = ?, currency_evidence = 'manually set',
             currency_confidence = 1.0 WHERE id = ?",
            params![standardized, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Receipt {} not found", id)));
        }
        Ok(())
    }

    /// Delete a receipt (insight items cascade)
    pub fn delete_receipt(&self, id: i64, user_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM receipts WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Receipt {} not found", id)));
        }
        Ok(())
    }

    /// Helper to convert a row to Receipt
    fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
        let receipt_date_str: Option<String> = row.get(3)?;
        let items_json: String = row.get(5)?;
        let status_str: String = row.get(12)?;
        let created_at_str: String = row.get(13)?;

        Ok(Receipt {
            id: row.get(0)?,
            user_id: row.get(1)?,
            merchant: row.get(2)?,
            receipt_date: receipt_date_str
                .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            category: row.get(4)?,
            items: serde_json::from_str(&items_json).unwrap_or_default(),
            subtotal: row.get(6)?,
            tax: row.get(7)?,
            total: row.get(8)?,
            currency: row.get(9)?,
            currency_evidence: row.get(10)?,
            currency_confidence: row.get(11)?,
            insight_status: status_str.parse().unwrap_or_default(),
            created_at: parse_datetime(&created_at_str),
        })
    }
}
