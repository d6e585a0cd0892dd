//! Cross-domain user helpers for batch jobs

use super::Database;
use crate::error::Result;

impl Database {
    /// Distinct user ids that have any receipts (batch-job iteration order
    /// is stable: alphabetical)
    pub fn list_user_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT user_id FROM receipts
             UNION
             SELECT DISTINCT user_id FROM budget_configs
             ORDER BY user_id ASC",
        )?;

        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }
}
