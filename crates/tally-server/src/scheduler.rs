//! Background schedulers for digest runs and budget month rollover
//!
//! Optional scheduled work enabled via environment variables:
//!
//! - `TALLY_DIGEST_SCHEDULE`: Interval in hours between digest runs (e.g.,
//!   "24" for daily). Digest creation is idempotent per user per week, so a
//!   daily interval is safe.
//! - `TALLY_ROLLOVER_SCHEDULE`: Interval in hours between month-rollover
//!   reconciliation sweeps (default: 24)

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use tally_core::ai::AiClient;
use tally_core::{BudgetLedger, Database, DigestAggregator, JobQueue};

/// Configuration for scheduled background work
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Interval between digest runs in hours
    pub digest_interval_hours: u64,
    /// Interval between rollover sweeps in hours
    pub rollover_interval_hours: u64,
}

impl ScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (TALLY_DIGEST_SCHEDULE not set)
    pub fn from_env() -> Option<Self> {
        let digest_interval_hours: u64 = std::env::var("TALLY_DIGEST_SCHEDULE")
            .ok()
            .and_then(|s| s.parse().ok())?;

        if digest_interval_hours == 0 {
            warn!("TALLY_DIGEST_SCHEDULE is 0, scheduled digests disabled");
            return None;
        }

        let rollover_interval_hours = std::env::var("TALLY_ROLLOVER_SCHEDULE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(24);

        Some(Self {
            digest_interval_hours,
            rollover_interval_hours,
        })
    }
}

/// Start the background schedulers
///
/// Spawns two tokio tasks that run indefinitely: digest aggregation for all
/// users, and month-rollover reconciliation of budget threshold flags.
pub fn start_schedulers(
    db: Database,
    ai: Option<AiClient>,
    jobs: JobQueue,
    ledger: BudgetLedger,
    config: ScheduleConfig,
) {
    info!(
        "Starting schedulers: digests every {}h, rollover sweep every {}h",
        config.digest_interval_hours, config.rollover_interval_hours
    );

    let aggregator = DigestAggregator::new(db.clone(), ai, jobs);
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.digest_interval_hours * 3600));

        // Skip the first immediate tick - we don't want a digest run on startup
        ticker.tick().await;

        loop {
            ticker.tick().await;

            info!("Running scheduled digest aggregation...");
            match aggregator.run_for_all_users().await {
                Ok(results) => {
                    info!(
                        processed = results.users_processed,
                        created = results.digests_created,
                        failed = results.users_failed,
                        "Scheduled digest run completed"
                    );
                }
                Err(e) => {
                    error!("Scheduled digest run failed: {}", e);
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.rollover_interval_hours * 3600));
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match run_rollover_sweep(&db, &ledger) {
                Ok(users) => {
                    info!(users = users, "Rollover sweep completed");
                }
                Err(e) => {
                    error!("Rollover sweep failed: {}", e);
                }
            }
        }
    });
}

/// Reconcile month rollover for every known user
fn run_rollover_sweep(db: &Database, ledger: &BudgetLedger) -> tally_core::Result<usize> {
    let users = db.list_user_ids()?;
    let count = users.len();

    for user_id in users {
        if let Err(e) = ledger.reconcile_month_rollover(&user_id) {
            warn!(user_id = %user_id, error = %e, "Rollover reconciliation failed for user");
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test, not several: parallel test threads share the process
    // environment, so all TALLY_DIGEST_SCHEDULE cases run sequentially here.
    #[test]
    fn test_config_from_env() {
        std::env::remove_var("TALLY_DIGEST_SCHEDULE");
        assert!(ScheduleConfig::from_env().is_none());

        std::env::set_var("TALLY_DIGEST_SCHEDULE", "0");
        assert!(ScheduleConfig::from_env().is_none());

        std::env::set_var("TALLY_DIGEST_SCHEDULE", "24");
        let config = ScheduleConfig::from_env().unwrap();
        assert_eq!(config.digest_interval_hours, 24);
        assert_eq!(config.rollover_interval_hours, 24);

        std::env::remove_var("TALLY_DIGEST_SCHEDULE");
    }
}
