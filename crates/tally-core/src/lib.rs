//! Tally Core Library
//!
//! Shared functionality for the Tally receipt insight pipeline:
//! - Database access and migrations
//! - Currency resolution from messy extraction output
//! - Item categorization with keyword fallback and rate limiting
//! - Recurring purchase detection
//! - Per-category budget ledger with threshold alerts
//! - Per-receipt insight orchestration
//! - Weekly digest aggregation
//! - Pluggable AI backends (Ollama, mock)
//! - Channel-backed notification job queue

pub mod ai;
pub mod budget;
pub mod categorize;
pub mod currency;
pub mod db;
pub mod digest;
pub mod error;
pub mod insights;
pub mod jobs;
pub mod models;
pub mod recurrence;

pub use ai::{AiBackend, AiClient, ItemClassification, MockBackend, OllamaBackend};
pub use budget::{BudgetAnalytics, BudgetLedger, CategoryAnalytics};
pub use categorize::{ItemCategorizer, RateLimiter};
pub use currency::{resolve_currency, standardize_currency, CurrencyResolution};
pub use db::Database;
pub use digest::{DigestAggregator, DigestRunResults};
pub use error::{Error, Result};
pub use insights::{InsightEngine, ReceiptInsights};
pub use jobs::{Job, JobQueue, LogSink, NotificationSink, QueueConfig};
pub use recurrence::{RecurrenceScanner, RecurringGroup};
