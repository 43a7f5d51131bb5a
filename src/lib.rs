//! Permissioned provenance ledger for agricultural batches.
//!
//! Tracks a batch from harvest through laboratory testing, processing and
//! recall, enforcing approved zones, seasonal harvest windows and per-grower
//! quotas, and records every accepted mutation in a hash-chained event log.

pub mod access;
pub mod batch;
pub mod config;
pub mod error;
pub mod event_log;
pub mod lab_report;
pub mod projection;
pub mod quota;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use batch::{Batch, BatchDraft, BatchStatus, BatchSummary, ProcessingStep};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use event_log::{EventKind, EventRecord, EventTag};
pub use lab_report::{LabReport, LabReportDraft, Measurements};
pub use service::LedgerService;
pub use types::{Role, TimeStamp};
