//! Ledger module for TaxMate: account state, permission enforcement,
//! and anomaly detection.
//!
//! Provides:
//! - **Ledger**: vendor accounts plus the append-only action log
//! - **Permission enforcement**: role check inside every mutation
//! - **Anomaly scanning**: blacklist and amount rules over the log
//! - **Sinks**: structured forwarding of log entries

pub mod ledger;
pub mod permission;
pub mod scanner;
pub mod sink;

pub use ledger::Ledger;
pub use permission::{PermissionCheck, PermissionEnforcer};
pub use scanner::AnomalyScanner;
pub use sink::{LedgerSink, TracingSink};
