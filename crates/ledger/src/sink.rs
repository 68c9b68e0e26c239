//! Ledger sinks: where log entries are forwarded as they are appended.

use taxmate_core::LogEntry;

/// Trait for ledger log sinks.
pub trait LedgerSink: Send + Sync {
    fn record(&self, entry: &LogEntry);
}

/// A tracing-based sink that emits every entry as an `AUDIT` event.
pub struct TracingSink;

impl LedgerSink for TracingSink {
    fn record(&self, entry: &LogEntry) {
        tracing::info!(
            seq = entry.seq,
            action = %entry.action,
            role = %entry.role,
            vendor = %entry.vendor,
            amount = ?entry.amount,
            account = ?entry.account,
            outcome = %entry.outcome,
            "AUDIT"
        );
    }
}
