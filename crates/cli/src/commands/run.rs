//! `taxmate run`: Run one invoice through a pipeline variant in-process.

use std::path::PathBuf;
use std::sync::Arc;
use taxmate_config::AppConfig;
use taxmate_core::{ActorRole, Error, Result, SAMPLE_INVOICE, ThreadStatus, Variant};
use taxmate_engine::{GovernanceService, RunReport};

/// What to do if the run stops for approval.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum DecisionArg {
    Approve,
    Reject,
}

impl DecisionArg {
    fn approved(self) -> bool {
        matches!(self, DecisionArg::Approve)
    }
}

pub async fn run(
    variant: Variant,
    role: ActorRole,
    invoice: Option<PathBuf>,
    decision: Option<DecisionArg>,
) -> Result<()> {
    let config = AppConfig::load()?;
    if !config.has_api_key() {
        return Err(Error::config(super::serve::missing_key_message()));
    }

    let invoice_text = match invoice {
        Some(path) => std::fs::read_to_string(&path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to read invoice {}: {e}", path.display()))
        })?,
        None => SAMPLE_INVOICE.to_string(),
    };

    let collaborators = taxmate_providers::build_from_config(&config)?;
    let service = Arc::new(GovernanceService::new(
        &config,
        collaborators.proposer,
        collaborators.judge,
    )?);

    println!("TaxMate run: variant={variant} role={role}");
    println!();

    let report = service.start_run(&invoice_text, role, variant).await;
    print_report(&report);

    let report = match decision {
        Some(d) => resolve_all(&service, report, d).await?,
        None => report,
    };

    if report.status == ThreadStatus::SuspendedForApproval {
        println!();
        println!("Run is waiting for approval. Re-run with --decision approve|reject,");
        println!("or use the gateway's POST /resume with thread_id {}.", report.thread_id);
    }

    println!();
    println!("Ledger log:");
    let logs = service.get_logs();
    if logs.is_empty() {
        println!("   (empty)");
    }
    for entry in &logs {
        println!(
            "   #{} {} vendor={} amount={} account={} -> {}",
            entry.seq,
            entry.action,
            entry.vendor,
            entry.amount.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
            entry.account.as_deref().unwrap_or("-"),
            entry.outcome
        );
    }

    println!();
    println!("Audit:");
    let anomalies = service.audit();
    if anomalies.is_empty() {
        println!("   no anomalies");
    }
    for anomaly in &anomalies {
        println!(
            "   [{:?}] {:?} entry #{}: {}",
            anomaly.severity, anomaly.kind, anomaly.entry.seq, anomaly.details
        );
    }

    Ok(())
}

/// Apply `decision` to every suspension until the run stops asking.
///
/// A run may suspend more than once, once per gated turn.
pub async fn resolve_all(
    service: &GovernanceService,
    mut report: RunReport,
    decision: DecisionArg,
) -> Result<RunReport> {
    while report.status == ThreadStatus::SuspendedForApproval {
        println!();
        println!("Operator decision: {decision:?}");
        report = service
            .resume_run(&report.thread_id, decision.approved())
            .await?;
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &RunReport) {
    println!("Thread:  {}", report.thread_id);
    println!("Status:  {}", report.status);
    if let Some(outcome) = &report.outcome {
        println!("Outcome: {outcome:?}");
    }
    if let Some(action) = &report.pending_action {
        println!("Pending: {} {}", action.kind, action.arguments_json());
    }
    println!("Output:  {}", report.final_output);
}
