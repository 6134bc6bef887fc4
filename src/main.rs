use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};

use patient_reconcile::cli::{Cli, Command};
use patient_reconcile::logging;
use patient_reconcile::models::{AuthoritativeColumns, InternalColumns};
use patient_reconcile::orchestrator::{default_output_path, run_merge, run_merge_plan, run_reconcile};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = cli.to_app_config().context("Invalid configuration")?;
    info!("patient_reconcile {}", env!("CARGO_PKG_VERSION"));
    let internal_cols = InternalColumns::default();

    match &cli.command {
        Command::Reconcile(a) => {
            let outcome = run_reconcile(
                &a.internal,
                &a.authoritative,
                &cfg,
                &internal_cols,
                &AuthoritativeColumns::default(),
            )?;
            if outcome.stats.requires_review > 0 {
                warn!(
                    "{} records need manual review",
                    outcome.stats.requires_review
                );
            }
        }
        Command::MergePlan(a) => {
            let plan_out = a
                .out
                .clone()
                .unwrap_or_else(|| default_output_path(&a.updated, "merge_plan"));
            let unresolved_out = a
                .unresolved
                .clone()
                .unwrap_or_else(|| default_output_path(&a.updated, "unresolved"));
            let (plan, unresolved) = run_merge_plan(
                &a.updated,
                &cfg.matching.suffix_separator,
                &internal_cols,
                Some(&plan_out),
                Some(&unresolved_out),
            )?;
            info!("Wrote {} merge instructions to {}", plan.len(), plan_out);
            if !unresolved.is_empty() {
                warn!(
                    "{} groups could not be resolved, see {}",
                    unresolved.len(),
                    unresolved_out
                );
            }
        }
        Command::Merge(a) => {
            if !a.dry_run {
                info!("Submitting merges to {}", cfg.merge.endpoint());
            }
            let report = run_merge(
                &a.updated,
                &cfg.matching.suffix_separator,
                &internal_cols,
                &cfg.merge,
                a.dry_run,
            )?;
            if !report.failed.is_empty() {
                bail!(
                    "{} of {} merges failed",
                    report.failed.len(),
                    report.attempted()
                );
            }
        }
    }
    Ok(())
}
