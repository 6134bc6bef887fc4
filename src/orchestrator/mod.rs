//! Orchestrator: wires loading, matching, application, merge resolution and
//! exports into the three runs the CLI exposes.
//!
//! `reconcile` is the in-memory pipeline and does no IO; the `run_*`
//! functions add file handling around it.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::Path;

use crate::config::{AppConfig, MatchConfig, MergeApiConfig};
use crate::corrections::{DataIssue, RecordSource, log_prefix};
use crate::export::csv_export::{
    export_audit_csv, export_internal_csv, export_merge_plan_csv, export_unresolved_csv,
};
use crate::import::csv_import::{read_authoritative_csv, read_internal_csv};
use crate::matching::{
    AuthoritativeIndex, IdAllocator, MatchResult, apply_match, match_all, prepare_authoritative,
};
use crate::merge::client::{DryRunClient, HttpMergeClient, MergeClient, MergeReport, submit_merge_plan};
use crate::merge::{MergeInstruction, UnresolvedGroup, merge_plan, resolve_duplicate_groups};
use crate::models::{AuthoritativeColumns, AuthoritativeRecord, InternalColumns, InternalRecord};
use crate::normalize::normalize_internal;

pub mod summary;

use summary::{RunStats, render_report};

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Internal records as read.
    pub original: Vec<InternalRecord>,
    /// Internal records after applying accepted matches.
    pub records: Vec<InternalRecord>,
    pub results: Vec<MatchResult>,
    pub issues: Vec<DataIssue>,
    pub merge_plan: Vec<MergeInstruction>,
    pub unresolved: Vec<UnresolvedGroup>,
    pub stats: RunStats,
}

fn log_result(result: &MatchResult, record: &InternalRecord, apply: bool) {
    let who = format!(
        "row {} {}, {} ({})",
        record.row, record.family_name, record.given_name, record.date_of_birth
    );
    match &result.matched {
        Some(m) if !result.requires_review => log::info!(
            "{}{} - {} -> {} [{} {} {}]",
            log_prefix(&result.corrections),
            if apply { "UPDATED" } else { "MATCHED" },
            who,
            m.custom_identifier,
            result.strategy_label(),
            result.tier(),
            result.score()
        ),
        Some(m) => log::warn!(
            "{}MANUAL_REVIEW_REQUIRED - {} -> {} [{} {} {}]",
            log_prefix(&result.corrections),
            who,
            m.custom_identifier,
            result.strategy_label(),
            result.tier(),
            result.score()
        ),
        None => log::warn!("NO_MATCH - {}", who),
    }
}

/// Match every internal record, apply accepted results when `apply` is set and
/// resolve duplicate groups over the resulting identifiers.
pub fn reconcile(
    internal: Vec<InternalRecord>,
    authoritative: &[AuthoritativeRecord],
    cfg: &MatchConfig,
    apply: bool,
) -> ReconcileOutcome {
    let prepared = prepare_authoritative(authoritative, cfg);
    let mut issues = prepared.issues.clone();

    let normalized: Vec<_> = internal.par_iter().map(|r| normalize_internal(r, cfg)).collect();
    for n in &normalized {
        for failure in &n.parse_failures {
            issues.push(DataIssue::ParseFailure {
                source: RecordSource::Internal,
                row: n.row,
                failure: failure.clone(),
            });
        }
    }

    let index = AuthoritativeIndex::new(&prepared.records);
    log::info!(
        "Matching {} internal records against {} authoritative records",
        normalized.len(),
        index.len()
    );
    let results = match_all(&normalized, &index, cfg);

    let mut stats = RunStats::from_results(&results);
    stats.total_authoritative = authoritative.len();
    stats.national_id_corrections = prepared.national_id_corrections;
    stats.record_issues(&issues);

    // Sequential: identifier suffixes depend on input order
    let original = internal;
    let mut records = original.clone();
    let mut ids = IdAllocator::new(&cfg.suffix_separator);
    for (record, result) in records.iter_mut().zip(&results) {
        log_result(result, record, apply);
        if apply && apply_match(record, result, &mut ids) {
            stats.applied += 1;
        }
    }

    let (groups, unresolved) = resolve_duplicate_groups(&records, &cfg.suffix_separator);
    let plan = merge_plan(&groups);
    stats.merge_groups = groups.len();
    stats.unresolved_groups = unresolved.len();

    ReconcileOutcome {
        original,
        records,
        results,
        issues,
        merge_plan: plan,
        unresolved,
        stats,
    }
}

/// `patients.csv` -> `patients_updated.csv` next to the input.
pub fn default_output_path(input: &str, suffix: &str) -> String {
    let path = Path::new(input);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let name = format!("{}_{}.csv", stem, suffix);
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name).to_string_lossy().into_owned(),
        _ => name,
    }
}

pub fn run_reconcile(
    internal_path: &str,
    authoritative_path: &str,
    app: &AppConfig,
    internal_cols: &InternalColumns,
    authoritative_cols: &AuthoritativeColumns,
) -> Result<ReconcileOutcome> {
    let dataset = read_internal_csv(internal_path, internal_cols)
        .with_context(|| format!("Loading internal records from {}", internal_path))?;
    let authoritative = read_authoritative_csv(authoritative_path, authoritative_cols)
        .with_context(|| format!("Loading authoritative records from {}", authoritative_path))?;

    let export = &app.export;
    let outcome = reconcile(dataset.records, &authoritative, &app.matching, !export.audit_only);

    if !export.audit_only {
        let out = export
            .out_path
            .clone()
            .unwrap_or_else(|| default_output_path(internal_path, "updated"));
        export_internal_csv(&out, &dataset.headers, &outcome.records, internal_cols)
            .with_context(|| format!("Writing updated records to {}", out))?;
        log::info!("Wrote {} records to {}", outcome.records.len(), out);
    }
    if let Some(path) = &export.audit_csv_path {
        export_audit_csv(path, &outcome.results, &outcome.original)
            .with_context(|| format!("Writing audit CSV to {}", path))?;
        log::info!("Wrote audit CSV to {}", path);
    }
    if let Some(path) = &export.report_path {
        let text = render_report(
            &outcome.stats,
            &outcome.results,
            &outcome.original,
            &outcome.issues,
            &outcome.unresolved,
        );
        std::fs::write(path, text).with_context(|| format!("Writing report to {}", path))?;
        log::info!("Wrote report to {}", path);
    }
    for line in outcome.stats.summary_lines() {
        log::info!("{}", line);
    }
    Ok(outcome)
}

/// Resolve duplicate groups in an updated export and optionally write the plan and
/// the unresolved groups as CSV.
pub fn run_merge_plan(
    updated_path: &str,
    separator: &str,
    cols: &InternalColumns,
    plan_out: Option<&str>,
    unresolved_out: Option<&str>,
) -> Result<(Vec<MergeInstruction>, Vec<UnresolvedGroup>)> {
    let dataset = read_internal_csv(updated_path, cols)
        .with_context(|| format!("Loading updated records from {}", updated_path))?;
    let (groups, unresolved) = resolve_duplicate_groups(&dataset.records, separator);
    let plan = merge_plan(&groups);
    log::info!(
        "{} merge groups ({} instructions), {} unresolved",
        groups.len(),
        plan.len(),
        unresolved.len()
    );
    if let Some(path) = plan_out {
        export_merge_plan_csv(path, &plan).with_context(|| format!("Writing merge plan to {}", path))?;
    }
    if let Some(path) = unresolved_out {
        export_unresolved_csv(path, &unresolved)
            .with_context(|| format!("Writing unresolved groups to {}", path))?;
    }
    Ok((plan, unresolved))
}

pub fn run_merge(
    updated_path: &str,
    separator: &str,
    cols: &InternalColumns,
    api: &MergeApiConfig,
    dry_run: bool,
) -> Result<MergeReport> {
    let (plan, _unresolved) = run_merge_plan(updated_path, separator, cols, None, None)?;
    let client: Box<dyn MergeClient> = if dry_run {
        Box::new(DryRunClient)
    } else {
        Box::new(HttpMergeClient::new(api).context("Building merge API client")?)
    };
    let report = submit_merge_plan(client.as_ref(), &plan);
    log::info!(
        "Merge finished: {} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::confidence::ConfidenceTier;
    use std::io::Write;

    fn sample() -> (Vec<InternalRecord>, Vec<AuthoritativeRecord>) {
        let internal = vec![
            InternalRecord::new(0, "ROSSI", "MARIO", "M", "1985-03-15").with_external_id("12345"),
            InternalRecord::new(1, "SMITH", "JANE", "F", "1990-07-22").with_external_id("777-BIS"),
            InternalRecord::new(2, "VERDI", "GIUSEPPE", "M", "1813-10-10").with_external_id("12345-BIS"),
        ];
        let authoritative = vec![
            AuthoritativeRecord::new(0, "12345", "Mario", "Rossi", "MALE", "03/15/1985"),
            AuthoritativeRecord::new(1, "P002", "Jane", "Smith", "F", "1990-07-23"),
        ];
        (internal, authoritative)
    }

    #[test]
    fn reconcile_applies_and_counts() {
        let (internal, authoritative) = sample();
        let out = reconcile(internal, &authoritative, &MatchConfig::default(), true);
        assert_eq!(out.results.len(), 3);
        assert_eq!(out.results[0].tier(), ConfidenceTier::GoldStandard);
        assert_eq!(out.results[1].tier(), ConfidenceTier::Acceptable);
        assert!(!out.results[2].is_match());

        assert_eq!(out.records[0].family_name, "Rossi");
        assert_eq!(out.records[1].external_id, "P002");
        assert_eq!(out.records[1].date_of_birth, "1990-07-22");
        assert_eq!(out.original[1].external_id, "777-BIS");

        assert_eq!(out.stats.matched, 2);
        assert_eq!(out.stats.applied, 2);
        assert_eq!(out.stats.requires_review, 1);
        assert_eq!(out.stats.total_authoritative, 2);

        // 12345 + 12345-BIS form one group after application
        assert_eq!(out.merge_plan.len(), 1);
        assert_eq!(out.merge_plan[0].source_id, "12345-BIS");
        assert_eq!(out.merge_plan[0].target_id, "12345");
    }

    #[test]
    fn audit_only_leaves_records_untouched() {
        let (internal, authoritative) = sample();
        let out = reconcile(internal, &authoritative, &MatchConfig::default(), false);
        assert_eq!(out.records, out.original);
        assert_eq!(out.stats.applied, 0);
        assert_eq!(out.stats.matched, 2);
    }

    #[test]
    fn high_threshold_holds_fuzzy_for_review() {
        let (internal, authoritative) = sample();
        let cfg = MatchConfig {
            confidence_threshold: 0.9,
            ..MatchConfig::default()
        };
        let out = reconcile(internal, &authoritative, &cfg, true);
        assert!(out.results[1].requires_review);
        assert_eq!(out.records[1].external_id, "777-BIS");
        assert_eq!(out.stats.applied, 1);
    }

    #[test]
    fn internal_parse_failures_become_issues() {
        let internal = vec![InternalRecord::new(0, "ROSSI", "MARIO", "X", "03/04/1985")];
        let authoritative = vec![AuthoritativeRecord::new(0, "P1", "Mario", "Rossi", "M", "1985-03-04")];
        let out = reconcile(internal, &authoritative, &MatchConfig::default(), true);
        assert_eq!(out.stats.parse_failures, 2);
        assert!(!out.results[0].is_match());
    }

    #[test]
    fn default_output_path_sits_next_to_input() {
        assert_eq!(default_output_path("data/patients.csv", "updated"), "data/patients_updated.csv");
        assert_eq!(default_output_path("patients.csv", "updated"), "patients_updated.csv");
    }

    #[test]
    fn end_to_end_files() {
        let dir = tempfile::tempdir().unwrap();
        let internal_path = dir.path().join("internal.csv");
        let auth_path = dir.path().join("pms.csv");
        let mut f = std::fs::File::create(&internal_path).unwrap();
        writeln!(f, "family_name,given_name,middle_name,sex,dob,pms_id,practice_pms_id,dicom_id").unwrap();
        writeln!(f, "ROSSI,MARIO,,M,1985-03-15,12345,,").unwrap();
        writeln!(f, "ROSSI,MARIO,,M,1985-03-15,12345-BIS,,").unwrap();
        let mut f = std::fs::File::create(&auth_path).unwrap();
        writeln!(f, "custom_identifier,first_name,last_name,middle_initial,gender,dob,ssn").unwrap();
        writeln!(f, "12345,Mario,Rossi,,M,1985-03-15,").unwrap();

        let out_path = dir.path().join("updated.csv");
        let report_path = dir.path().join("report.txt");
        let mut app = AppConfig::default();
        app.export.out_path = Some(out_path.to_string_lossy().into_owned());
        app.export.report_path = Some(report_path.to_string_lossy().into_owned());

        let outcome = run_reconcile(
            internal_path.to_str().unwrap(),
            auth_path.to_str().unwrap(),
            &app,
            &InternalColumns::default(),
            &AuthoritativeColumns::default(),
        )
        .unwrap();
        assert_eq!(outcome.stats.applied, 2);
        let written = std::fs::read_to_string(&out_path).unwrap();
        assert!(written.starts_with("family_name,given_name,middle_name,sex,dob,pms_id"));
        assert!(written.contains("Rossi,Mario,,M,1985-03-15,12345,,12345\n"));
        assert!(written.contains("Rossi,Mario,,M,1985-03-15,12345-1,,12345-1\n"));
        assert!(std::fs::read_to_string(&report_path)
            .unwrap()
            .contains("PATIENT RECONCILIATION REPORT"));

        // The updated file is what the merge commands read
        let (plan, unresolved) =
            run_merge_plan(out_path.to_str().unwrap(), "-", &InternalColumns::default(), None, None).unwrap();
        assert!(unresolved.is_empty());
        assert_eq!(
            plan,
            vec![MergeInstruction {
                source_id: "12345-1".into(),
                target_id: "12345".into(),
            }]
        );

        let report = run_merge(
            out_path.to_str().unwrap(),
            "-",
            &InternalColumns::default(),
            &MergeApiConfig::default(),
            true,
        )
        .unwrap();
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].source_id, "12345-1");
    }

    #[test]
    fn duplicates_matched_to_one_record_become_a_merge_group() {
        let internal = vec![
            InternalRecord::new(0, "ROSSI", "MARIO", "M", "1985-03-15"),
            InternalRecord::new(1, "Rossi", "Mario", "MALE", "15/03/1985"),
            InternalRecord::new(2, "MARIO", "ROSSI", "M", "1985-03-15").with_external_id("OLD-BIS"),
        ];
        let authoritative = vec![AuthoritativeRecord::new(0, "12345", "Mario", "Rossi", "M", "1985-03-15")];
        let out = reconcile(internal, &authoritative, &MatchConfig::default(), true);
        assert_eq!(out.stats.applied, 3);
        let ids: Vec<_> = out.records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, ["12345", "12345-1", "12345-2"]);
        assert!(out.unresolved.is_empty());
        assert_eq!(out.stats.merge_groups, 1);
        let sources: Vec<_> = out.merge_plan.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(sources, ["12345-1", "12345-2"]);
        assert!(out.merge_plan.iter().all(|i| i.target_id == "12345"));
    }
}
