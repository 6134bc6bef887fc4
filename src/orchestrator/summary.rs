//! Run statistics and the plain-text audit report.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::corrections::{CorrectionKind, DataIssue};
use crate::matching::MatchResult;
use crate::matching::confidence::ConfidenceTier;
use crate::matching::strategies::Strategy;
use crate::merge::UnresolvedGroup;
use crate::models::InternalRecord;

const REVIEW_PREVIEW: usize = 10;

/// Totals folded from per-record results after the parallel match phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total_internal: usize,
    pub total_authoritative: usize,
    pub matched: usize,
    /// Matched and above the review threshold.
    pub auto_matched: usize,
    pub applied: usize,
    pub requires_review: usize,
    pub unmatched: usize,
    pub by_tier: BTreeMap<ConfidenceTier, usize>,
    pub by_strategy: BTreeMap<Strategy, usize>,
    pub by_correction: BTreeMap<CorrectionKind, usize>,
    pub parse_failures: usize,
    pub structural_violations: usize,
    pub national_id_corrections: usize,
    pub merge_groups: usize,
    pub unresolved_groups: usize,
}

impl RunStats {
    pub fn from_results(results: &[MatchResult]) -> Self {
        results.iter().fold(Self::default(), |mut s, r| {
            s.total_internal += 1;
            *s.by_tier.entry(r.tier()).or_default() += 1;
            if let Some(strategy) = r.strategy {
                s.matched += 1;
                *s.by_strategy.entry(strategy).or_default() += 1;
            } else {
                s.unmatched += 1;
            }
            if r.requires_review {
                s.requires_review += 1;
            } else if r.is_match() {
                s.auto_matched += 1;
            }
            for e in &r.corrections {
                *s.by_correction.entry(e.kind).or_default() += 1;
            }
            s
        })
    }

    pub fn record_issues(&mut self, issues: &[DataIssue]) {
        for issue in issues {
            match issue {
                DataIssue::ParseFailure { .. } => self.parse_failures += 1,
                DataIssue::StructuralViolation { .. } => self.structural_violations += 1,
            }
        }
    }

    fn rate(&self, n: usize) -> f64 {
        if self.total_internal == 0 {
            0.0
        } else {
            n as f64 * 100.0 / self.total_internal as f64
        }
    }

    pub fn match_rate(&self) -> f64 {
        self.rate(self.matched)
    }

    pub fn auto_match_rate(&self) -> f64 {
        self.rate(self.auto_matched)
    }

    /// Short multi-line summary for the log.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Internal records: {} | Authoritative records: {}",
                self.total_internal, self.total_authoritative
            ),
            format!(
                "Matched: {} ({:.1}%) | Applied: {} | Manual review: {} | No match: {}",
                self.matched,
                self.match_rate(),
                self.applied,
                self.requires_review,
                self.unmatched
            ),
            format!(
                "Auto-match rate: {:.1}% | National-ID gender corrections: {} | Merge groups: {} ({} unresolved)",
                self.auto_match_rate(),
                self.national_id_corrections,
                self.merge_groups,
                self.unresolved_groups
            ),
        ];
        for tier in ConfidenceTier::ALL {
            lines.push(format!("  {:<14} {}", tier.as_str(), self.by_tier.get(&tier).copied().unwrap_or(0)));
        }
        lines
    }
}

/// Render the audit report: totals, tier and correction breakdowns, the head of the
/// review queue and any merge groups that could not be resolved.
pub fn render_report(
    stats: &RunStats,
    results: &[MatchResult],
    records: &[InternalRecord],
    issues: &[DataIssue],
    unresolved: &[UnresolvedGroup],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PATIENT RECONCILIATION REPORT");
    let _ = writeln!(out, "Generated: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out);
    for line in stats.summary_lines() {
        let _ = writeln!(out, "{}", line);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Strategies:");
    for strategy in Strategy::ORDERED {
        let n = stats.by_strategy.get(&strategy).copied().unwrap_or(0);
        let _ = writeln!(out, "  {:<14} {:>6}  {}", strategy.as_str(), n, strategy.description());
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Corrections:");
    for kind in CorrectionKind::ALL {
        let n = stats.by_correction.get(&kind).copied().unwrap_or(0);
        let _ = writeln!(out, "  {:<28} {}", kind.as_str(), n);
    }
    let _ = writeln!(
        out,
        "Data issues: {} parse failures, {} structural violations",
        stats.parse_failures, stats.structural_violations
    );
    for issue in issues {
        let _ = writeln!(out, "  {}", issue);
    }

    let review: Vec<&MatchResult> = results.iter().filter(|r| r.requires_review).collect();
    let _ = writeln!(out);
    let _ = writeln!(out, "Manual review queue ({}):", review.len());
    for r in review.iter().take(REVIEW_PREVIEW) {
        let who = records
            .iter()
            .find(|rec| rec.row == r.internal_row)
            .map(|rec| format!("{}, {} ({})", rec.family_name, rec.given_name, rec.date_of_birth))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  row {}: {} - {} {} {}",
            r.internal_row,
            who,
            r.strategy_label(),
            r.tier(),
            r.score()
        );
    }
    if review.len() > REVIEW_PREVIEW {
        let _ = writeln!(out, "  ... and {} more", review.len() - REVIEW_PREVIEW);
    }

    if !unresolved.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Unresolved merge groups ({}):", unresolved.len());
        for g in unresolved {
            let _ = writeln!(out, "  {} {}: {}", g.base_id, g.reason, g.members.join(", "));
        }
    }
    out
}
