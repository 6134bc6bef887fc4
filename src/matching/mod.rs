use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::config::MatchConfig;
use crate::corrections::{CorrectionEvent, CorrectionRecorder, DataIssue, RecordSource};
use crate::models::{AuthoritativeRecord, InternalRecord, NormalizedAuthoritative, NormalizedInternal};
use crate::national_id::validate_national_id_gender;
use crate::normalize::{Gender, normalize_authoritative};

pub mod birthdate_matcher;

// Scoring tiers and penalties
pub mod confidence;

// Ordered predicate/corrector strategies
pub mod strategies;

use confidence::{Confidence, ConfidenceTier};
use strategies::{CandidateLookup, Strategy};

/// The authoritative record a result points at, with the values applied on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRecord {
    pub row: usize,
    pub custom_identifier: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_initial: Option<String>,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub internal_row: usize,
    pub matched: Option<MatchedRecord>,
    pub strategy: Option<Strategy>,
    pub corrections: Vec<CorrectionEvent>,
    pub confidence: Confidence,
    pub requires_review: bool,
}

impl MatchResult {
    fn no_match(internal_row: usize) -> Self {
        Self {
            internal_row,
            matched: None,
            strategy: None,
            corrections: Vec::new(),
            confidence: Confidence::no_match(),
            requires_review: true,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }

    pub fn tier(&self) -> ConfidenceTier {
        self.confidence.tier
    }

    pub fn score(&self) -> u8 {
        self.confidence.score
    }

    pub fn strategy_label(&self) -> &'static str {
        self.strategy.map(|s| s.as_str()).unwrap_or("NO_MATCH")
    }
}

/// Normalized authoritative records plus the issues found while preparing them.
#[derive(Debug, Default)]
pub struct PreparedAuthoritative {
    pub records: Vec<NormalizedAuthoritative>,
    pub issues: Vec<DataIssue>,
    pub national_id_corrections: usize,
}

/// Normalize, drop rows without a custom identifier, flag duplicates and apply the
/// national-ID gender check. Input order is preserved.
pub fn prepare_authoritative(records: &[AuthoritativeRecord], cfg: &MatchConfig) -> PreparedAuthoritative {
    let normalized: Vec<NormalizedAuthoritative> = records
        .par_iter()
        .map(|r| normalize_authoritative(r, cfg))
        .collect();

    let mut out = PreparedAuthoritative::default();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for mut rec in normalized {
        for failure in rec.parse_failures.drain(..) {
            out.issues.push(DataIssue::ParseFailure {
                source: RecordSource::Authoritative,
                row: rec.row,
                failure,
            });
        }
        if rec.custom_identifier.is_empty() {
            log::warn!("MISSING_CUSTOM_IDENTIFIER - authoritative row {} excluded", rec.row);
            out.issues.push(DataIssue::StructuralViolation {
                source: RecordSource::Authoritative,
                row: rec.row,
                detail: "missing custom identifier; record excluded from matching".into(),
            });
            continue;
        }
        if let Some(first_row) = seen.get(&rec.custom_identifier) {
            log::warn!(
                "DUPLICATE_CUSTOM_IDENTIFIER - {} at rows {} and {}",
                rec.custom_identifier,
                first_row,
                rec.row
            );
            out.issues.push(DataIssue::StructuralViolation {
                source: RecordSource::Authoritative,
                row: rec.row,
                detail: format!(
                    "duplicate custom identifier {} (first seen at row {})",
                    rec.custom_identifier, first_row
                ),
            });
        } else {
            seen.insert(rec.custom_identifier.clone(), rec.row);
        }

        if validate_national_id_gender(&mut rec).is_some() {
            out.national_id_corrections += 1;
        }
        for w in &rec.national_id_warnings {
            out.issues.push(DataIssue::StructuralViolation {
                source: RecordSource::Authoritative,
                row: rec.row,
                detail: w.to_string(),
            });
        }
        out.records.push(rec);
    }
    out
}

/// Lookup structure over prepared authoritative records, keyed by canonical last name.
pub struct AuthoritativeIndex<'a> {
    records: &'a [NormalizedAuthoritative],
    by_last: HashMap<&'a str, Vec<usize>>,
}

impl<'a> AuthoritativeIndex<'a> {
    pub fn new(records: &'a [NormalizedAuthoritative]) -> Self {
        let mut by_last: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, r) in records.iter().enumerate() {
            if !r.last.is_empty() {
                by_last.entry(r.last.full.as_str()).or_default().push(i);
            }
        }
        Self { records, by_last }
    }

    pub fn records(&self) -> &'a [NormalizedAuthoritative] {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Candidate positions in input order.
    fn candidates<'s>(
        &'s self,
        lookup: CandidateLookup,
        internal: &NormalizedInternal,
    ) -> Box<dyn Iterator<Item = usize> + 's> {
        let key = match lookup {
            CandidateLookup::ByFamilyName => internal.family.full.as_str(),
            CandidateLookup::ByGivenName => internal.given.full.as_str(),
            CandidateLookup::FullScan => return Box::new(0..self.records.len()),
        };
        match self.by_last.get(key) {
            Some(positions) => Box::new(positions.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// Evaluate strategies in order and stop at the first one with any qualifying
/// candidate. Among several, the fewest implied corrections wins, then input order.
pub fn match_one(internal: &NormalizedInternal, index: &AuthoritativeIndex<'_>, cfg: &MatchConfig) -> MatchResult {
    if !internal.has_names() {
        return MatchResult::no_match(internal.row);
    }
    for strategy in Strategy::ORDERED {
        let mut best: Option<(usize, CorrectionRecorder)> = None;
        for pos in index.candidates(strategy.lookup(), internal) {
            let candidate = &index.records()[pos];
            let Some(found) = strategy.evaluate(internal, candidate, &cfg.fuzzy_date) else {
                continue;
            };
            let mut rec = CorrectionRecorder::new();
            if let Some(event) = &candidate.national_id_correction {
                rec.record(event.clone());
            }
            for event in found.into_events() {
                rec.record(event);
            }
            if best.as_ref().is_none_or(|(_, b)| rec.len() < b.len()) {
                best = Some((pos, rec));
            }
        }
        if let Some((pos, rec)) = best {
            let candidate = &index.records()[pos];
            let corrections = rec.into_events();
            let confidence = Confidence::score(strategy, &corrections, &cfg.scoring);
            return MatchResult {
                internal_row: internal.row,
                matched: Some(MatchedRecord {
                    row: candidate.row,
                    custom_identifier: candidate.custom_identifier.clone(),
                    first_name: candidate.display_first.clone(),
                    last_name: candidate.display_last.clone(),
                    middle_initial: candidate.display_middle.clone(),
                    gender: candidate.gender,
                }),
                strategy: Some(strategy),
                corrections,
                requires_review: confidence.requires_review(cfg),
                confidence,
            };
        }
    }
    MatchResult::no_match(internal.row)
}

/// One result per internal record, in input order.
pub fn match_all(internal: &[NormalizedInternal], index: &AuthoritativeIndex<'_>, cfg: &MatchConfig) -> Vec<MatchResult> {
    internal.par_iter().map(|n| match_one(n, index, cfg)).collect()
}

/// Keep the record's `M`/`MALE` token style when writing a corrected gender.
fn sex_token(current: &str, gender: Gender) -> String {
    if current.trim().chars().count() == 1 {
        gender.code().to_string()
    } else {
        gender.as_str().to_string()
    }
}

/// Hands out external identifiers while results are applied in input order.
/// The first record matched to a custom identifier gets it bare; later ones get
/// `<id><sep>1`, `<id><sep>2`, ... so duplicates surface as one merge group.
#[derive(Debug, Default)]
pub struct IdAllocator {
    separator: String,
    used: HashSet<String>,
}

impl IdAllocator {
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
            used: HashSet::new(),
        }
    }

    pub fn assign(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}{}", base, self.separator, n);
            if self.used.insert(candidate.clone()) {
                log::debug!("DUPLICATE_EXTERNAL_ID - {} already assigned, using {}", base, candidate);
                return candidate;
            }
            n += 1;
        }
    }
}

/// Copy the assigned identifier, names, middle initial and gender from the
/// matched authoritative record. The secondary id mirrors the new identifier and
/// the practice id is cleared. Results held for review or without a match are
/// never applied and consume no identifier. The birth date is left as recorded.
/// Returns whether anything changed.
pub fn apply_match(record: &mut InternalRecord, result: &MatchResult, ids: &mut IdAllocator) -> bool {
    if result.requires_review || result.internal_row != record.row {
        return false;
    }
    let Some(m) = &result.matched else {
        return false;
    };
    let assigned = ids.assign(&m.custom_identifier);

    let mut changed = false;
    let mut set = |field: &mut String, value: &str| {
        if field != value {
            *field = value.to_string();
            changed = true;
        }
    };
    set(&mut record.external_id, &assigned);
    set(&mut record.family_name, &m.last_name);
    set(&mut record.given_name, &m.first_name);
    if m.gender.is_known() {
        let token = sex_token(&record.sex, m.gender);
        set(&mut record.sex, &token);
    }

    let mut set_opt = |field: &mut Option<String>, value: Option<&str>| {
        if field.as_deref() != value {
            *field = value.map(str::to_string);
            changed = true;
        }
    };
    set_opt(&mut record.middle_name, m.middle_initial.as_deref());
    set_opt(&mut record.secondary_id, Some(assigned.as_str()));
    set_opt(&mut record.practice_external_id, None);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrections::CorrectionKind;
    use crate::normalize::normalize_internal;

    fn run(internal: &[InternalRecord], authoritative: &[AuthoritativeRecord]) -> Vec<MatchResult> {
        let cfg = MatchConfig::default();
        let prepared = prepare_authoritative(authoritative, &cfg);
        let index = AuthoritativeIndex::new(&prepared.records);
        let normalized: Vec<_> = internal.iter().map(|r| normalize_internal(r, &cfg)).collect();
        match_all(&normalized, &index, &cfg)
    }

    #[test]
    fn exact_match_is_gold() {
        let internal = [InternalRecord::new(0, "ROSSI", "MARIO", "M", "1985-03-15")];
        let auth = [AuthoritativeRecord::new(0, "P001", "Mario", "Rossi", "MALE", "03/15/1985")];
        let r = &run(&internal, &auth)[0];
        assert_eq!(r.strategy, Some(Strategy::Exact));
        assert_eq!(r.tier(), ConfidenceTier::GoldStandard);
        assert_eq!(r.score(), 100);
        assert!(r.corrections.is_empty());
        assert!(!r.requires_review);
        assert_eq!(r.matched.as_ref().map(|m| m.custom_identifier.as_str()), Some("P001"));
    }

    #[test]
    fn one_day_off_is_fuzzy_acceptable() {
        let internal = [InternalRecord::new(0, "SMITH", "JANE", "F", "1990-07-22")];
        let auth = [AuthoritativeRecord::new(0, "P002", "Jane", "Smith", "F", "1990-07-23")];
        let r = &run(&internal, &auth)[0];
        assert_eq!(r.strategy, Some(Strategy::FuzzyDate));
        assert_eq!(r.tier(), ConfidenceTier::Acceptable);
        assert_eq!(r.corrections.len(), 1);
        let e = &r.corrections[0];
        assert_eq!(e.kind, CorrectionKind::Date);
        assert_eq!((e.original.as_str(), e.corrected.as_str()), ("1990-07-23", "1990-07-22"));
    }

    #[test]
    fn earlier_strategy_wins_over_later() {
        let internal = [InternalRecord::new(0, "SMITH", "JANE", "F", "1990-07-22")];
        let auth = [
            AuthoritativeRecord::new(0, "FUZZY", "Jane", "Smith", "F", "1990-07-23"),
            AuthoritativeRecord::new(1, "EXACT", "Jane", "Smith", "F", "1990-07-22"),
        ];
        let r = &run(&internal, &auth)[0];
        assert_eq!(r.strategy, Some(Strategy::Exact));
        assert_eq!(r.matched.as_ref().map(|m| m.row), Some(1));
    }

    #[test]
    fn ties_prefer_fewest_corrections_then_input_order() {
        let internal = [InternalRecord::new(0, "SMITH", "JANE", "F", "1990-07-22")];
        let auth = [
            AuthoritativeRecord::new(0, "A", "Jane", "Smith", "M", "1990-07-23"),
            AuthoritativeRecord::new(1, "B", "Jane", "Smith", "F", "1990-07-21"),
            AuthoritativeRecord::new(2, "C", "Jane", "Smith", "F", "1990-07-23"),
        ];
        let r = &run(&internal, &auth)[0];
        assert_eq!(r.strategy, Some(Strategy::FuzzyDate));
        assert_eq!(r.matched.as_ref().map(|m| m.custom_identifier.as_str()), Some("B"));
    }

    #[test]
    fn no_candidate_goes_to_manual_review() {
        let internal = [InternalRecord::new(0, "VERDI", "GIUSEPPE", "M", "1813-10-10")];
        let auth = [AuthoritativeRecord::new(0, "P1", "Mario", "Rossi", "M", "1985-03-15")];
        let r = &run(&internal, &auth)[0];
        assert!(!r.is_match());
        assert_eq!(r.tier(), ConfidenceTier::ManualReview);
        assert_eq!(r.score(), 0);
        assert!(r.requires_review);
        assert_eq!(r.strategy_label(), "NO_MATCH");
    }

    #[test]
    fn national_id_correction_carried_into_result() {
        let internal = [InternalRecord::new(0, "ROSSI", "MARIA", "F", "1985-03-15")];
        let auth = [AuthoritativeRecord::new(0, "P1", "Maria", "Rossi", "M", "1985-03-15")
            .with_national_id("RSSMRA85C55H501Z")];
        let r = &run(&internal, &auth)[0];
        assert_eq!(r.strategy, Some(Strategy::Exact));
        assert_eq!(r.tier(), ConfidenceTier::High);
        assert_eq!(r.corrections[0].kind, CorrectionKind::NationalIdGenderMismatch);
    }

    #[test]
    fn flipped_names_are_moderate() {
        let internal = [InternalRecord::new(0, "MARIO", "ROSSI", "M", "1985-03-15")];
        let auth = [AuthoritativeRecord::new(0, "P1", "Mario", "Rossi", "M", "1985-03-15")];
        let r = &run(&internal, &auth)[0];
        assert_eq!(r.strategy, Some(Strategy::NameFlip));
        assert_eq!(r.tier(), ConfidenceTier::Moderate);
    }

    #[test]
    fn results_follow_input_order() {
        let internal: Vec<_> = (0..50)
            .map(|i| InternalRecord::new(i, &format!("NAME{}", i), "X", "M", "1985-03-15"))
            .collect();
        let auth = [AuthoritativeRecord::new(0, "P1", "X", "NAME7", "M", "1985-03-15")];
        let results = run(&internal, &auth);
        let rows: Vec<_> = results.iter().map(|r| r.internal_row).collect();
        assert_eq!(rows, (0..50).collect::<Vec<_>>());
        assert!(results[7].is_match());
        assert_eq!(results.iter().filter(|r| r.is_match()).count(), 1);
    }

    #[test]
    fn prepare_excludes_missing_ids_and_flags_duplicates() {
        let cfg = MatchConfig::default();
        let auth = [
            AuthoritativeRecord::new(0, "", "Mario", "Rossi", "M", "1985-03-15"),
            AuthoritativeRecord::new(1, "P1", "Mario", "Rossi", "M", "1985-03-15"),
            AuthoritativeRecord::new(2, "P1", "Maria", "Rossi", "F", "1985-03-15"),
        ];
        let prepared = prepare_authoritative(&auth, &cfg);
        assert_eq!(prepared.records.len(), 2);
        assert_eq!(prepared.issues.len(), 2);
        assert!(prepared
            .issues
            .iter()
            .all(|i| matches!(i, DataIssue::StructuralViolation { .. })));
    }

    #[test]
    fn apply_updates_names_id_and_gender_but_not_date() {
        let mut rec = InternalRecord::new(0, "ROSSI", "MARIA", "M", "1985-03-15").with_external_id("OLD");
        let internal = [rec.clone()];
        let auth = [AuthoritativeRecord::new(0, "P9", "Maria", "Rossi", "F", "1985-03-15")];
        let r = &run(&internal, &auth)[0];
        assert_eq!(r.strategy, Some(Strategy::Loose));
        assert!(apply_match(&mut rec, r, &mut IdAllocator::new("-")));
        assert_eq!(rec.external_id, "P9");
        assert_eq!(rec.family_name, "Rossi");
        assert_eq!(rec.given_name, "Maria");
        assert_eq!(rec.sex, "F");
        assert_eq!(rec.date_of_birth, "1985-03-15");
        // Applying again in a fresh run is a no-op
        assert!(!apply_match(&mut rec, r, &mut IdAllocator::new("-")));
    }

    #[test]
    fn apply_writes_middle_initial_and_secondary_ids() {
        let mut rec = InternalRecord::new(0, "ROSSI", "MARIO", "M", "1985-03-15").with_external_id("OLD123");
        rec.secondary_id = Some("OLD789".into());
        rec.practice_external_id = Some("PR1".into());
        let mut auth = AuthoritativeRecord::new(0, "P1", "Mario", "Rossi", "M", "1985-03-15");
        auth.middle_initial = Some(" D ".into());
        let r = &run(&[rec.clone()], &[auth])[0];
        assert!(apply_match(&mut rec, r, &mut IdAllocator::new("-")));
        assert_eq!(rec.external_id, "P1");
        assert_eq!(rec.middle_name.as_deref(), Some("D"));
        assert_eq!(rec.secondary_id.as_deref(), Some("P1"));
        assert_eq!(rec.practice_external_id, None);
    }

    #[test]
    fn later_matches_to_one_identifier_are_suffixed() {
        let internal = [
            InternalRecord::new(0, "ROSSI", "MARIO", "M", "1985-03-15").with_external_id("12345-BIS"),
            InternalRecord::new(1, "ROSSI", "MARIO", "M", "1985-03-15"),
            InternalRecord::new(2, "ROSSI", "MARIO", "M", "1985-03-15"),
        ];
        let auth = [AuthoritativeRecord::new(0, "12345", "Mario", "Rossi", "M", "1985-03-15")];
        let results = run(&internal, &auth);
        let mut ids = IdAllocator::new("-");
        let mut records = internal.to_vec();
        for (rec, r) in records.iter_mut().zip(&results) {
            apply_match(rec, r, &mut ids);
        }
        let assigned: Vec<_> = records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(assigned, ["12345", "12345-1", "12345-2"]);
        assert_eq!(records[2].secondary_id.as_deref(), Some("12345-2"));
    }

    #[test]
    fn allocator_skips_taken_suffixes() {
        let mut ids = IdAllocator::new("-");
        assert_eq!(ids.assign("7-1"), "7-1");
        assert_eq!(ids.assign("7"), "7");
        assert_eq!(ids.assign("7"), "7-2");
    }

    #[test]
    fn reviewed_results_are_not_applied() {
        let mut rec = InternalRecord::new(0, "ROSSI", "MARIO", "M", "1985-03-15");
        let r = MatchResult::no_match(0);
        let mut ids = IdAllocator::new("-");
        assert!(!apply_match(&mut rec, &r, &mut ids));
        assert_eq!(rec.family_name, "ROSSI");
        // Nothing was consumed
        assert_eq!(ids.assign("P1"), "P1");
    }
}
