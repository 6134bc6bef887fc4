use serde::Serialize;
use std::fmt;

use super::birthdate_matcher::dates_close;
use crate::config::FuzzyDateTolerance;
use crate::corrections::{CorrectionEvent, CorrectionKind, CorrectionRecorder};
use crate::models::{NormalizedAuthoritative, NormalizedInternal};

/// Matching strategies in evaluation order. The first strategy with any
/// qualifying candidate wins; later ones are never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    Exact,
    Loose,
    NameFlip,
    PartialName,
    FuzzyDate,
}

impl Strategy {
    pub const ORDERED: [Strategy; 5] = [
        Strategy::Exact,
        Strategy::Loose,
        Strategy::NameFlip,
        Strategy::PartialName,
        Strategy::FuzzyDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::Loose => "LOOSE",
            Self::NameFlip => "NAME_FLIP",
            Self::PartialName => "PARTIAL_NAME",
            Self::FuzzyDate => "FUZZY_DATE",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Exact => "Names, gender and birth date identical",
            Self::Loose => "Names and birth date identical, gender differs",
            Self::NameFlip => "Family and given names swapped, birth date identical",
            Self::PartialName => "Authoritative names lead the internal names, birth date identical",
            Self::FuzzyDate => "Names identical, birth date differs by a typo",
        }
    }

    /// How candidates are looked up for this strategy.
    pub fn lookup(&self) -> CandidateLookup {
        match self {
            Self::Exact | Self::Loose | Self::FuzzyDate => CandidateLookup::ByFamilyName,
            Self::NameFlip => CandidateLookup::ByGivenName,
            Self::PartialName => CandidateLookup::FullScan,
        }
    }

    /// Predicate and corrector in one step: `Some` with the implied corrections
    /// when `candidate` qualifies, `None` otherwise. Pure.
    pub fn evaluate(
        &self,
        internal: &NormalizedInternal,
        candidate: &NormalizedAuthoritative,
        tolerance: &FuzzyDateTolerance,
    ) -> Option<CorrectionRecorder> {
        if !internal.has_names() || candidate.first.is_empty() || candidate.last.is_empty() {
            return None;
        }
        let names_equal =
            internal.family.full == candidate.last.full && internal.given.full == candidate.first.full;
        let same_gender = internal.gender == candidate.gender;
        let same_date = match (internal.dob.known(), candidate.dob.known()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };

        let mut rec = CorrectionRecorder::new();
        match self {
            Self::Exact => {
                if !(names_equal && same_gender && same_date) {
                    return None;
                }
            }
            Self::Loose => {
                if !(names_equal && same_date && !same_gender) {
                    return None;
                }
                rec.record(gender_event(internal, candidate));
            }
            Self::NameFlip => {
                let flipped = internal.family.full == candidate.first.full
                    && internal.given.full == candidate.last.full;
                if !(flipped && same_date) || names_equal {
                    return None;
                }
                rec.record(CorrectionEvent::new(
                    CorrectionKind::NameOrder,
                    internal_display(internal),
                    authoritative_display(candidate),
                ));
                if !same_gender {
                    rec.record(gender_event(internal, candidate));
                }
            }
            Self::PartialName => {
                let leading = starts_with_word(&internal.family.base, &candidate.last.full)
                    && starts_with_word(&internal.given.base, &candidate.first.full);
                if !(leading && same_date) || names_equal {
                    return None;
                }
                rec.record(CorrectionEvent::new(
                    CorrectionKind::NamePartial,
                    internal_display(internal),
                    authoritative_display(candidate),
                ));
                if !same_gender {
                    rec.record(gender_event(internal, candidate));
                }
            }
            Self::FuzzyDate => {
                let (Some(ours), Some(theirs)) = (internal.dob.known(), candidate.dob.known()) else {
                    return None;
                };
                if !(names_equal && dates_close(ours, theirs, tolerance)) {
                    return None;
                }
                // Recorded as authoritative value -> internal value; the internal date is kept
                rec.record(CorrectionEvent::new(
                    CorrectionKind::Date,
                    candidate.dob.to_string(),
                    internal.dob.to_string(),
                ));
                if !same_gender {
                    rec.record(gender_event(internal, candidate));
                }
            }
        }
        Some(rec)
    }
}

/// `name` begins with the whole words of `prefix`: `ROSSI BIANCHI` starts with
/// `ROSSI`, `GROSSI` does not.
fn starts_with_word(name: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with([' ', '-']),
        None => false,
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateLookup {
    ByFamilyName,
    ByGivenName,
    FullScan,
}

fn gender_event(internal: &NormalizedInternal, candidate: &NormalizedAuthoritative) -> CorrectionEvent {
    CorrectionEvent::new(
        CorrectionKind::Gender,
        internal.gender.as_str(),
        candidate.gender.as_str(),
    )
}

fn internal_display(n: &NormalizedInternal) -> String {
    format!("{}, {}", n.family.full, n.given.full)
}

fn authoritative_display(n: &NormalizedAuthoritative) -> String {
    format!("{}, {}", n.last.full, n.first.full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::models::{AuthoritativeRecord, InternalRecord};
    use crate::normalize::{normalize_authoritative, normalize_internal};

    fn int(family: &str, given: &str, sex: &str, dob: &str) -> NormalizedInternal {
        normalize_internal(&InternalRecord::new(0, family, given, sex, dob), &MatchConfig::default())
    }

    fn auth(first: &str, last: &str, gender: &str, dob: &str) -> NormalizedAuthoritative {
        normalize_authoritative(
            &AuthoritativeRecord::new(0, "P1", first, last, gender, dob),
            &MatchConfig::default(),
        )
    }

    fn kinds(rec: &CorrectionRecorder) -> Vec<CorrectionKind> {
        rec.events().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn exact_requires_everything() {
        let t = FuzzyDateTolerance::default();
        let i = int("Rossi", "Mario", "M", "1985-03-15");
        let rec = Strategy::Exact.evaluate(&i, &auth("MARIO", "ROSSI", "MALE", "03/15/1985"), &t);
        assert_eq!(rec.map(|r| r.len()), Some(0));
        assert!(Strategy::Exact.evaluate(&i, &auth("MARIO", "ROSSI", "F", "1985-03-15"), &t).is_none());
    }

    #[test]
    fn loose_records_gender() {
        let t = FuzzyDateTolerance::default();
        let i = int("Rossi", "Mario", "F", "1985-03-15");
        let rec = Strategy::Loose
            .evaluate(&i, &auth("Mario", "Rossi", "M", "1985-03-15"), &t)
            .unwrap();
        assert_eq!(kinds(&rec), vec![CorrectionKind::Gender]);
        assert_eq!(rec.events()[0].original, "FEMALE");
        assert_eq!(rec.events()[0].corrected, "MALE");
        // Same gender is Exact territory, not Loose
        assert!(Strategy::Loose
            .evaluate(&i, &auth("Mario", "Rossi", "F", "1985-03-15"), &t)
            .is_none());
    }

    #[test]
    fn flip_with_and_without_gender() {
        let t = FuzzyDateTolerance::default();
        let i = int("Mario", "Rossi", "M", "1985-03-15");
        let rec = Strategy::NameFlip
            .evaluate(&i, &auth("Mario", "Rossi", "M", "1985-03-15"), &t)
            .unwrap();
        assert_eq!(kinds(&rec), vec![CorrectionKind::NameOrder]);
        assert_eq!(rec.events()[0].original, "MARIO, ROSSI");
        assert_eq!(rec.events()[0].corrected, "ROSSI, MARIO");

        let rec = Strategy::NameFlip
            .evaluate(&i, &auth("Mario", "Rossi", "F", "1985-03-15"), &t)
            .unwrap();
        assert_eq!(kinds(&rec), vec![CorrectionKind::NameOrder, CorrectionKind::Gender]);
    }

    #[test]
    fn partial_name_leading_words() {
        let t = FuzzyDateTolerance::default();
        let i = int("Rossi Bianchi", "Maria Luisa", "F", "1985-03-15");
        let rec = Strategy::PartialName
            .evaluate(&i, &auth("Maria", "Rossi", "F", "1985-03-15"), &t)
            .unwrap();
        assert_eq!(kinds(&rec), vec![CorrectionKind::NamePartial]);
        // Qualifier suffix is ignored for containment
        let i = int("Rossi bis", "Maria", "F", "1985-03-15");
        assert!(Strategy::PartialName
            .evaluate(&i, &auth("Maria", "Rossi", "F", "1985-03-15"), &t)
            .is_some());
        // Different date never qualifies
        assert!(Strategy::PartialName
            .evaluate(&i, &auth("Maria", "Rossi", "F", "1985-03-16"), &t)
            .is_none());
    }

    #[test]
    fn partial_name_ignores_inner_substrings() {
        let t = FuzzyDateTolerance::default();
        let i = int("Grossi", "Giovanna", "F", "1985-03-15");
        assert!(Strategy::PartialName
            .evaluate(&i, &auth("Anna", "Rossi", "F", "1985-03-15"), &t)
            .is_none());
        // A prefix that splits a word is not a leading name either
        let i = int("Rossini", "Maria", "F", "1985-03-15");
        assert!(Strategy::PartialName
            .evaluate(&i, &auth("Maria", "Rossi", "F", "1985-03-15"), &t)
            .is_none());
        assert!(starts_with_word("ROSSI-BIANCHI", "ROSSI"));
        assert!(!starts_with_word("ROSSI", ""));
    }

    #[test]
    fn fuzzy_date_event_direction() {
        let t = FuzzyDateTolerance::default();
        let i = int("Smith", "Jane", "F", "1990-07-22");
        let rec = Strategy::FuzzyDate
            .evaluate(&i, &auth("Jane", "Smith", "F", "1990-07-23"), &t)
            .unwrap();
        assert_eq!(kinds(&rec), vec![CorrectionKind::Date]);
        assert_eq!(rec.events()[0].original, "1990-07-23");
        assert_eq!(rec.events()[0].corrected, "1990-07-22");
    }

    #[test]
    fn unknown_or_ambiguous_dates_never_match() {
        let t = FuzzyDateTolerance::default();
        let i = int("Rossi", "Mario", "M", "03/04/1985");
        for s in Strategy::ORDERED {
            assert!(s.evaluate(&i, &auth("Mario", "Rossi", "M", "03/04/1985"), &t).is_none(), "{}", s);
        }
        let i = int("Rossi", "Mario", "M", "");
        assert!(Strategy::Exact.evaluate(&i, &auth("Mario", "Rossi", "M", ""), &t).is_none());
    }

    #[test]
    fn empty_names_never_match() {
        let t = FuzzyDateTolerance::default();
        let i = int("", "", "M", "1985-03-15");
        for s in Strategy::ORDERED {
            assert!(s.evaluate(&i, &auth("", "", "M", "1985-03-15"), &t).is_none());
        }
    }
}
