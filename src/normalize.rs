use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

use crate::config::MatchConfig;
use crate::models::{AuthoritativeRecord, InternalRecord, NormalizedAuthoritative, NormalizedInternal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Name,
    Gender,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailureReason {
    Empty,
    UnrecognizedGender,
    UnparseableDate,
    /// Both month-first and day-first readings are valid calendar dates.
    AmbiguousDate {
        month_first: NaiveDate,
        day_first: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub field: FieldKind,
    pub raw: String,
    pub reason: ParseFailureReason,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ParseFailureReason::Empty => write!(f, "{:?} is empty", self.field),
            ParseFailureReason::UnrecognizedGender => {
                write!(f, "unrecognized gender token '{}'", self.raw)
            }
            ParseFailureReason::UnparseableDate => write!(f, "unparseable date '{}'", self.raw),
            ParseFailureReason::AmbiguousDate {
                month_first,
                day_first,
            } => write!(
                f,
                "ambiguous date '{}' (month-first {}, day-first {})",
                self.raw, month_first, day_first
            ),
        }
    }
}

/// A canonical value plus the reason it could not be fully read, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub value: T,
    pub failure: Option<ParseFailure>,
}

impl<T> Normalized<T> {
    fn ok(value: T) -> Self {
        Self {
            value,
            failure: None,
        }
    }

    fn failed(value: T, field: FieldKind, raw: &str, reason: ParseFailureReason) -> Self {
        Self {
            value,
            failure: Some(ParseFailure {
                field,
                raw: raw.to_string(),
                reason,
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "MALE",
            Self::Female => "FEMALE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Single-letter form used by exports that store `M`/`F`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Unknown => "U",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn normalize_gender(raw: &str) -> Normalized<Gender> {
    let token = raw.trim();
    if token.is_empty() {
        return Normalized::failed(Gender::Unknown, FieldKind::Gender, raw, ParseFailureReason::Empty);
    }
    match token.to_ascii_uppercase().as_str() {
        "M" | "MALE" => Normalized::ok(Gender::Male),
        "F" | "FEMALE" => Normalized::ok(Gender::Female),
        _ => Normalized::failed(
            Gender::Unknown,
            FieldKind::Gender,
            raw,
            ParseFailureReason::UnrecognizedGender,
        ),
    }
}

/// Strip diacritics, uppercase and collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    let folded: String = input
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedName {
    /// Canonical name including any qualifier, e.g. `ROSSI BIS`.
    pub full: String,
    /// Canonical name with a trailing qualifier removed, e.g. `ROSSI`.
    pub base: String,
    pub suffix: Option<String>,
}

impl NormalizedName {
    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }
}

fn numeric_dash_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)\s*-\s*(\d+)$").expect("static regex"))
}

fn split_suffix(full: &str, suffix_tokens: &[String]) -> (String, Option<String>) {
    if let Some(caps) = numeric_dash_suffix().captures(full) {
        return (caps[1].to_string(), Some(caps[2].to_string()));
    }
    for sep in [' ', '-'] {
        if let Some((head, tail)) = full.rsplit_once(sep) {
            let head = head.trim_end_matches([' ', '-']);
            if !head.is_empty() && suffix_tokens.iter().any(|t| t.eq_ignore_ascii_case(tail)) {
                return (head.to_string(), Some(tail.to_string()));
            }
        }
    }
    (full.to_string(), None)
}

pub fn normalize_name(raw: &str, suffix_tokens: &[String]) -> Normalized<NormalizedName> {
    let full = normalize_text(raw);
    if full.is_empty() {
        return Normalized::failed(
            NormalizedName::default(),
            FieldKind::Name,
            raw,
            ParseFailureReason::Empty,
        );
    }
    let (base, suffix) = split_suffix(&full, suffix_tokens);
    Normalized::ok(NormalizedName { full, base, suffix })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateValue {
    Known(NaiveDate),
    /// Carried through unresolved; never compared as equal to anything.
    Ambiguous {
        month_first: NaiveDate,
        day_first: NaiveDate,
    },
    #[default]
    Unknown,
}

impl DateValue {
    pub fn known(&self) -> Option<NaiveDate> {
        match self {
            Self::Known(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Ambiguous {
                month_first,
                day_first,
            } => write!(f, "AMBIGUOUS({}|{})", month_first, day_first),
            Self::Unknown => Ok(()),
        }
    }
}

/// Parse ISO, then `NN/NN/YYYY` (US and European readings), then `YYYY/MM/DD`.
pub fn normalize_date(raw: &str) -> Normalized<DateValue> {
    let s = raw.trim();
    if s.is_empty() {
        return Normalized::failed(DateValue::Unknown, FieldKind::Date, raw, ParseFailureReason::Empty);
    }
    if let Some(d) = parse_with(s, '-', "%Y-%m-%d", 0) {
        return Normalized::ok(DateValue::Known(d));
    }
    let us = parse_with(s, '/', "%m/%d/%Y", 2);
    let eu = parse_with(s, '/', "%d/%m/%Y", 2);
    match (us, eu) {
        (Some(a), Some(b)) if a == b => return Normalized::ok(DateValue::Known(a)),
        (Some(a), Some(b)) => {
            return Normalized::failed(
                DateValue::Ambiguous {
                    month_first: a,
                    day_first: b,
                },
                FieldKind::Date,
                raw,
                ParseFailureReason::AmbiguousDate {
                    month_first: a,
                    day_first: b,
                },
            );
        }
        (Some(d), None) | (None, Some(d)) => return Normalized::ok(DateValue::Known(d)),
        (None, None) => {}
    }
    if let Some(d) = parse_with(s, '/', "%Y/%m/%d", 0) {
        return Normalized::ok(DateValue::Known(d));
    }
    Normalized::failed(
        DateValue::Unknown,
        FieldKind::Date,
        raw,
        ParseFailureReason::UnparseableDate,
    )
}

/// Parse only when the input has three `sep`-separated parts and the part at
/// `year_pos` is a four-digit year; chrono alone would accept `85` as year 85.
fn parse_with(s: &str, sep: char, fmt: &str, year_pos: usize) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    if parts[year_pos].len() != 4 {
        return None;
    }
    NaiveDate::parse_from_str(s, fmt).ok()
}

pub fn normalize_internal(record: &InternalRecord, cfg: &MatchConfig) -> NormalizedInternal {
    let family = normalize_name(&record.family_name, &cfg.known_suffix_tokens);
    let given = normalize_name(&record.given_name, &cfg.known_suffix_tokens);
    let gender = normalize_gender(&record.sex);
    let dob = normalize_date(&record.date_of_birth);
    let parse_failures = [family.failure, given.failure, gender.failure, dob.failure]
        .into_iter()
        .flatten()
        .collect();
    NormalizedInternal {
        row: record.row,
        family: family.value,
        given: given.value,
        gender: gender.value,
        dob: dob.value,
        parse_failures,
    }
}

pub fn normalize_authoritative(record: &AuthoritativeRecord, cfg: &MatchConfig) -> NormalizedAuthoritative {
    let first = normalize_name(&record.first_name, &cfg.known_suffix_tokens);
    let last = normalize_name(&record.last_name, &cfg.known_suffix_tokens);
    let gender = normalize_gender(&record.gender);
    let dob = normalize_date(&record.date_of_birth);
    let parse_failures = [first.failure, last.failure, gender.failure, dob.failure]
        .into_iter()
        .flatten()
        .collect();
    NormalizedAuthoritative {
        row: record.row,
        custom_identifier: record.custom_identifier.trim().to_string(),
        first: first.value,
        last: last.value,
        display_first: record.first_name.trim().to_string(),
        display_last: record.last_name.trim().to_string(),
        display_middle: record
            .middle_initial
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        gender: gender.value,
        dob: dob.value,
        national_id: record
            .national_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        national_id_correction: None,
        national_id_warnings: Vec::new(),
        parse_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> Vec<String> {
        MatchConfig::default().known_suffix_tokens
    }

    #[test]
    fn text_diacritics_case_and_spacing() {
        assert_eq!(normalize_text("  José   María "), "JOSE MARIA");
        assert_eq!(normalize_text("Niccolò"), "NICCOLO");
        assert_eq!(normalize_text("d'Angelo"), "D'ANGELO");
    }

    #[test]
    fn name_suffix_tokens_are_split_off() {
        let n = normalize_name("Rossi bis", &tokens()).value;
        assert_eq!(n.full, "ROSSI BIS");
        assert_eq!(n.base, "ROSSI");
        assert_eq!(n.suffix.as_deref(), Some("BIS"));

        let n = normalize_name("Bianchi-TRIS", &tokens()).value;
        assert_eq!(n.base, "BIANCHI");
        assert_eq!(n.suffix.as_deref(), Some("TRIS"));
    }

    #[test]
    fn name_numeric_dash_suffix() {
        let n = normalize_name("Verdi - 2", &tokens()).value;
        assert_eq!(n.base, "VERDI");
        assert_eq!(n.suffix.as_deref(), Some("2"));
    }

    #[test]
    fn name_without_suffix_and_lone_token() {
        let n = normalize_name("De Luca", &tokens()).value;
        assert_eq!(n.base, "DE LUCA");
        assert!(n.suffix.is_none());
        // A name that is only a qualifier token keeps it as the name
        let n = normalize_name("Bis", &tokens()).value;
        assert_eq!(n.base, "BIS");
        assert!(n.suffix.is_none());
    }

    #[test]
    fn empty_name_reports_failure() {
        let n = normalize_name("   ", &tokens());
        assert!(!n.is_valid());
        assert!(n.value.is_empty());
    }

    #[test]
    fn name_idempotent() {
        for raw in ["ROSSI", "ROSSI BIS", "DE LUCA", "VERDI-2"] {
            let once = normalize_name(raw, &tokens()).value;
            let twice = normalize_name(&once.full, &tokens()).value;
            assert_eq!(once, twice, "{}", raw);
        }
    }

    #[test]
    fn gender_tokens() {
        assert_eq!(normalize_gender("m").value, Gender::Male);
        assert_eq!(normalize_gender(" Female ").value, Gender::Female);
        let g = normalize_gender("maschio");
        assert_eq!(g.value, Gender::Unknown);
        assert!(!g.is_valid());
        assert_eq!(normalize_gender("").value, Gender::Unknown);
    }

    #[test]
    fn gender_idempotent() {
        for g in [Gender::Male, Gender::Female] {
            assert_eq!(normalize_gender(g.as_str()).value, g);
            assert_eq!(normalize_gender(g.code()).value, g);
        }
    }

    #[test]
    fn date_formats() {
        let d = NaiveDate::from_ymd_opt(1985, 3, 15).unwrap();
        assert_eq!(normalize_date("1985-03-15").value, DateValue::Known(d));
        assert_eq!(normalize_date("03/15/1985").value, DateValue::Known(d));
        assert_eq!(normalize_date("15/03/1985").value, DateValue::Known(d));
        assert_eq!(normalize_date("1985/03/15").value, DateValue::Known(d));
    }

    #[test]
    fn ambiguous_date_is_not_guessed() {
        let n = normalize_date("03/04/1985");
        assert!(n.value.known().is_none());
        assert!(matches!(
            n.failure.as_ref().map(|f| &f.reason),
            Some(ParseFailureReason::AmbiguousDate { .. })
        ));
        // Same reading either way is not ambiguous
        let n = normalize_date("05/05/1985");
        assert_eq!(n.value.known(), NaiveDate::from_ymd_opt(1985, 5, 5));
        assert!(n.is_valid());
    }

    #[test]
    fn invalid_dates_yield_unknown() {
        for raw in ["1985-02-30", "31/31/1985", "yesterday", "85-03-15", "03/15/85"] {
            let n = normalize_date(raw);
            assert_eq!(n.value, DateValue::Unknown, "{}", raw);
            assert!(!n.is_valid());
        }
    }

    #[test]
    fn date_idempotent() {
        let once = normalize_date("22/07/1990").value;
        let twice = normalize_date(&once.to_string()).value;
        assert_eq!(once, twice);
    }
}
