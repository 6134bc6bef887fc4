//! Correction events and data-quality issues.
//!
//! A `CorrectionRecorder` is owned by exactly one match evaluation; nothing in
//! here is shared between records, so evaluations can run in parallel and the
//! audit totals are folded afterwards.

use serde::Serialize;
use std::fmt;

use crate::normalize::ParseFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionKind {
    Gender,
    Date,
    NameOrder,
    NamePartial,
    NationalIdGenderMismatch,
}

impl CorrectionKind {
    pub const ALL: [CorrectionKind; 5] = [
        CorrectionKind::Gender,
        CorrectionKind::Date,
        CorrectionKind::NameOrder,
        CorrectionKind::NamePartial,
        CorrectionKind::NationalIdGenderMismatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gender => "GENDER",
            Self::Date => "DATE",
            Self::NameOrder => "NAME_ORDER",
            Self::NamePartial => "NAME_PARTIAL",
            Self::NationalIdGenderMismatch => "NATIONAL_ID_GENDER_MISMATCH",
        }
    }

    /// Label used in log lines, e.g. `GENDER MISMATCH - DATE CORRECTION - UPDATED ...`.
    pub fn log_label(&self) -> &'static str {
        match self {
            Self::Gender => "GENDER MISMATCH",
            Self::Date => "DATE CORRECTION",
            Self::NameOrder => "NAME FLIP",
            Self::NamePartial => "PARTIAL NAME MATCH",
            Self::NationalIdGenderMismatch => "NATIONAL_ID_GENDER_ERROR",
        }
    }
}

impl fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrepancy and the value it was resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionEvent {
    pub kind: CorrectionKind,
    pub original: String,
    pub corrected: String,
}

impl CorrectionEvent {
    pub fn new(kind: CorrectionKind, original: impl Into<String>, corrected: impl Into<String>) -> Self {
        Self {
            kind,
            original: original.into(),
            corrected: corrected.into(),
        }
    }
}

impl fmt::Display for CorrectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: '{}' -> '{}'", self.kind, self.original, self.corrected)
    }
}

/// Append-only list of corrections for a single match decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionRecorder {
    events: Vec<CorrectionEvent>,
}

impl CorrectionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: CorrectionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[CorrectionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, kind: CorrectionKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    pub fn into_events(self) -> Vec<CorrectionEvent> {
        self.events
    }
}

/// `GENDER MISMATCH - NAME FLIP - ` style prefix for log lines; empty when nothing was corrected.
pub fn log_prefix(events: &[CorrectionEvent]) -> String {
    let labels: Vec<&str> = events.iter().map(|e| e.kind.log_label()).collect();
    if labels.is_empty() {
        String::new()
    } else {
        format!("{} - ", labels.join(" - "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordSource {
    Internal,
    Authoritative,
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::Authoritative => f.write_str("authoritative"),
        }
    }
}

/// Non-fatal data-quality problem. The record is isolated and counted, the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataIssue {
    /// A date or gender token could not be read; the field is carried as unknown.
    ParseFailure {
        source: RecordSource,
        row: usize,
        failure: ParseFailure,
    },
    /// Duplicate or missing keys, malformed national IDs and similar shape problems.
    StructuralViolation {
        source: RecordSource,
        row: usize,
        detail: String,
    },
}

impl DataIssue {
    pub fn row(&self) -> usize {
        match self {
            Self::ParseFailure { row, .. } | Self::StructuralViolation { row, .. } => *row,
        }
    }
}

impl fmt::Display for DataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailure {
                source,
                row,
                failure,
            } => write!(f, "PARSE_FAILURE {} row {}: {}", source, row, failure),
            Self::StructuralViolation {
                source,
                row,
                detail,
            } => write!(f, "STRUCTURAL_VIOLATION {} row {}: {}", source, row, detail),
        }
    }
}
