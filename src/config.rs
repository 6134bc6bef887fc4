use serde::{Deserialize, Serialize};

use crate::corrections::CorrectionKind;
use crate::error::ConfigError;

pub const DEFAULT_SUFFIX_TOKENS: [&str; 3] = ["BIS", "TRIS", "QUATER"];

/// Which kinds of date discrepancy the fuzzy-date strategy treats as "close".
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct FuzzyDateTolerance {
    /// One adjacent digit pair swapped in the YYYYMMDD form (19850315 vs 19850351).
    pub adjacent_transposition: bool,
    /// Day and month exchanged (1985-03-04 vs 1985-04-03).
    pub day_month_swap: bool,
    /// Same year and month, day off by at most this many days. 0 disables.
    pub max_day_difference: u32,
}

impl Default for FuzzyDateTolerance {
    fn default() -> Self {
        Self {
            adjacent_transposition: true,
            day_month_swap: true,
            max_day_difference: 1,
        }
    }
}

/// Score penalty subtracted from a tier's maximum for each correction of a kind.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ScoringConfig {
    pub gender_penalty: u8,
    pub national_id_gender_penalty: u8,
    pub name_order_penalty: u8,
    pub name_partial_penalty: u8,
    pub date_penalty: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            gender_penalty: 1,
            national_id_gender_penalty: 1,
            name_order_penalty: 2,
            name_partial_penalty: 10,
            date_penalty: 5,
        }
    }
}

impl ScoringConfig {
    pub fn penalty(&self, kind: CorrectionKind) -> u8 {
        match kind {
            CorrectionKind::Gender => self.gender_penalty,
            CorrectionKind::NationalIdGenderMismatch => self.national_id_gender_penalty,
            CorrectionKind::NameOrder => self.name_order_penalty,
            CorrectionKind::NamePartial => self.name_partial_penalty,
            CorrectionKind::Date => self.date_penalty,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct MatchConfig {
    /// 0.0..=1.0; results scoring below `threshold * 100` are held for manual review.
    pub confidence_threshold: f64,
    pub suffix_separator: String,
    pub known_suffix_tokens: Vec<String>,
    pub fuzzy_date: FuzzyDateTolerance,
    pub scoring: ScoringConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.70,
            suffix_separator: "-".into(),
            known_suffix_tokens: DEFAULT_SUFFIX_TOKENS.iter().map(|s| s.to_string()).collect(),
            fuzzy_date: FuzzyDateTolerance::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl MatchConfig {
    /// Threshold expressed on the 0..=100 score scale, rounded to strip float noise
    /// (0.7 * 100.0 must compare as exactly 70).
    pub fn score_threshold(&self) -> f64 {
        (self.confidence_threshold * 100.0 * 1e6).round() / 1e6
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeApiConfig {
    pub hostname: String,
    pub port: u16,
    pub token: String,
    pub accept_invalid_certs: bool,
    pub timeout_secs: u64,
}

impl Default for MergeApiConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".into(),
            port: 44389,
            token: String::new(),
            accept_invalid_certs: true,
            timeout_secs: 30,
        }
    }
}

impl MergeApiConfig {
    pub fn endpoint(&self) -> String {
        format!("https://{}:{}/api/message", self.hostname, self.port)
    }
}

impl std::fmt::Debug for MergeApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeApiConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ExportConfig {
    pub out_path: Option<String>,
    pub audit_csv_path: Option<String>,
    pub report_path: Option<String>,
    /// Skip writing updated rows; statistics and reports only.
    pub audit_only: bool,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    pub matching: MatchConfig,
    pub merge: MergeApiConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// Load a JSON config file; absent keys fall back to defaults.
    pub fn from_json_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Unreadable {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        if !(0.0..=1.0).contains(&m.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "matching.confidence_threshold",
                reason: format!("{} not in 0..=1", m.confidence_threshold),
            });
        }
        if m.suffix_separator.is_empty() {
            return Err(ConfigError::MissingField {
                field: "matching.suffix_separator",
            });
        }
        if m.known_suffix_tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "matching.known_suffix_tokens",
                reason: "tokens must be non-empty".into(),
            });
        }
        if m.fuzzy_date.max_day_difference > 31 {
            return Err(ConfigError::InvalidValue {
                field: "matching.fuzzy_date.max_day_difference",
                reason: format!("{} is larger than a month", m.fuzzy_date.max_day_difference),
            });
        }
        if self.merge.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "merge.port",
                reason: "must be > 0".into(),
            });
        }
        if self.merge.hostname.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "merge.hostname",
            });
        }
        Ok(())
    }
}
