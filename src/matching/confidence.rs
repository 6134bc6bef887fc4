use serde::Serialize;
use std::fmt;

use super::strategies::Strategy;
use crate::config::{MatchConfig, ScoringConfig};
use crate::corrections::CorrectionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    GoldStandard,
    High,
    Moderate,
    Acceptable,
    ManualReview,
}

impl ConfidenceTier {
    pub const ALL: [ConfidenceTier; 5] = [
        ConfidenceTier::GoldStandard,
        ConfidenceTier::High,
        ConfidenceTier::Moderate,
        ConfidenceTier::Acceptable,
        ConfidenceTier::ManualReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoldStandard => "GOLD_STANDARD",
            Self::High => "HIGH",
            Self::Moderate => "MODERATE",
            Self::Acceptable => "ACCEPTABLE",
            Self::ManualReview => "MANUAL_REVIEW",
        }
    }

    /// Inclusive score range of the tier.
    pub fn range(&self) -> (u8, u8) {
        match self {
            Self::GoldStandard => (100, 100),
            Self::High => (95, 99),
            Self::Moderate => (80, 95),
            Self::Acceptable => (70, 80),
            Self::ManualReview => (0, 0),
        }
    }

    pub fn for_match(strategy: Strategy, corrections: &[CorrectionEvent]) -> Self {
        match strategy {
            Strategy::Exact if corrections.is_empty() => Self::GoldStandard,
            Strategy::Exact | Strategy::Loose => Self::High,
            Strategy::NameFlip | Strategy::PartialName => Self::Moderate,
            Strategy::FuzzyDate => Self::Acceptable,
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Confidence {
    pub tier: ConfidenceTier,
    pub score: u8,
}

impl Confidence {
    pub fn no_match() -> Self {
        Self {
            tier: ConfidenceTier::ManualReview,
            score: 0,
        }
    }

    /// Tier maximum minus the per-correction penalties, never below the tier minimum.
    pub fn score(strategy: Strategy, corrections: &[CorrectionEvent], scoring: &ScoringConfig) -> Self {
        let tier = ConfidenceTier::for_match(strategy, corrections);
        let (min, max) = tier.range();
        let penalty: u32 = corrections
            .iter()
            .map(|e| u32::from(scoring.penalty(e.kind)))
            .sum();
        let score = u32::from(max).saturating_sub(penalty).max(u32::from(min));
        Self {
            tier,
            // Bounded by `max`
            score: u8::try_from(score).unwrap_or(max),
        }
    }

    pub fn requires_review(&self, cfg: &MatchConfig) -> bool {
        f64::from(self.score) < cfg.score_threshold()
    }
}
