//! Italian fiscal code (codice fiscale) decoding.
//!
//! Layout: 6 letters (surname/name), 2 year digits, 1 month letter, 2 day
//! digits (+40 for women), 4 chars birthplace, 1 check letter. Numeric
//! positions may carry omocodia substitution letters.

use chrono::{Datelike, NaiveDate};
use log::warn;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::corrections::{CorrectionEvent, CorrectionKind};
use crate::models::NormalizedAuthoritative;
use crate::normalize::Gender;

const MONTH_LETTERS: [char; 12] = ['A', 'B', 'C', 'D', 'E', 'H', 'L', 'M', 'P', 'R', 'S', 'T'];
const FEMALE_DAY_OFFSET: u32 = 40;

fn shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Z]{6}[0-9LMNPQRSTUV]{2}[A-Z][0-9LMNPQRSTUV]{2}[A-Z][0-9LMNPQRSTUV]{3}[A-Z]$")
            .expect("static regex")
    })
}

/// Omocodia substitution letter to the digit it replaces.
fn omocodia() -> &'static HashMap<char, char> {
    static MAP: OnceLock<HashMap<char, char>> = OnceLock::new();
    MAP.get_or_init(|| {
        "LMNPQRSTUV"
            .chars()
            .zip('0'..='9')
            .collect()
    })
}

fn recover_number(chars: &[char]) -> Option<u32> {
    chars.iter().try_fold(0u32, |acc, c| {
        let digit = if c.is_ascii_digit() {
            *c
        } else {
            *omocodia().get(c)?
        };
        Some(acc * 10 + digit.to_digit(10)?)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NationalIdWarning {
    Malformed { code: String },
    InvalidMonth { code: String, letter: char },
    InvalidDay { code: String, value: u32 },
    BirthDateDisagrees { code: String, recorded: NaiveDate },
}

impl fmt::Display for NationalIdWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { code } => write!(f, "national ID '{}' is not a well-formed fiscal code", code),
            Self::InvalidMonth { code, letter } => {
                write!(f, "national ID '{}' has invalid month letter '{}'", code, letter)
            }
            Self::InvalidDay { code, value } => {
                write!(f, "national ID '{}' has day field {} outside 1-31 and 41-71", code, value)
            }
            Self::BirthDateDisagrees { code, recorded } => {
                write!(f, "national ID '{}' does not encode the recorded birth date {}", code, recorded)
            }
        }
    }
}

/// Fields recoverable from a well-formed fiscal code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalCode {
    pub gender: Gender,
    pub day: u32,
    pub month: u32,
    pub year_two_digits: u32,
}

/// Uppercase and drop spaces, dashes and underscores.
pub fn clean_national_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn decode_fiscal_code(raw: &str) -> Result<FiscalCode, NationalIdWarning> {
    let code = clean_national_id(raw);
    if !shape().is_match(&code) {
        return Err(NationalIdWarning::Malformed { code });
    }
    let chars: Vec<char> = code.chars().collect();

    let month_letter = chars[8];
    let month = MONTH_LETTERS
        .iter()
        .position(|m| *m == month_letter)
        .map(|i| i as u32 + 1)
        .ok_or_else(|| NationalIdWarning::InvalidMonth {
            code: code.clone(),
            letter: month_letter,
        })?;

    let (Some(year_two_digits), Some(day_value)) = (recover_number(&chars[6..8]), recover_number(&chars[9..11]))
    else {
        return Err(NationalIdWarning::Malformed { code });
    };

    let (gender, day) = match day_value {
        1..=31 => (Gender::Male, day_value),
        41..=71 => (Gender::Female, day_value - FEMALE_DAY_OFFSET),
        _ => {
            return Err(NationalIdWarning::InvalidDay {
                code,
                value: day_value,
            });
        }
    };

    Ok(FiscalCode {
        gender,
        day,
        month,
        year_two_digits,
    })
}

/// Derive the gender from the record's national ID and override the stored
/// gender when they disagree. Returns the correction when one was applied.
/// Malformed codes and birth-date disagreements are kept as warnings on the
/// record and never change it.
pub fn validate_national_id_gender(record: &mut NormalizedAuthoritative) -> Option<CorrectionEvent> {
    let raw = record.national_id.clone()?;
    let decoded = match decode_fiscal_code(&raw) {
        Ok(d) => d,
        Err(w) => {
            warn!("MALFORMED_NATIONAL_ID - {} ({})", w, record.custom_identifier);
            record.national_id_warnings.push(w);
            return None;
        }
    };

    if let Some(recorded) = record.dob.known() {
        let agrees = recorded.day() == decoded.day
            && recorded.month() == decoded.month
            && recorded.year().rem_euclid(100) as u32 == decoded.year_two_digits;
        if !agrees {
            let w = NationalIdWarning::BirthDateDisagrees {
                code: clean_national_id(&raw),
                recorded,
            };
            warn!("NATIONAL_ID_BIRTH_DATE_MISMATCH - {} ({})", w, record.custom_identifier);
            record.national_id_warnings.push(w);
        }
    }

    if decoded.gender == record.gender {
        return None;
    }
    let event = CorrectionEvent::new(
        CorrectionKind::NationalIdGenderMismatch,
        record.gender.as_str(),
        decoded.gender.as_str(),
    );
    warn!(
        "NATIONAL_ID_GENDER_MISMATCH - {} recorded {} but national ID encodes {}",
        record.custom_identifier, record.gender, decoded.gender
    );
    record.gender = decoded.gender;
    record.national_id_correction = Some(event.clone());
    Some(event)
}
