use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::corrections::CorrectionEvent;
use crate::national_id::NationalIdWarning;
use crate::normalize::{DateValue, Gender, NormalizedName, ParseFailure};

/// A patient row from the imaging-system export. `row` is the zero-based
/// position in the input and is the record's identity for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalRecord {
    pub row: usize,
    pub family_name: String,
    pub given_name: String,
    pub middle_name: Option<String>,
    pub sex: String,
    pub date_of_birth: String,
    /// Possibly suffixed, e.g. `12345-BIS`. Empty when unassigned.
    pub external_id: String,
    pub practice_external_id: Option<String>,
    pub secondary_id: Option<String>,
    #[serde(default)]
    pub extra_fields: HashMap<String, String>, // Columns we do not interpret, written back verbatim
}

impl InternalRecord {
    pub fn new(row: usize, family_name: &str, given_name: &str, sex: &str, date_of_birth: &str) -> Self {
        Self {
            row,
            family_name: family_name.into(),
            given_name: given_name.into(),
            sex: sex.into(),
            date_of_birth: date_of_birth.into(),
            ..Self::default()
        }
    }

    pub fn with_external_id(mut self, external_id: &str) -> Self {
        self.external_id = external_id.into();
        self
    }
}

/// A patient row from the authoritative practice-management export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeRecord {
    pub row: usize,
    pub custom_identifier: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_initial: Option<String>,
    pub gender: String,
    pub date_of_birth: String,
    pub national_id: Option<String>,
}

impl AuthoritativeRecord {
    pub fn new(
        row: usize,
        custom_identifier: &str,
        first_name: &str,
        last_name: &str,
        gender: &str,
        date_of_birth: &str,
    ) -> Self {
        Self {
            row,
            custom_identifier: custom_identifier.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            gender: gender.into(),
            date_of_birth: date_of_birth.into(),
            ..Self::default()
        }
    }

    pub fn with_national_id(mut self, national_id: &str) -> Self {
        self.national_id = Some(national_id.into());
        self
    }
}

// Column mapping for the internal export; source header names per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalColumns {
    pub family_name: String,
    pub given_name: String,
    pub middle_name: Option<String>,
    pub sex: String,
    pub date_of_birth: String,
    pub external_id: String,
    pub practice_external_id: Option<String>,
    pub secondary_id: Option<String>,
}

impl Default for InternalColumns {
    fn default() -> Self {
        Self {
            family_name: "family_name".into(),
            given_name: "given_name".into(),
            middle_name: Some("middle_name".into()),
            sex: "sex".into(),
            date_of_birth: "dob".into(),
            external_id: "pms_id".into(),
            practice_external_id: Some("practice_pms_id".into()),
            secondary_id: Some("dicom_id".into()),
        }
    }
}

impl InternalColumns {
    pub fn required(&self) -> [&str; 5] {
        [
            self.family_name.as_str(),
            self.given_name.as_str(),
            self.sex.as_str(),
            self.date_of_birth.as_str(),
            self.external_id.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthoritativeColumns {
    pub custom_identifier: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_initial: Option<String>,
    pub gender: String,
    pub date_of_birth: String,
    pub national_id: Option<String>,
}

impl Default for AuthoritativeColumns {
    fn default() -> Self {
        Self {
            custom_identifier: "custom_identifier".into(),
            first_name: "first_name".into(),
            last_name: "last_name".into(),
            middle_initial: Some("middle_initial".into()),
            gender: "gender".into(),
            date_of_birth: "dob".into(),
            national_id: Some("ssn".into()),
        }
    }
}

impl AuthoritativeColumns {
    pub fn required(&self) -> [&str; 5] {
        [
            self.custom_identifier.as_str(),
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.gender.as_str(),
            self.date_of_birth.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInternal {
    pub row: usize,
    pub family: NormalizedName,
    pub given: NormalizedName,
    pub gender: Gender,
    pub dob: DateValue,
    pub parse_failures: Vec<ParseFailure>,
}

impl NormalizedInternal {
    pub fn has_names(&self) -> bool {
        !self.family.is_empty() && !self.given.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAuthoritative {
    pub row: usize,
    pub custom_identifier: String,
    pub first: NormalizedName,
    pub last: NormalizedName,
    /// Trimmed source spelling, copied onto the internal record when a match is applied.
    pub display_first: String,
    pub display_last: String,
    pub display_middle: Option<String>,
    /// Effective gender; overridden by the national ID when the two disagree.
    pub gender: Gender,
    pub dob: DateValue,
    pub national_id: Option<String>,
    pub national_id_correction: Option<CorrectionEvent>,
    pub national_id_warnings: Vec<NationalIdWarning>,
    pub parse_failures: Vec<ParseFailure>,
}
