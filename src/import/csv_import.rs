use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};

use crate::error::SourceError;
use crate::models::{AuthoritativeColumns, AuthoritativeRecord, InternalColumns, InternalRecord};

/// Internal rows plus the header order they were read with, so updated rows
/// can be written back with the same layout.
#[derive(Debug, Clone, Default)]
pub struct InternalDataset {
    pub headers: Vec<String>,
    pub records: Vec<InternalRecord>,
}

struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(headers: &[String]) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self { positions }
    }

    fn require(&self, path: &str, columns: &[&str]) -> Result<(), SourceError> {
        for c in columns {
            if !self.positions.contains_key(*c) {
                return Err(SourceError::MissingColumn {
                    path: path.to_string(),
                    column: c.to_string(),
                });
            }
        }
        Ok(())
    }

    fn get(&self, row: &StringRecord, column: &str) -> String {
        self.positions
            .get(column)
            .and_then(|&i| row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    fn get_opt(&self, row: &StringRecord, column: Option<&str>) -> Option<String> {
        let v = self.get(row, column?);
        if v.is_empty() { None } else { Some(v) }
    }
}

fn read_headers<R: Read>(reader: &mut csv::Reader<R>, path: &str) -> Result<Vec<String>, SourceError> {
    let headers = reader.headers().map_err(|e| SourceError::Csv {
        path: path.to_string(),
        source: e,
    })?;
    Ok(headers
        .iter()
        .enumerate()
        // Spreadsheet exports often start with a UTF-8 BOM
        .map(|(i, h)| if i == 0 { h.trim_start_matches('\u{feff}') } else { h })
        .map(|h| h.trim().to_string())
        .collect())
}

fn open(path: &str) -> Result<BufReader<File>, SourceError> {
    let file = File::open(path).map_err(|e| SourceError::Open {
        path: path.to_string(),
        source: e,
    })?;
    Ok(BufReader::with_capacity(512 * 1024, file))
}

/// Read internal records from any CSV source. `path` only labels errors.
pub fn read_internal<R: Read>(input: R, path: &str, cols: &InternalColumns) -> Result<InternalDataset, SourceError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = read_headers(&mut reader, path)?;
    let index = HeaderIndex::new(&headers);
    index.require(path, &cols.required())?;

    let mapped: Vec<&str> = [
        Some(cols.family_name.as_str()),
        Some(cols.given_name.as_str()),
        cols.middle_name.as_deref(),
        Some(cols.sex.as_str()),
        Some(cols.date_of_birth.as_str()),
        Some(cols.external_id.as_str()),
        cols.practice_external_id.as_deref(),
        cols.secondary_id.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let raw = result.map_err(|e| SourceError::Csv {
            path: path.to_string(),
            source: e,
        })?;
        let extra_fields = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !mapped.contains(&h.as_str()))
            .map(|(i, h)| (h.clone(), raw.get(i).unwrap_or_default().to_string()))
            .collect();
        records.push(InternalRecord {
            row,
            family_name: index.get(&raw, &cols.family_name),
            given_name: index.get(&raw, &cols.given_name),
            middle_name: index.get_opt(&raw, cols.middle_name.as_deref()),
            sex: index.get(&raw, &cols.sex),
            date_of_birth: index.get(&raw, &cols.date_of_birth),
            external_id: index.get(&raw, &cols.external_id),
            practice_external_id: index.get_opt(&raw, cols.practice_external_id.as_deref()),
            secondary_id: index.get_opt(&raw, cols.secondary_id.as_deref()),
            extra_fields,
        });
    }
    log::info!("Loaded {} internal records from {}", records.len(), path);
    Ok(InternalDataset { headers, records })
}

pub fn read_internal_csv(path: &str, cols: &InternalColumns) -> Result<InternalDataset, SourceError> {
    read_internal(open(path)?, path, cols)
}

pub fn read_authoritative<R: Read>(
    input: R,
    path: &str,
    cols: &AuthoritativeColumns,
) -> Result<Vec<AuthoritativeRecord>, SourceError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = read_headers(&mut reader, path)?;
    let index = HeaderIndex::new(&headers);
    index.require(path, &cols.required())?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let raw = result.map_err(|e| SourceError::Csv {
            path: path.to_string(),
            source: e,
        })?;
        records.push(AuthoritativeRecord {
            row,
            custom_identifier: index.get(&raw, &cols.custom_identifier),
            first_name: index.get(&raw, &cols.first_name),
            last_name: index.get(&raw, &cols.last_name),
            middle_initial: index.get_opt(&raw, cols.middle_initial.as_deref()),
            gender: index.get(&raw, &cols.gender),
            date_of_birth: index.get(&raw, &cols.date_of_birth),
            national_id: index.get_opt(&raw, cols.national_id.as_deref()),
        });
    }
    if records.is_empty() {
        return Err(SourceError::Empty { path: path.to_string() });
    }
    log::info!("Loaded {} authoritative records from {}", records.len(), path);
    Ok(records)
}

pub fn read_authoritative_csv(path: &str, cols: &AuthoritativeColumns) -> Result<Vec<AuthoritativeRecord>, SourceError> {
    read_authoritative(open(path)?, path, cols)
}
