use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::error::ExportError;
use crate::matching::MatchResult;
use crate::merge::{MergeInstruction, UnresolvedGroup};
use crate::models::{InternalColumns, InternalRecord};

fn file_writer(path: &str) -> Result<Writer<BufWriter<File>>, ExportError> {
    let file = File::create(path)?;
    let buf_writer = BufWriter::with_capacity(512 * 1024, file);
    Ok(WriterBuilder::new().from_writer(buf_writer))
}

fn opt(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("")
}

fn field_value<'r>(record: &'r InternalRecord, cols: &InternalColumns, header: &str) -> &'r str {
    if header == cols.family_name {
        &record.family_name
    } else if header == cols.given_name {
        &record.given_name
    } else if cols.middle_name.as_deref() == Some(header) {
        opt(&record.middle_name)
    } else if header == cols.sex {
        &record.sex
    } else if header == cols.date_of_birth {
        &record.date_of_birth
    } else if header == cols.external_id {
        &record.external_id
    } else if cols.practice_external_id.as_deref() == Some(header) {
        opt(&record.practice_external_id)
    } else if cols.secondary_id.as_deref() == Some(header) {
        opt(&record.secondary_id)
    } else {
        record.extra_fields.get(header).map(String::as_str).unwrap_or("")
    }
}

/// Write internal records with the same header order they were read with.
pub fn write_internal<W: Write>(
    w: &mut Writer<W>,
    headers: &[String],
    records: &[InternalRecord],
    cols: &InternalColumns,
) -> Result<(), ExportError> {
    w.write_record(headers)?;
    for r in records {
        w.write_record(headers.iter().map(|h| field_value(r, cols, h)))?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_internal_csv(
    path: &str,
    headers: &[String],
    records: &[InternalRecord],
    cols: &InternalColumns,
) -> Result<(), ExportError> {
    let mut w = file_writer(path)?;
    write_internal(&mut w, headers, records, cols)
}

const AUDIT_HEADERS: [&str; 13] = [
    "internal_row",
    "family_name",
    "given_name",
    "sex",
    "dob",
    "external_id",
    "custom_identifier",
    "authoritative_row",
    "strategy",
    "tier",
    "score",
    "requires_review",
    "corrections",
];

/// One row per match decision. `records` are the internal rows as read, before any update.
pub fn write_audit<W: Write>(
    w: &mut Writer<W>,
    results: &[MatchResult],
    records: &[InternalRecord],
) -> Result<(), ExportError> {
    w.write_record(AUDIT_HEADERS)?;
    for (result, record) in results.iter().zip(records) {
        let corrections = result
            .corrections
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let (custom_identifier, authoritative_row) = match &result.matched {
            Some(m) => (m.custom_identifier.clone(), m.row.to_string()),
            None => (String::new(), String::new()),
        };
        w.write_record([
            result.internal_row.to_string(),
            record.family_name.clone(),
            record.given_name.clone(),
            record.sex.clone(),
            record.date_of_birth.clone(),
            record.external_id.clone(),
            custom_identifier,
            authoritative_row,
            result.strategy_label().to_string(),
            result.tier().as_str().to_string(),
            result.score().to_string(),
            result.requires_review.to_string(),
            corrections,
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_audit_csv(path: &str, results: &[MatchResult], records: &[InternalRecord]) -> Result<(), ExportError> {
    let mut w = file_writer(path)?;
    write_audit(&mut w, results, records)
}

pub fn write_merge_plan<W: Write>(w: &mut Writer<W>, plan: &[MergeInstruction]) -> Result<(), ExportError> {
    w.write_record(["source_id", "target_id"])?;
    for i in plan {
        w.write_record([i.source_id.as_str(), i.target_id.as_str()])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_merge_plan_csv(path: &str, plan: &[MergeInstruction]) -> Result<(), ExportError> {
    let mut w = file_writer(path)?;
    write_merge_plan(&mut w, plan)
}

pub fn write_unresolved<W: Write>(w: &mut Writer<W>, groups: &[UnresolvedGroup]) -> Result<(), ExportError> {
    w.write_record(["base_id", "reason", "members"])?;
    for g in groups {
        w.write_record([g.base_id.clone(), g.reason.to_string(), g.members.join("|")])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_unresolved_csv(path: &str, groups: &[UnresolvedGroup]) -> Result<(), ExportError> {
    let mut w = file_writer(path)?;
    write_unresolved(&mut w, groups)
}
