//! Duplicate-group resolution over suffixed external identifiers.
//!
//! Records whose identifiers share the part before the separator (`12345`,
//! `12345-BIS`, `12345-TRIS`) describe one patient. The unsuffixed one is the
//! merge target; the rest are sources. Groups without exactly one target are
//! reported, never guessed.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::models::InternalRecord;

pub mod client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroup<'a> {
    pub base_id: String,
    pub target: &'a InternalRecord,
    pub sources: Vec<&'a InternalRecord>,
}

impl MergeGroup<'_> {
    pub fn instructions(&self) -> Vec<MergeInstruction> {
        self.sources
            .iter()
            .map(|s| MergeInstruction {
                source_id: s.external_id.trim().to_string(),
                target_id: self.target.external_id.trim().to_string(),
            })
            .collect()
    }
}

/// Merge `source_id` into `target_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeInstruction {
    pub source_id: String,
    pub target_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnresolvedReason {
    NoTarget,
    MultipleTargets,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget => f.write_str("NO_TARGET"),
            Self::MultipleTargets => f.write_str("MULTIPLE_TARGETS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedGroup {
    pub base_id: String,
    pub reason: UnresolvedReason,
    /// External identifiers of every member, in input order.
    pub members: Vec<String>,
}

/// Part of the identifier before the first separator.
pub fn base_id<'s>(external_id: &'s str, separator: &str) -> &'s str {
    let id = external_id.trim();
    match id.split_once(separator) {
        Some((base, _)) => base.trim(),
        None => id,
    }
}

fn is_target(external_id: &str, separator: &str) -> bool {
    !external_id.trim().contains(separator)
}

/// Partition records by base identifier and pick each partition's target.
/// A lone unsuffixed record has nothing to merge and is skipped. Groups are
/// returned in order of first appearance.
pub fn resolve_duplicate_groups<'a>(
    records: &'a [InternalRecord],
    separator: &str,
) -> (Vec<MergeGroup<'a>>, Vec<UnresolvedGroup>) {
    let mut order: Vec<(&str, Vec<&'a InternalRecord>)> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();
    for r in records {
        let id = r.external_id.trim();
        if id.is_empty() {
            continue;
        }
        let base = base_id(id, separator);
        if base.is_empty() {
            continue;
        }
        match slot.get(base) {
            Some(&i) => order[i].1.push(r),
            None => {
                slot.insert(base, order.len());
                order.push((base, vec![r]));
            }
        }
    }

    let mut groups = Vec::new();
    let mut unresolved = Vec::new();
    for (base, members) in order {
        let (targets, sources): (Vec<&InternalRecord>, Vec<&InternalRecord>) =
            members.iter().copied().partition(|r| is_target(&r.external_id, separator));
        match targets.as_slice() {
            [_] if sources.is_empty() => {}
            [target] => groups.push(MergeGroup {
                base_id: base.to_string(),
                target: *target,
                sources,
            }),
            _ => {
                let reason = if targets.is_empty() {
                    UnresolvedReason::NoTarget
                } else {
                    UnresolvedReason::MultipleTargets
                };
                log::warn!(
                    "UNRESOLVED_MERGE_GROUP - {} ({}, {} members)",
                    base,
                    reason,
                    members.len()
                );
                unresolved.push(UnresolvedGroup {
                    base_id: base.to_string(),
                    reason,
                    members: members.iter().map(|r| r.external_id.trim().to_string()).collect(),
                });
            }
        }
    }
    (groups, unresolved)
}

/// Flatten groups into one instruction per source, in group order.
pub fn merge_plan(groups: &[MergeGroup<'_>]) -> Vec<MergeInstruction> {
    groups.iter().flat_map(MergeGroup::instructions).collect()
}
