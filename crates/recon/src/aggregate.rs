use std::collections::BTreeMap;

use crate::model::{ComparisonRow, OutcomeKind, RunSummary};

/// Ordered, append-only collection of comparison rows.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<ComparisonRow>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, row: ComparisonRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        compute_summary(&self.rows)
    }

    pub fn into_rows(self) -> Vec<ComparisonRow> {
        self.rows
    }
}

/// Derive counts from the row list.
pub fn compute_summary(rows: &[ComparisonRow]) -> RunSummary {
    let mut kind_counts: BTreeMap<OutcomeKind, usize> = OutcomeKind::ALL.iter().map(|k| (*k, 0)).collect();
    for row in rows {
        *kind_counts.entry(row.outcome_kind).or_insert(0) += 1;
    }
    let count = |k: OutcomeKind| kind_counts.get(&k).copied().unwrap_or(0);

    RunSummary {
        total: rows.len(),
        matches: count(OutcomeKind::Match),
        mismatches: count(OutcomeKind::Mismatch) + count(OutcomeKind::XmlNull) + count(OutcomeKind::DbNull),
        errors: count(OutcomeKind::Error),
        ignored: count(OutcomeKind::BothNull),
        kind_counts,
    }
}
