use std::collections::BTreeMap;

use serde::Serialize;

use crate::normalize::FieldNormalizer;
use crate::path::{self, PathExpression};
use crate::resolve::StrategyKind;

// ---------------------------------------------------------------------------
// Sentinels
// ---------------------------------------------------------------------------

/// The mapping has no usable path expression.
pub const ERROR_XPATH: &str = "ERROR_XPATH";
/// The store rejected the query for a reason other than schema mismatch.
pub const ERROR_QUERY: &str = "ERROR_QUERY";
/// The document could not be parsed.
pub const ERROR_PARSE: &str = "ERROR_PARSE";
/// A document identifier path is configured but did not resolve.
pub const ERROR_DOCUMENT_ID: &str = "ERROR_DOCUMENT_ID";
/// The queried column or table does not exist in the store.
pub const CAMPO_NO_EXISTE: &str = "CAMPO_NO_EXISTE";

/// True for reserved values that stand in for a recovered failure.
pub fn is_sentinel(value: &str) -> bool {
    let v = value.trim();
    v.starts_with("ERROR_") || v == CAMPO_NO_EXISTE
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A mapping row as read from a mapping source, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMapping {
    pub entity: String,
    pub column: String,
    pub path: String,
    /// Where the row came from (`mappings.csv:4`, `config:mappings[0]`).
    pub source_label: String,
}

/// Association between a path expression and an entity/column pair.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub entity: String,
    /// Column label as written in the mapping source. Used in output rows.
    pub column_original: String,
    /// Column name used against the store.
    pub column_normalized: String,
    pub path_raw: String,
    /// `None` when the raw path was empty or a placeholder.
    pub path: Option<PathExpression>,
    pub source_label: String,
}

impl FieldMapping {
    pub fn new(raw: &RawMapping, normalizer: &FieldNormalizer) -> Self {
        let entity = raw.entity.trim().to_string();
        Self {
            column_normalized: normalizer.normalize_field_name(&entity, &raw.column),
            column_original: raw.column.clone(),
            path: path::parse(&raw.path),
            path_raw: raw.path.clone(),
            source_label: raw.source_label.clone(),
            entity,
        }
    }

    /// Canonical rendering of the path, or the raw text when unparsable.
    pub fn path_display(&self) -> String {
        match &self.path {
            Some(expr) => expr.to_string(),
            None => self.path_raw.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Column values of a single row, text-converted. `None` is SQL NULL.
pub type RecordColumns = BTreeMap<String, Option<String>>;

/// A row located in the store for one (mapping, document) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub entity: String,
    pub columns: RecordColumns,
    pub query_used: String,
}

impl StoredRecord {
    /// Value of `column`, falling back to the first selected column when the
    /// store reports it under a different label.
    pub fn value(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(v) => v.as_deref(),
            None => self.columns.values().next().and_then(|v| v.as_deref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Match,
    Mismatch,
    BothNull,
    XmlNull,
    DbNull,
    Error,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 6] = [
        Self::Match,
        Self::Mismatch,
        Self::BothNull,
        Self::XmlNull,
        Self::DbNull,
        Self::Error,
    ];
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match => write!(f, "MATCH"),
            Self::Mismatch => write!(f, "MISMATCH"),
            Self::BothNull => write!(f, "BOTH_NULL"),
            Self::XmlNull => write!(f, "XML_NULL"),
            Self::DbNull => write!(f, "DB_NULL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonOutcome {
    pub kind: OutcomeKind,
    pub xml_value: Option<String>,
    pub db_value: Option<String>,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One output row per (document, field mapping) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRow {
    pub document_name: String,
    pub entity: String,
    /// Column label as written in the mapping source.
    pub column: String,
    pub path_used: String,
    pub xml_value: Option<String>,
    pub db_value: Option<String>,
    pub outcome_kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub matches: usize,
    /// `MISMATCH`, `XML_NULL` and `DB_NULL` rows.
    pub mismatches: usize,
    pub errors: usize,
    /// `BOTH_NULL` rows.
    pub ignored: usize,
    pub kind_counts: BTreeMap<OutcomeKind, usize>,
}

impl RunSummary {
    /// Anything a human should look at.
    pub fn has_discrepancies(&self) -> bool {
        self.mismatches > 0 || self.errors > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub documents: usize,
    pub mappings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditResult {
    pub meta: RunMeta,
    pub summary: RunSummary,
    pub rows: Vec<ComparisonRow>,
}
