use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::error::AuditError;
use crate::model::{FieldMapping, RawMapping};
use crate::normalize::FieldNormalizer;
use crate::query::{EntityRule, PARAM_BATCH, PARAM_DOC_ID, PARAM_SINCE};
use crate::resolve::DEFAULT_SEPARATOR;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    pub name: String,
    pub store: StoreConfig,
    pub documents: DocumentsConfig,
    /// Default filter context for entities without their own filter rule.
    #[serde(default)]
    pub filter: FilterConfig,
    /// Per-entity query rules, keyed by entity name.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityRule>,
    /// Inline field mappings.
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,
    /// Spreadsheet-like mapping source (CSV or XLSX), relative to the config.
    #[serde(default)]
    pub mapping_sheet: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<Synonym>,
    /// Extra column names to treat as geographic coordinates.
    #[serde(default)]
    pub coordinate_columns: Vec<String>,
    #[serde(default = "default_separator")]
    pub concat_separator: String,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

// ---------------------------------------------------------------------------
// Store + documents
// ---------------------------------------------------------------------------

/// Connection parameters for the record store. Opening the connection is the
/// caller's job; the engine only receives an open store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsConfig {
    pub folder: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Path expression locating the document identifier, used to correlate a
    /// document with exactly one stored record.
    #[serde(default)]
    pub id_path: Option<String>,
}

fn default_pattern() -> String {
    "*.xml".into()
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Columns and values of the generic single-table filter. Each term is used
/// only when both its column and its value are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub batch_column: Option<String>,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub time_column: Option<String>,
    #[serde(default)]
    pub since: Option<NaiveDateTime>,
    /// Column matched against the document identifier.
    #[serde(default)]
    pub id_column: Option<String>,
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    pub entity: String,
    pub column: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Synonym {
    #[serde(default = "wildcard")]
    pub entity: String,
    pub from: String,
    pub to: String,
}

fn wildcard() -> String {
    "*".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub csv: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl AuditConfig {
    pub fn from_toml(input: &str) -> Result<Self, AuditError> {
        let config: AuditConfig = toml::from_str(input).map_err(|e| AuditError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        if self.name.trim().is_empty() {
            return Err(AuditError::ConfigValidation("name must not be empty".into()));
        }

        if self.mappings.is_empty() && self.mapping_sheet.is_none() {
            return Err(AuditError::ConfigValidation(
                "no field mappings: add [[mappings]] or set mapping_sheet".into(),
            ));
        }

        for (i, m) in self.mappings.iter().enumerate() {
            if m.entity.trim().is_empty() || m.column.trim().is_empty() {
                return Err(AuditError::ConfigValidation(format!(
                    "mappings[{i}]: entity and column are required"
                )));
            }
        }

        for (name, rule) in &self.entities {
            if rule.join.is_some() && rule.order_by.is_none() {
                return Err(AuditError::ConfigValidation(format!(
                    "entity '{name}': a join rule needs order_by (the parent identifier)"
                )));
            }
            let sources = [
                (PARAM_DOC_ID, self.documents.id_path.is_some(), "documents.id_path"),
                (PARAM_BATCH, self.filter.batch.is_some(), "filter.batch"),
                (PARAM_SINCE, self.filter.since.is_some(), "filter.since"),
            ];
            // Every referenced parameter needs a value source.
            for (param, bound, source) in sources {
                if rule.references(param) && !bound {
                    return Err(AuditError::ConfigValidation(format!(
                        "entity '{name}': rule uses {param} but {source} is not set"
                    )));
                }
            }
        }

        let f = &self.filter;
        if f.batch_column.is_some() != f.batch.is_some() {
            return Err(AuditError::ConfigValidation(
                "filter: batch_column and batch must be set together".into(),
            ));
        }
        if f.time_column.is_some() != f.since.is_some() {
            return Err(AuditError::ConfigValidation(
                "filter: time_column and since must be set together".into(),
            ));
        }
        if f.id_column.is_some() && self.documents.id_path.is_none() {
            return Err(AuditError::ConfigValidation(
                "filter: id_column needs documents.id_path".into(),
            ));
        }

        if let Some(ref id_path) = self.documents.id_path {
            if crate::path::parse(id_path).is_none() {
                return Err(AuditError::ConfigValidation(format!(
                    "documents.id_path: '{id_path}' is not a usable path expression"
                )));
            }
        }

        Ok(())
    }

    pub fn normalizer(&self) -> FieldNormalizer {
        FieldNormalizer::new(&self.synonyms, &self.coordinate_columns)
    }

    /// Inline mappings followed by `sheet_rows`, normalized and parsed.
    pub fn field_mappings(&self, sheet_rows: &[RawMapping]) -> Vec<FieldMapping> {
        let normalizer = self.normalizer();
        self.mappings
            .iter()
            .enumerate()
            .map(|(i, m)| RawMapping {
                entity: m.entity.clone(),
                column: m.column.clone(),
                path: m.path.clone(),
                source_label: format!("config:mappings[{i}]"),
            })
            .chain(sheet_rows.iter().cloned())
            .map(|raw| FieldMapping::new(&raw, &normalizer))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "Invoice audit"

[store]
path = "audit.db"

[documents]
folder = "inbox"
id_path = "Invoice/Header/Number"

[filter]
batch_column = "department_id"
batch = "D-01"
time_column = "created_at"
since = "2026-01-01T00:00:00"
id_column = "number"

[entities.invoice_line]
alias = "l"
join = "JOIN invoice i ON i.id = l.invoice_id"
filter = "i.number = :doc_id"
order_by = "i.id"

[[synonyms]]
entity = "invoice"
from = "grand total"
to = "amount"

[[mappings]]
entity = "invoice"
column = "Grand Total"
path = "Invoice/Total"

[[mappings]]
entity = "invoice_line"
column = "sku"
path = "Lines/ROW[1]/Sku | Lines/ROW/Code"
"#;

    #[test]
    fn parse_valid() {
        let config = AuditConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "Invoice audit");
        assert_eq!(config.documents.pattern, "*.xml");
        assert_eq!(config.concat_separator, " - ");
        assert_eq!(config.filter.batch.as_deref(), Some("D-01"));
        assert_eq!(
            config.filter.since.unwrap().to_string(),
            "2026-01-01 00:00:00"
        );
        assert_eq!(config.entities["invoice_line"].alias.as_deref(), Some("l"));
        assert!(config.store.busy_timeout_ms.is_none());
    }

    #[test]
    fn field_mappings_are_normalized_and_labelled() {
        let config = AuditConfig::from_toml(VALID).unwrap();
        let sheet = vec![RawMapping {
            entity: "customer".into(),
            column: "Cod Postal".into(),
            path: "-".into(),
            source_label: "map.csv:2".into(),
        }];
        let mappings = config.field_mappings(&sheet);
        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[0].column_original, "Grand Total");
        assert_eq!(mappings[0].column_normalized, "amount");
        assert_eq!(mappings[0].source_label, "config:mappings[0]");
        assert_eq!(mappings[1].path_display(), "Lines/ROW/Sku | Lines/ROW/Code");
        assert_eq!(mappings[2].column_normalized, "codigo_postal");
        assert!(mappings[2].path.is_none());
    }

    #[test]
    fn reject_missing_mappings() {
        let input = r#"
name = "Empty"
[store]
path = "a.db"
[documents]
folder = "docs"
"#;
        let err = AuditConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("no field mappings"));
    }

    #[test]
    fn sheet_alone_is_enough() {
        let input = r#"
name = "Sheet only"
mapping_sheet = "map.xlsx"
[store]
path = "a.db"
[documents]
folder = "docs"
"#;
        assert!(AuditConfig::from_toml(input).is_ok());
    }

    #[test]
    fn reject_join_without_order() {
        let input = r#"
name = "Bad"
mapping_sheet = "map.csv"
[store]
path = "a.db"
[documents]
folder = "docs"
[entities.line]
join = "JOIN invoice i ON i.id = t.invoice_id"
"#;
        let err = AuditConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("order_by"));
    }

    #[test]
    fn reject_doc_id_without_id_path() {
        let input = r#"
name = "Bad"
mapping_sheet = "map.csv"
[store]
path = "a.db"
[documents]
folder = "docs"
[entities.invoice]
filter = "t.number = :doc_id"
"#;
        let err = AuditConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("id_path"));
    }

    #[test]
    fn reject_batch_param_without_batch() {
        let input = r#"
name = "Bad"
mapping_sheet = "map.csv"
[store]
path = "a.db"
[documents]
folder = "docs"
[entities.invoice_line]
join = "JOIN invoice i ON i.id = t.invoice_id"
filter = "i.department_id = :batch"
order_by = "i.id"
"#;
        let err = AuditConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, AuditError::ConfigValidation(_)));
        assert!(err.to_string().contains("filter.batch"), "{err}");
    }

    #[test]
    fn reject_since_param_without_since() {
        let input = r#"
name = "Bad"
mapping_sheet = "map.csv"
[store]
path = "a.db"
[documents]
folder = "docs"
[filter]
batch_column = "department_id"
batch = "D-01"
[entities.invoice]
filter = "t.created_at >= :since AND t.department_id = :batch"
"#;
        let err = AuditConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains(":since but filter.since"), "{err}");
    }

    #[test]
    fn bound_params_are_accepted() {
        let input = r#"
name = "Ok"
mapping_sheet = "map.csv"
[store]
path = "a.db"
[documents]
folder = "docs"
[filter]
batch_column = "department_id"
batch = "D-01"
time_column = "created_at"
since = "2026-01-01T00:00:00"
[entities.invoice]
filter = "t.created_at >= :since AND t.department_id = :batch"
"#;
        assert!(AuditConfig::from_toml(input).is_ok());
    }

    #[test]
    fn reject_half_filter() {
        let input = r#"
name = "Bad"
mapping_sheet = "map.csv"
[store]
path = "a.db"
[documents]
folder = "docs"
[filter]
batch_column = "department_id"
"#;
        let err = AuditConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("batch_column and batch"));
    }

    #[test]
    fn reject_bad_since() {
        let input = r#"
name = "Bad"
mapping_sheet = "map.csv"
[store]
path = "a.db"
[documents]
folder = "docs"
[filter]
time_column = "created_at"
since = "yesterday"
"#;
        assert!(matches!(AuditConfig::from_toml(input), Err(AuditError::ConfigParse(_))));
    }
}
