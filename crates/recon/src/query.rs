//! Per-entity query construction.
//!
//! Entities are looked up in a declarative rule table injected at
//! construction time. Entities without a rule get a generic single-table
//! filter built from the default [`FilterConfig`]. Every query selects one
//! column and returns at most one row.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::FilterConfig;

pub const PARAM_BATCH: &str = ":batch";
pub const PARAM_SINCE: &str = ":since";
pub const PARAM_DOC_ID: &str = ":doc_id";

/// Timestamp format bound for `:since`.
pub const SINCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DEFAULT_ALIAS: &str = "t";

static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(batch|since|doc_id)\b").expect("valid parameter regex"));

/// How to query one entity.
///
/// `join` and `filter` are SQL fragments that may reference `:batch`,
/// `:since` and `:doc_id`. An entity with a `join` is a child of a parent
/// entity; its results are ordered by `order_by` descending so the most
/// recent parent wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityRule {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub join: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
}

impl EntityRule {
    /// True if `join` or `filter` mentions the named parameter.
    pub fn references(&self, param: &str) -> bool {
        [&self.join, &self.filter]
            .into_iter()
            .flatten()
            .any(|sql| referenced_params(sql).iter().any(|p| *p == param))
    }
}

/// Filter values for one lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterContext {
    pub batch: Option<String>,
    pub since: Option<NaiveDateTime>,
    pub document_id: Option<String>,
}

impl FilterContext {
    pub fn from_defaults(filter: &FilterConfig) -> Self {
        Self {
            batch: filter.batch.clone(),
            since: filter.since,
            document_id: None,
        }
    }

    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    fn value_for(&self, param: &str) -> Option<String> {
        match param {
            PARAM_BATCH => self.batch.clone(),
            PARAM_SINCE => self.since.map(|t| t.format(SINCE_FORMAT).to_string()),
            PARAM_DOC_ID => self.document_id.clone(),
            _ => None,
        }
    }
}

/// SQL text plus named parameters (`:name` → value). Only parameters that
/// appear in the SQL and have a value are listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterizedQuery {
    pub sql: String,
    pub params: Vec<(String, String)>,
}

impl fmt::Display for ParameterizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    rules: BTreeMap<String, EntityRule>,
    defaults: FilterConfig,
}

impl QueryBuilder {
    pub fn new(rules: BTreeMap<String, EntityRule>, defaults: FilterConfig) -> Self {
        Self { rules, defaults }
    }

    pub fn rule(&self, entity: &str) -> Option<&EntityRule> {
        self.rules.get(entity)
    }

    pub fn build(&self, entity: &str, column: &str, ctx: &FilterContext) -> ParameterizedQuery {
        let rule = self.rules.get(entity);
        let alias = rule
            .and_then(|r| r.alias.as_deref())
            .unwrap_or(DEFAULT_ALIAS);
        let column_ident = quote_ident(column);

        let mut sql = format!(
            "SELECT {alias}.{column_ident} AS {column_ident} FROM {} {alias}",
            quote_qualified(entity)
        );

        if let Some(join) = rule.and_then(|r| r.join.as_deref()) {
            sql.push(' ');
            sql.push_str(join.trim());
        }

        let filter = match rule.and_then(|r| r.filter.as_deref()) {
            Some(f) => Some(f.trim().to_string()),
            None => self.generic_filter(alias, ctx),
        };
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }

        let order = match rule {
            Some(r) if r.join.is_some() || r.order_by.is_some() => {
                r.order_by.as_deref().map(|o| format!("{} DESC", o.trim()))
            }
            _ => self
                .defaults
                .time_column
                .as_deref()
                .filter(|_| ctx.since.is_some())
                .map(|c| format!("{alias}.{} DESC", quote_ident(c))),
        };
        if let Some(order) = order {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        sql.push_str(" LIMIT 1");

        let params = referenced_params(&sql)
            .into_iter()
            .filter_map(|p| ctx.value_for(p).map(|v| (p.to_string(), v)))
            .collect();

        ParameterizedQuery { sql, params }
    }

    fn generic_filter(&self, alias: &str, ctx: &FilterContext) -> Option<String> {
        let d = &self.defaults;
        let mut terms = Vec::new();
        if let (Some(col), Some(_)) = (&d.batch_column, &ctx.batch) {
            terms.push(format!("{alias}.{} = {PARAM_BATCH}", quote_ident(col)));
        }
        if let (Some(col), Some(_)) = (&d.time_column, &ctx.since) {
            terms.push(format!("{alias}.{} >= {PARAM_SINCE}", quote_ident(col)));
        }
        if let (Some(col), Some(_)) = (&d.id_column, &ctx.document_id) {
            terms.push(format!("{alias}.{} = {PARAM_DOC_ID}", quote_ident(col)));
        }
        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" AND "))
        }
    }
}

/// Distinct named parameters in order of first appearance.
fn referenced_params(sql: &str) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for cap in PARAM_RE.captures_iter(sql) {
        let param = match cap.get(1).map(|m| m.as_str()) {
            Some("batch") => PARAM_BATCH,
            Some("since") => PARAM_SINCE,
            Some("doc_id") => PARAM_DOC_ID,
            _ => continue,
        };
        if !out.contains(&param) {
            out.push(param);
        }
    }
    out
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.trim().replace('"', "\"\""))
}

/// Quote each dot-separated part of `schema.table`.
fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn defaults() -> FilterConfig {
        FilterConfig {
            batch_column: Some("department_id".into()),
            batch: Some("D-01".into()),
            time_column: Some("created_at".into()),
            since: NaiveDate::from_ymd_opt(2026, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            id_column: Some("number".into()),
        }
    }

    fn line_rule() -> EntityRule {
        EntityRule {
            alias: Some("l".into()),
            join: Some("JOIN invoice i ON i.id = l.invoice_id".into()),
            filter: Some("i.department_id = :batch AND i.number = :doc_id".into()),
            order_by: Some("i.id".into()),
        }
    }

    #[test]
    fn generic_filter_uses_defaults() {
        let builder = QueryBuilder::new(BTreeMap::new(), defaults());
        let ctx = FilterContext::from_defaults(&defaults());
        let q = builder.build("invoice", "amount", &ctx);
        assert_eq!(
            q.sql,
            "SELECT t.\"amount\" AS \"amount\" FROM \"invoice\" t \
             WHERE t.\"department_id\" = :batch AND t.\"created_at\" >= :since \
             ORDER BY t.\"created_at\" DESC LIMIT 1"
        );
        assert_eq!(
            q.params,
            vec![
                (":batch".to_string(), "D-01".to_string()),
                (":since".to_string(), "2026-01-01 00:00:00".to_string()),
            ]
        );
    }

    #[test]
    fn generic_filter_adds_document_id() {
        let builder = QueryBuilder::new(BTreeMap::new(), defaults());
        let ctx = FilterContext::from_defaults(&defaults()).with_document_id("F-17");
        let q = builder.build("invoice", "amount", &ctx);
        assert!(q.sql.contains("t.\"number\" = :doc_id"));
        assert!(q.params.contains(&(":doc_id".to_string(), "F-17".to_string())));
    }

    #[test]
    fn no_filter_context_means_no_where() {
        let builder = QueryBuilder::default();
        let q = builder.build("invoice", "amount", &FilterContext::default());
        assert_eq!(q.sql, "SELECT t.\"amount\" AS \"amount\" FROM \"invoice\" t LIMIT 1");
        assert!(q.params.is_empty());
    }

    #[test]
    fn join_rule_orders_by_parent_descending() {
        let rules = BTreeMap::from([("invoice_line".to_string(), line_rule())]);
        let builder = QueryBuilder::new(rules, defaults());
        let ctx = FilterContext::from_defaults(&defaults()).with_document_id("F-17");
        let q = builder.build("invoice_line", "sku", &ctx);
        assert_eq!(
            q.sql,
            "SELECT l.\"sku\" AS \"sku\" FROM \"invoice_line\" l \
             JOIN invoice i ON i.id = l.invoice_id \
             WHERE i.department_id = :batch AND i.number = :doc_id \
             ORDER BY i.id DESC LIMIT 1"
        );
        assert_eq!(q.params.len(), 2);
        assert_eq!(q.params[1], (":doc_id".to_string(), "F-17".to_string()));
    }

    #[test]
    fn unresolved_parameters_are_not_bound() {
        let rules = BTreeMap::from([("invoice_line".to_string(), line_rule())]);
        let builder = QueryBuilder::new(rules, defaults());
        let q = builder.build("invoice_line", "sku", &FilterContext::from_defaults(&defaults()));
        assert_eq!(q.params, vec![(":batch".to_string(), "D-01".to_string())]);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        let q = QueryBuilder::default().build("audit.invoice", "total amount", &FilterContext::default());
        assert!(q.sql.contains("FROM \"audit\".\"invoice\" t"));
        assert!(q.sql.contains("t.\"total amount\""));
    }

    #[test]
    fn rule_reports_referenced_params() {
        assert!(line_rule().references(PARAM_DOC_ID));
        assert!(line_rule().references(PARAM_BATCH));
        assert!(!line_rule().references(PARAM_SINCE));
        assert!(!EntityRule::default().references(PARAM_DOC_ID));
    }

    #[test]
    fn identical_inputs_build_identical_queries() {
        let builder = QueryBuilder::new(BTreeMap::new(), defaults());
        let ctx = FilterContext::from_defaults(&defaults());
        assert_eq!(builder.build("a", "b", &ctx), builder.build("a", "b", &ctx));
    }
}
