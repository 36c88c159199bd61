use std::thread::{self, JoinHandle};

use crate::aggregate::ResultSet;
use crate::classify::{classify, classify_error};
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::locate::{RecordLocator, RecordStore};
use crate::model::{
    AuditResult, ComparisonOutcome, ComparisonRow, FieldMapping, RunMeta, ERROR_DOCUMENT_ID, ERROR_PARSE,
    ERROR_XPATH,
};
use crate::normalize::{normalize_coordinate, FieldNormalizer};
use crate::observe::RunObserver;
use crate::path::{self, PathExpression};
use crate::query::{FilterContext, QueryBuilder};
use crate::resolve::{ResolvedValue, Resolver};
use crate::tree::TreeNode;

/// Column label of the single row emitted for an unparsable document.
pub const WHOLE_DOCUMENT: &str = "*";

/// One document handed to the engine. Parse failures are carried, not
/// raised, so they become a row instead of aborting the run.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub name: String,
    pub tree: Result<TreeNode, String>,
}

impl DocumentInput {
    pub fn parsed(name: impl Into<String>, tree: TreeNode) -> Self {
        Self {
            name: name.into(),
            tree: Ok(tree),
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree: Err(error.into()),
        }
    }
}

/// Compare every mapping against every document. Documents and mappings are
/// processed strictly in order. Only a lost store connection aborts.
pub fn run<S, I>(
    config: &AuditConfig,
    mappings: &[FieldMapping],
    documents: I,
    store: &mut S,
    observer: &dyn RunObserver,
) -> Result<AuditResult, AuditError>
where
    S: RecordStore + ?Sized,
    I: IntoIterator<Item = DocumentInput>,
{
    observer.run_started(&config.name, mappings.len());

    let builder = QueryBuilder::new(config.entities.clone(), config.filter.clone());
    let resolver = Resolver::new(config.concat_separator.clone());
    let normalizer = config.normalizer();
    let id_path = match config.documents.id_path.as_deref() {
        Some(raw) => Some(path::parse(raw).ok_or_else(|| {
            AuditError::ConfigValidation(format!("documents.id_path: '{raw}' is not a usable path expression"))
        })?),
        None => None,
    };

    let ctx = RunContext {
        mappings,
        resolver: &resolver,
        normalizer: &normalizer,
        defaults: FilterContext::from_defaults(&config.filter),
        id_path: id_path.as_ref(),
    };
    let mut locator = RecordLocator::new(store, &builder, observer);
    let mut results = ResultSet::new();
    let mut document_count = 0;

    for (index, doc) in documents.into_iter().enumerate() {
        document_count += 1;
        observer.document_started(&doc.name, index);
        locator.clear_memo();

        let root = match doc.tree {
            Ok(root) => root,
            Err(message) => {
                observer.document_failed(&doc.name, &message);
                let row = parse_error_row(&doc.name, &message);
                observer.field_compared(&row);
                results.add(row);
                continue;
            }
        };

        for row in compare_document(&ctx, &doc.name, &root, &mut locator)? {
            observer.field_compared(&row);
            results.add(row);
        }
    }

    let summary = results.summary();
    observer.run_finished(&summary);

    Ok(AuditResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            documents: document_count,
            mappings: mappings.len(),
        },
        summary,
        rows: results.into_rows(),
    })
}

/// Run on a worker thread and hand the result to `on_complete` there.
pub fn run_in_background<S, I, O, F>(
    config: AuditConfig,
    mappings: Vec<FieldMapping>,
    documents: I,
    mut store: S,
    observer: O,
    on_complete: F,
) -> JoinHandle<()>
where
    S: RecordStore + Send + 'static,
    I: IntoIterator<Item = DocumentInput> + Send + 'static,
    O: RunObserver + Send + 'static,
    F: FnOnce(Result<AuditResult, AuditError>) + Send + 'static,
{
    thread::spawn(move || {
        let result = run(&config, &mappings, documents, &mut store, &observer);
        on_complete(result);
    })
}

struct RunContext<'a> {
    mappings: &'a [FieldMapping],
    resolver: &'a Resolver,
    normalizer: &'a FieldNormalizer,
    defaults: FilterContext,
    id_path: Option<&'a PathExpression>,
}

fn compare_document<S: RecordStore + ?Sized>(
    ctx: &RunContext<'_>,
    document: &str,
    root: &TreeNode,
    locator: &mut RecordLocator<'_, S>,
) -> Result<Vec<ComparisonRow>, AuditError> {
    let filter = match ctx.id_path {
        Some(expr) => match ctx.resolver.resolve(expr, root).raw_text {
            Some(id) if !id.trim().is_empty() => Some(ctx.defaults.clone().with_document_id(id.trim())),
            _ => None,
        },
        None => Some(ctx.defaults.clone()),
    };

    let mut rows = Vec::with_capacity(ctx.mappings.len());
    for mapping in ctx.mappings {
        let resolved = resolve_mapping(ctx.resolver, mapping, root);
        let xml = resolved.raw_text.clone();

        let Some(filter) = filter.as_ref() else {
            let note = match ctx.id_path {
                Some(expr) => format!("document id not found at {expr}"),
                None => "document id not found".to_string(),
            };
            let mut outcome = classify(xml.as_deref(), Some(ERROR_DOCUMENT_ID));
            outcome.note = Some(note);
            rows.push(row(document, mapping, outcome, &resolved));
            continue;
        };

        let lookup = locator.locate(&mapping.entity, &mapping.column_normalized, filter)?;
        let (xml, db) = if ctx.normalizer.is_coordinate_column(&mapping.column_normalized) {
            (
                xml.map(|v| normalize_coordinate(&v)),
                lookup.value.map(|v| normalize_coordinate(&v)),
            )
        } else {
            (xml, lookup.value)
        };

        let mut outcome = classify(xml.as_deref(), db.as_deref());
        let path_note = mapping
            .path
            .is_none()
            .then(|| format!("no usable path expression in {}", mapping.source_label));
        outcome.note = path_note.or(lookup.note).or(outcome.note);
        rows.push(row(document, mapping, outcome, &resolved));
    }
    Ok(rows)
}

fn resolve_mapping(resolver: &Resolver, mapping: &FieldMapping, root: &TreeNode) -> ResolvedValue {
    match &mapping.path {
        Some(expr) => resolver.resolve(expr, root),
        None => ResolvedValue {
            raw_text: Some(ERROR_XPATH.to_string()),
            ..ResolvedValue::default()
        },
    }
}

fn row(document: &str, mapping: &FieldMapping, outcome: ComparisonOutcome, resolved: &ResolvedValue) -> ComparisonRow {
    ComparisonRow {
        document_name: document.to_string(),
        entity: mapping.entity.clone(),
        column: mapping.column_original.clone(),
        path_used: mapping.path_display(),
        xml_value: outcome.xml_value,
        db_value: outcome.db_value,
        outcome_kind: outcome.kind,
        note: outcome.note,
        strategy: resolved.strategy_used,
    }
}

fn parse_error_row(document: &str, message: &str) -> ComparisonRow {
    let outcome = classify_error(ERROR_PARSE, message);
    ComparisonRow {
        document_name: document.to_string(),
        entity: WHOLE_DOCUMENT.to_string(),
        column: WHOLE_DOCUMENT.to_string(),
        path_used: String::new(),
        xml_value: outcome.xml_value,
        db_value: outcome.db_value,
        outcome_kind: outcome.kind,
        note: outcome.note,
        strategy: None,
    }
}
