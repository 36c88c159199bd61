//! `fieldaudit run` and `fieldaudit validate`.

use std::path::{Path, PathBuf};

use fieldaudit_io::export::{to_json, write_json, write_rows_csv};
use fieldaudit_io::{load_mapping_sheet, DocumentSource, IoError, SqliteStore};
use fieldaudit_recon::model::RawMapping;
use fieldaudit_recon::{AuditConfig, AuditError, AuditResult, FieldMapping, LogObserver, OutcomeKind};

use crate::exit_codes::{EXIT_DISCREPANCIES, EXIT_INVALID_CONFIG, EXIT_RUNTIME, EXIT_STORE_UNREACHABLE};
use crate::CliError;

/// Discrepancy rows listed in the human summary.
const SUMMARY_ROW_LIMIT: usize = 20;

pub struct RunArgs {
    pub config: PathBuf,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub strict: bool,
    pub quiet: bool,
}

/// Config plus everything resolved relative to its directory.
struct Loaded {
    config: AuditConfig,
    base_dir: PathBuf,
    mappings: Vec<FieldMapping>,
    sheet_rows: usize,
}

fn load(config_path: &Path) -> Result<Loaded, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::new(EXIT_RUNTIME, format!("cannot read config {}: {e}", config_path.display()))
    })?;
    let config = AuditConfig::from_toml(&config_str).map_err(|e| CliError::new(EXIT_INVALID_CONFIG, e.to_string()))?;

    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let sheet: Vec<RawMapping> = match config.mapping_sheet.as_deref() {
        Some(sheet) => load_mapping_sheet(&base_dir.join(sheet))
            .map_err(|e| CliError::new(EXIT_INVALID_CONFIG, e.to_string()))?,
        None => Vec::new(),
    };
    let mappings = config.field_mappings(&sheet);
    if mappings.is_empty() {
        return Err(CliError::new(EXIT_INVALID_CONFIG, "no field mappings after loading the mapping sheet")
            .with_hint("check the sheet's entity/column/path headers"));
    }

    Ok(Loaded {
        sheet_rows: sheet.len(),
        config,
        base_dir,
        mappings,
    })
}

fn unusable_paths(mappings: &[FieldMapping]) -> Vec<&FieldMapping> {
    mappings.iter().filter(|m| m.path.is_none()).collect()
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let Loaded {
        config,
        base_dir,
        mappings,
        ..
    } = load(&args.config)?;

    for m in unusable_paths(&mappings) {
        log::warn!(
            "{}: {}.{} has no usable path ({:?})",
            m.source_label,
            m.entity,
            m.column_original,
            m.path_raw
        );
    }

    let store_path = base_dir.join(&config.store.path);
    let mut store = SqliteStore::open(&store_path, config.store.busy_timeout_ms).map_err(|e| {
        CliError::new(EXIT_STORE_UNREACHABLE, e.to_string()).with_hint("check store.path in the config")
    })?;

    let folder = base_dir.join(&config.documents.folder);
    let documents = DocumentSource::open(&folder, &config.documents.pattern).map_err(|e| match e {
        IoError::Pattern { .. } => CliError::new(EXIT_INVALID_CONFIG, e.to_string()),
        _ => CliError::new(EXIT_RUNTIME, e.to_string()),
    })?;
    if documents.remaining() == 0 {
        log::warn!("no documents matching '{}' in {}", config.documents.pattern, folder.display());
    }

    let result = fieldaudit_recon::run(&config, &mappings, documents, &mut store, &LogObserver).map_err(|e| match e {
        AuditError::Connection(_) => CliError::new(EXIT_STORE_UNREACHABLE, e.to_string()),
        _ => CliError::new(EXIT_RUNTIME, e.to_string()),
    })?;

    let json_path = args.output.or_else(|| config.output.json.as_ref().map(|p| base_dir.join(p)));
    if let Some(ref path) = json_path {
        write_json(&result, path).map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?;
        log::info!("wrote {}", path.display());
    }

    let csv_path = args.csv.or_else(|| config.output.csv.as_ref().map(|p| base_dir.join(p)));
    if let Some(ref path) = csv_path {
        write_rows_csv(&result.rows, path).map_err(|e| CliError::new(EXIT_RUNTIME, e.to_string()))?;
        log::info!("wrote {}", path.display());
    }

    if args.json {
        let json = to_json(&result).map_err(|e| CliError::new(EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json}");
    }

    if !args.quiet {
        print_summary(&result);
    }

    if args.strict && result.summary.has_discrepancies() {
        return Err(CliError::new(EXIT_DISCREPANCIES, "discrepancies found"));
    }
    Ok(())
}

fn print_summary(result: &AuditResult) {
    let s = &result.summary;
    eprintln!(
        "{}: {} documents, {} comparisons: {} matched, {} mismatched, {} errors, {} both empty",
        result.meta.config_name, result.meta.documents, s.total, s.matches, s.mismatches, s.errors, s.ignored,
    );

    let discrepancies: Vec<_> = result
        .rows
        .iter()
        .filter(|r| !matches!(r.outcome_kind, OutcomeKind::Match | OutcomeKind::BothNull))
        .collect();
    for row in discrepancies.iter().take(SUMMARY_ROW_LIMIT) {
        eprintln!(
            "  {:<9} {} {}.{}: xml={} db={}",
            row.outcome_kind.to_string(),
            row.document_name,
            row.entity,
            row.column,
            row.xml_value.as_deref().unwrap_or("-"),
            row.db_value.as_deref().unwrap_or("-"),
        );
    }
    if discrepancies.len() > SUMMARY_ROW_LIMIT {
        eprintln!("  ... {} more (use --csv or --output for all rows)", discrepancies.len() - SUMMARY_ROW_LIMIT);
    }
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let loaded = load(&config_path)?;
    let config = &loaded.config;

    eprintln!(
        "valid: {} ({} mappings: {} inline, {} from sheet; {} entity rules)",
        config_path.display(),
        loaded.mappings.len(),
        config.mappings.len(),
        loaded.sheet_rows,
        config.entities.len(),
    );

    let unusable = unusable_paths(&loaded.mappings);
    for m in &unusable {
        eprintln!(
            "  warning: {}: {}.{} has no usable path ({:?}); rows will be ERROR_XPATH",
            m.source_label, m.entity, m.column_original, m.path_raw
        );
    }
    for m in loaded.mappings.iter().filter(|m| m.column_normalized != m.column_original) {
        log::info!("{}: column '{}' queried as '{}'", m.source_label, m.column_original, m.column_normalized);
    }

    let folder = loaded.base_dir.join(&config.documents.folder);
    if !folder.is_dir() {
        eprintln!("  warning: documents folder {} does not exist", folder.display());
    }
    Ok(())
}
