//! Report output: comparison rows as CSV, whole results as JSON.

use std::io::Write;
use std::path::Path;

use fieldaudit_recon::{AuditResult, ComparisonRow};

use crate::error::IoError;

pub const CSV_HEADER: [&str; 9] = [
    "document", "entity", "column", "path", "xml_value", "db_value", "outcome", "note", "strategy",
];

pub fn write_rows_csv(rows: &[ComparisonRow], path: &Path) -> Result<(), IoError> {
    let file = std::fs::File::create(path).map_err(|e| export_error(path, e))?;
    write_rows_csv_to(rows, file).map_err(|message| IoError::Export {
        path: path.display().to_string(),
        message,
    })
}

/// Header plus one record per row. Absent values are empty fields.
pub fn write_rows_csv_to<W: Write>(rows: &[ComparisonRow], writer: W) -> Result<(), String> {
    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    csv.write_record(CSV_HEADER).map_err(|e| e.to_string())?;

    for row in rows {
        let outcome = row.outcome_kind.to_string();
        let strategy = row.strategy.map(|s| s.to_string()).unwrap_or_default();
        csv.write_record([
            row.document_name.as_str(),
            row.entity.as_str(),
            row.column.as_str(),
            row.path_used.as_str(),
            row.xml_value.as_deref().unwrap_or(""),
            row.db_value.as_deref().unwrap_or(""),
            outcome.as_str(),
            row.note.as_deref().unwrap_or(""),
            strategy.as_str(),
        ])
        .map_err(|e| e.to_string())?;
    }
    csv.flush().map_err(|e| e.to_string())
}

pub fn write_json(result: &AuditResult, path: &Path) -> Result<(), IoError> {
    let json = to_json(result).map_err(|message| IoError::Export {
        path: path.display().to_string(),
        message,
    })?;
    std::fs::write(path, json + "\n").map_err(|e| export_error(path, e))
}

pub fn to_json(result: &AuditResult) -> Result<String, String> {
    serde_json::to_string_pretty(result).map_err(|e| e.to_string())
}

fn export_error(path: &Path, e: std::io::Error) -> IoError {
    IoError::Export {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
