//! Mapping sheet loading (CSV or spreadsheet).
//!
//! The header row is found by name, case-insensitively, so sheets with a
//! title block above the table work. Rows without an entity or column are
//! skipped.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use fieldaudit_recon::model::RawMapping;

use crate::error::IoError;

const ENTITY_HEADERS: &[&str] = &["entity", "table", "tabla", "entidad"];
const COLUMN_HEADERS: &[&str] = &["column", "field", "campo", "columna"];
const PATH_HEADERS: &[&str] = &["path", "xpath", "ruta"];

/// Rows scanned for the header before giving up.
const HEADER_SEARCH_ROWS: usize = 20;

pub fn load_mapping_sheet(path: &Path) -> Result<Vec<RawMapping>, IoError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let rows = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
        _ => read_csv(path)?,
    };

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    mappings_from_rows(&rows, &label).map_err(|message| IoError::Sheet {
        path: path.display().to_string(),
        message,
    })
}

/// Turn raw sheet rows into mappings. `label` prefixes each `source_label`.
pub fn mappings_from_rows(rows: &[Vec<String>], label: &str) -> Result<Vec<RawMapping>, String> {
    let (header_idx, cols) = rows
        .iter()
        .take(HEADER_SEARCH_ROWS)
        .enumerate()
        .find_map(|(i, row)| HeaderColumns::find(row).map(|c| (i, c)))
        .ok_or_else(|| {
            format!(
                "no header row with entity ({}), column ({}) and path ({}) headers",
                ENTITY_HEADERS.join("/"),
                COLUMN_HEADERS.join("/"),
                PATH_HEADERS.join("/")
            )
        })?;

    let cell = |row: &Vec<String>, idx: usize| row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default();

    let mut out = Vec::new();
    for (i, row) in rows.iter().enumerate().skip(header_idx + 1) {
        let entity = cell(row, cols.entity);
        let column = cell(row, cols.column);
        if entity.is_empty() || column.is_empty() {
            continue;
        }
        out.push(RawMapping {
            entity,
            column,
            path: cell(row, cols.path),
            source_label: format!("{label}:{}", i + 1),
        });
    }
    Ok(out)
}

struct HeaderColumns {
    entity: usize,
    column: usize,
    path: usize,
}

impl HeaderColumns {
    fn find(row: &[String]) -> Option<Self> {
        let position = |aliases: &[&str]| {
            row.iter()
                .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
        };
        Some(Self {
            entity: position(ENTITY_HEADERS)?,
            column: position(COLUMN_HEADERS)?,
            path: position(PATH_HEADERS)?,
        })
    }
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, IoError> {
    let sheet_err = |message: String| IoError::Sheet {
        path: path.display().to_string(),
        message,
    };
    let mut workbook = open_workbook_auto(path).map_err(|e| sheet_err(format!("failed to open: {e}")))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| sheet_err("workbook contains no sheets".into()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| sheet_err(format!("failed to read sheet '{first}': {e}")))?;

    Ok(range.rows().map(|row| row.iter().map(cell_text).collect()).collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Data::Float(n) => n.to_string(),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(e) => format!("#{e:?}"),
        Data::DateTime(dt) => dt.as_f64().to_string(),
    }
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, IoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IoError::Sheet {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// UTF-8 (BOM stripped), falling back to Windows-1252 for spreadsheet
/// exports.
fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let bytes = std::fs::read(path).map_err(|e| IoError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Pick the delimiter that gives the most consistent field count (>1) over
/// the first lines.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b',', b';', b'\t', b'|'];
    let sample: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    let mut best = b',';
    let mut best_score = 0usize;
    for &delim in candidates {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let Some(&target) = counts.first() else { continue };
        if target <= 1 {
            continue;
        }
        let score = counts.iter().filter(|&&c| c == target).count() * target;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(lines: &[&[&str]]) -> Vec<Vec<String>> {
        lines.iter().map(|l| l.iter().map(|s| s.to_string()).collect()).collect()
    }

    #[test]
    fn header_aliases_and_labels() {
        let sheet = rows(&[
            &["Audit mappings", "", ""],
            &["Tabla", "Campo", "XPath"],
            &["invoice", "amount", "Invoice/Total"],
            &["", "orphan", "X"],
            &["invoice", "", "Y"],
            &["customer", "Cod Postal", ""],
        ]);
        let maps = mappings_from_rows(&sheet, "map.xlsx").unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].entity, "invoice");
        assert_eq!(maps[0].path, "Invoice/Total");
        assert_eq!(maps[0].source_label, "map.xlsx:3");
        assert_eq!(maps[1].column, "Cod Postal");
        assert_eq!(maps[1].path, "");
        assert_eq!(maps[1].source_label, "map.xlsx:6");
    }

    #[test]
    fn missing_header_is_an_error() {
        let sheet = rows(&[&["a", "b"], &["c", "d"]]);
        let err = mappings_from_rows(&sheet, "m.csv").unwrap_err();
        assert!(err.contains("no header row"));
    }

    #[test]
    fn short_rows_are_tolerated() {
        let sheet = rows(&[&["path", "entity", "column"], &["A/B", "invoice", "amount"], &["C"]]);
        let maps = mappings_from_rows(&sheet, "m.csv").unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].path, "A/B");
    }

    #[test]
    fn semicolon_csv_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.csv");
        let content = "\u{feff}entity;column;path\ninvoice;amount;Invoice/Total\ninvoice;customer;\"A/B | C\"\n";
        std::fs::write(&path, content).unwrap();

        let maps = load_mapping_sheet(&path).unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[1].path, "A/B | C");
        assert_eq!(maps[1].source_label, "mappings.csv:3");
    }

    #[test]
    fn windows_1252_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let mut bytes = b"entidad,columna,ruta\ncliente,direcci".to_vec();
        bytes.push(0xF3); // ó
        bytes.extend_from_slice(b"n,Cliente/Dir\n");
        std::fs::write(&path, bytes).unwrap();

        let maps = load_mapping_sheet(&path).unwrap();
        assert_eq!(maps[0].column, "dirección");
    }

    #[test]
    fn float_cells_render_like_integers() {
        assert_eq!(cell_text(&Data::Float(12.0)), "12");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
