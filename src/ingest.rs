// Tabular ingest utilities.
//
// Every importer consumes a Sheet (headers + string cells) and resolves its
// columns by fuzzy name matching, because each upstream exporter names the
// same column differently ("Paid In" vs "Credit" vs "Amount In"). Cell
// coercion is deliberately forgiving: a malformed amount is 0.0, a blank or
// sentinel cell is None, and nothing in this module ever errors on bad data.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

// ============================================================================
// SHEET
// ============================================================================

/// A loaded tabular source: one header row plus string cells.
///
/// Rows are padded/truncated to the header width so that a column index
/// resolved against the headers is always safe to use on any row.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Load a sheet from a CSV file on disk.
    pub fn from_path(path: &Path) -> Result<Sheet> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

        Self::from_csv_reader(reader)
    }

    /// Load a sheet from any reader producing CSV text.
    pub fn from_reader<R: Read>(reader: R) -> Result<Sheet> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        Self::from_csv_reader(reader)
    }

    /// Build a sheet directly from header names and rows. Used by tests.
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Sheet {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let width = headers.len();
        let rows = rows
            .iter()
            .map(|row| {
                let mut cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();

        Sheet { headers, rows }
    }

    fn from_csv_reader<R: Read>(mut reader: csv::Reader<R>) -> Result<Sheet> {
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header row")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let width = headers.len();
        let mut rows = Vec::new();

        for record in reader.records() {
            let record = record.context("Failed to parse CSV record")?;
            let mut cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            cells.resize(width, String::new());
            rows.push(cells);
        }

        Ok(Sheet { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw cell text for a resolved column, or None when the column was
    /// never resolved.
    pub fn cell<'a>(&self, row: &'a [String], col: Option<usize>) -> Option<&'a str> {
        col.and_then(|idx| row.get(idx)).map(|s| s.as_str())
    }
}

// ============================================================================
// COLUMN RESOLUTION
// ============================================================================

/// Resolve a single logical column against a synonym list.
///
/// Two passes over the headers, in header order so the result is
/// deterministic:
/// 1. exact case-insensitive match
/// 2. substring containment, only for candidate names longer than 2 chars
///    (stops "in" from matching inside "Description")
pub fn resolve_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    // Pass 1: exact matches are always preferred
    for (idx, header) in headers.iter().enumerate() {
        let header_lower = header.trim().to_lowercase();
        for name in candidates {
            if header_lower == name.to_lowercase() {
                return Some(idx);
            }
        }
    }

    // Pass 2: partial matches
    for (idx, header) in headers.iter().enumerate() {
        let header_lower = header.trim().to_lowercase();
        for name in candidates {
            if name.len() > 2 && header_lower.contains(&name.to_lowercase()) {
                return Some(idx);
            }
        }
    }

    None
}

/// Resolve a whole set of logical fields at once.
///
/// The exact pass runs over ALL fields before any substring matching starts,
/// so a short synonym of one field cannot greedily grab a header that another
/// field matches exactly. The substring pass never claims a header twice.
pub fn resolve_fields(
    headers: &[String],
    fields: &[(&'static str, &[&str])],
) -> HashMap<&'static str, usize> {
    let mut resolved: HashMap<&'static str, usize> = HashMap::new();
    let mut claimed: HashSet<usize> = HashSet::new();

    // Phase 1: exact matches for every field
    for &(field, candidates) in fields {
        'field: for (idx, header) in headers.iter().enumerate() {
            let header_lower = header.trim().to_lowercase();
            for name in candidates {
                if header_lower == name.to_lowercase() {
                    resolved.insert(field, idx);
                    claimed.insert(idx);
                    break 'field;
                }
            }
        }
    }

    // Phase 2: substring matches for fields still unresolved
    for &(field, candidates) in fields {
        if resolved.contains_key(field) {
            continue;
        }
        'field: for (idx, header) in headers.iter().enumerate() {
            if claimed.contains(&idx) {
                continue;
            }
            let header_lower = header.trim().to_lowercase();
            for name in candidates {
                if name.len() > 2 && header_lower.contains(&name.to_lowercase()) {
                    resolved.insert(field, idx);
                    claimed.insert(idx);
                    break 'field;
                }
            }
        }
    }

    resolved
}

// ============================================================================
// CELL COERCION
// ============================================================================

const NULL_SENTINELS: [&str; 4] = ["nan", "none", "n/a", "null"];
const ZERO_SENTINELS: [&str; 7] = ["nan", "none", "n/a", "-", "zero", "nil", "null"];

/// Coerce a raw cell to a monetary amount. Never fails: empty cells, text
/// sentinels and unparseable garbage all come back as 0.0. Thousands
/// separators and currency symbols are stripped first.
pub fn coerce_amount(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let lower = trimmed.to_lowercase();
    if ZERO_SENTINELS.contains(&lower.as_str()) {
        return 0.0;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '£' | '$' | '€'))
        .collect();

    cleaned.trim().parse::<f64>().unwrap_or(0.0)
}

/// Coerce a raw cell to clean text. Whitespace-only cells and the literal
/// strings tabular tools emit for absent values become None.
pub fn coerce_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if NULL_SENTINELS.contains(&trimmed.to_lowercase().as_str()) {
        return None;
    }

    Some(trimmed.to_string())
}

/// Coerce a raw cell to an integer identifier. Accepts float renderings of
/// whole numbers ("3.0") since spreadsheet exports produce those.
pub fn coerce_int(raw: &str) -> Option<i64> {
    let text = coerce_text(raw)?;

    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }

    match text.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => Some(value as i64),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
