//! CSV and Excel reading and writing.
//!
//! Files are loaded into a [`Table`] of JSON values. Every column gets one
//! inferred type: integers, floats, booleans, or text. Missing cells stay
//! `null` until [`clean`] replaces them with empty strings for import.
//!
//! Excel workbooks are read with `calamine` (`.xlsx` and legacy `.xls`)
//! and written with `rust_xlsxwriter`. CSV exports carry a UTF-8 BOM so
//! spreadsheet applications detect the encoding.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::{Number, Value};

pub use seekdb_core::table::Table;

/// Default sheet name for Excel exports.
pub const DEFAULT_SHEET_NAME: &str = "Data";

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
    /// Every cell is missing.
    Empty,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int => "int64",
            ColumnType::Float => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Text => "object",
            ColumnType::Empty => "float64",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

fn is_excel(ext: &str) -> bool {
    ext == ".xlsx" || ext == ".xls"
}

/// Read a `.csv`, `.xlsx`, or `.xls` file. Excel files use the first sheet.
pub fn read_file(path: &Path) -> Result<Table> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    let ext = extension(path);
    match ext.as_str() {
        ".csv" => read_csv(path),
        e if is_excel(e) => read_excel(path, None),
        other => bail!("Unsupported file format: {}. Use .csv or .xlsx", other),
    }
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open CSV file {}", path.display()))?;
    let columns: Vec<String> = reader
        .headers()
        .with_context(|| format!("missing headers in {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut raw: Vec<Vec<Option<String>>> = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("invalid row in {}", path.display()))?;
        raw.push(
            (0..columns.len())
                .map(|i| record.get(i).filter(|s| !s.is_empty()).map(str::to_string))
                .collect(),
        );
    }

    let types: Vec<ColumnType> = (0..columns.len())
        .map(|c| infer_text_column(raw.iter().filter_map(|row| row[c].as_deref())))
        .collect();

    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&types)
                .map(|(cell, ty)| cell.map_or(Value::Null, |s| parse_text_cell(&s, *ty)))
                .collect()
        })
        .collect();

    Ok(Table { columns, rows })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

fn infer_text_column<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut ty = ColumnType::Empty;
    for cell in cells {
        let cell = cell.trim();
        let this = if cell.parse::<i64>().is_ok() {
            ColumnType::Int
        } else if cell.parse::<f64>().map_or(false, f64::is_finite) {
            ColumnType::Float
        } else if parse_bool(cell).is_some() {
            ColumnType::Bool
        } else {
            return ColumnType::Text;
        };
        ty = match (ty, this) {
            (ColumnType::Empty, t) => t,
            (a, b) if a == b => a,
            (ColumnType::Int, ColumnType::Float) | (ColumnType::Float, ColumnType::Int) => {
                ColumnType::Float
            }
            _ => return ColumnType::Text,
        };
    }
    ty
}

fn parse_text_cell(cell: &str, ty: ColumnType) -> Value {
    let trimmed = cell.trim();
    match ty {
        ColumnType::Int => trimmed
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(cell.to_string())),
        ColumnType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(cell.to_string())),
        ColumnType::Bool => parse_bool(trimmed)
            .map(Value::Bool)
            .unwrap_or_else(|| Value::String(cell.to_string())),
        ColumnType::Text | ColumnType::Empty => Value::String(cell.to_string()),
    }
}

/// Sheet names of an Excel workbook, in workbook order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    Ok(workbook.sheet_names())
}

/// Read one sheet of an Excel workbook; the first sheet when `sheet` is `None`.
pub fn read_excel(path: &Path, sheet: Option<&str>) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(s) => {
            if !names.iter().any(|n| n == s) {
                bail!("Worksheet named '{}' not found. Available sheets: {:?}", s, names);
            }
            s.to_string()
        }
        None => names
            .first()
            .cloned()
            .with_context(|| format!("Workbook {} has no sheets", path.display()))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .with_context(|| format!("failed to read sheet '{}'", name))?;

    let mut rows_iter = range.rows();
    let columns: Vec<String> = match rows_iter.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell_to_value(cell) {
                Value::Null => format!("Unnamed: {}", i),
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        None => return Ok(Table::default()),
    };

    let mut rows: Vec<Vec<Value>> = rows_iter
        .map(|row| {
            (0..columns.len())
                .map(|i| row.get(i).map_or(Value::Null, cell_to_value))
                .collect()
        })
        .collect();
    // trailing rows that are entirely empty are formatting, not data
    while rows
        .last()
        .map_or(false, |r| r.iter().all(Value::is_null))
    {
        rows.pop();
    }

    normalize_numeric_columns(&mut rows, columns.len());
    Ok(Table { columns, rows })
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Value::from(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#{:?}", e)),
        Data::Empty => Value::Null,
    }
}

/// Excel stores every number as a float. A column whose numbers are all
/// integral becomes an integer column; otherwise integers widen to floats.
fn normalize_numeric_columns(rows: &mut [Vec<Value>], width: usize) {
    for c in 0..width {
        let mut all_numbers = true;
        let mut integral = true;
        for row in rows.iter() {
            match &row[c] {
                Value::Null => {}
                Value::Number(n) => {
                    let whole = n.as_i64().is_some()
                        || n.as_f64().map_or(false, |f| f.fract() == 0.0 && f.abs() < 9.0e15);
                    integral &= whole;
                }
                _ => {
                    all_numbers = false;
                    break;
                }
            }
        }
        if !all_numbers {
            continue;
        }
        for row in rows.iter_mut() {
            let Some(f) = row[c].as_f64() else { continue };
            row[c] = if integral {
                Value::from(f as i64)
            } else {
                Number::from_f64(f).map_or(Value::Null, Value::Number)
            };
        }
    }
}

/// Inferred type of each column of a loaded table.
pub fn column_types(table: &Table) -> Vec<ColumnType> {
    (0..table.columns.len())
        .map(|c| {
            let mut ty = ColumnType::Empty;
            for row in &table.rows {
                let this = match &row[c] {
                    Value::Null => continue,
                    Value::Bool(_) => ColumnType::Bool,
                    Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Int,
                    Value::Number(_) => ColumnType::Float,
                    _ => ColumnType::Text,
                };
                ty = match (ty, this) {
                    (ColumnType::Empty, t) => t,
                    (a, b) if a == b => a,
                    (ColumnType::Int, ColumnType::Float) | (ColumnType::Float, ColumnType::Int) => {
                        ColumnType::Float
                    }
                    _ => ColumnType::Text,
                };
            }
            ty
        })
        .collect()
}

/// Replace missing cells with empty strings.
pub fn clean(mut table: Table) -> Table {
    for row in &mut table.rows {
        for cell in row.iter_mut() {
            if cell.is_null() {
                *cell = Value::String(String::new());
            }
        }
    }
    table
}

/// Render a cell as display text.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 => format!("{:.1}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Write `table` as CSV, optionally prefixed with a UTF-8 BOM.
pub fn write_csv(table: &Table, path: &Path, bom: bool) -> Result<()> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    if bom {
        file.write_all("\u{feff}".as_bytes())?;
    }
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `table` as an XLSX workbook with a bold header row.
pub fn write_xlsx(table: &Table, path: &Path, sheet_name: &str) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;
    let bold = Format::new().set_bold();

    for (c, column) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, column, &bold)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let c = c as u16;
            match cell {
                Value::Null => {}
                Value::Bool(b) => {
                    sheet.write_boolean(r, c, *b)?;
                }
                Value::Number(n) => {
                    sheet.write_number(r, c, n.as_f64().unwrap_or_default())?;
                }
                Value::String(s) => {
                    sheet.write_string(r, c, s)?;
                }
                other => {
                    sheet.write_string(r, c, other.to_string())?;
                }
            }
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Export a table to `.csv`, `.xlsx`, or `.xls` (written as XLSX).
///
/// Parent directories are created. Returns the absolute output path.
pub fn export(table: &Table, path: &Path, sheet_name: &str) -> Result<PathBuf> {
    let ext = extension(path);
    if ext != ".csv" && !is_excel(&ext) {
        bail!("Unsupported file format: {}. Use .csv or .xlsx", ext);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if ext == ".csv" {
        write_csv(table, path, true)?;
    } else {
        write_xlsx(table, path, sheet_name)?;
    }
    path.canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))
}
