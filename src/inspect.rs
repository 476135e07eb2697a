//! Spreadsheet preview (`seekdb inspect`).
//!
//! Prints file details, the sheets of a workbook, and a preview of one
//! sheet, with optional per-column details, numeric statistics, and CSV
//! export. Useful for choosing `--vectorize-column` before an import.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde_json::Value;

use crate::tabular::{self, cell_text, column_types, Table};

/// Parsed `seekdb inspect` arguments.
#[derive(Debug, Clone)]
pub struct InspectOptions {
    pub file: PathBuf,
    pub sheet: Option<String>,
    pub rows: usize,
    pub list_sheets: bool,
    pub columns: bool,
    pub stats: bool,
    pub to_csv: Option<PathBuf>,
    pub all_rows: bool,
}

/// Summary statistics of one numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

fn check_excel(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    if ext != ".xlsx" && ext != ".xls" {
        bail!("Not an Excel file: {}. Use .xlsx or .xls", ext);
    }
    Ok(())
}

/// Format a byte count as `B`, `KB`, or `MB`.
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Run `seekdb inspect`.
pub fn run_inspect(opts: &InspectOptions) -> Result<()> {
    check_excel(&opts.file)?;
    print_file_info(&opts.file)?;
    print_sheet_info(&opts.file)?;
    if opts.list_sheets {
        return Ok(());
    }

    match &opts.sheet {
        Some(sheet) => println!("\nReading sheet: {}", sheet),
        None => {
            let sheets = tabular::sheet_names(&opts.file)?;
            if let Some(first) = sheets.first() {
                println!("\nReading sheet: {} (first sheet)", first);
            }
        }
    }

    let table = tabular::read_excel(&opts.file, opts.sheet.as_deref())?;
    println!("Total: {} rows x {} columns", table.len(), table.columns.len());

    if opts.columns {
        print!("{}", format_columns(&table));
    }

    let preview_rows = if opts.all_rows { table.len() } else { opts.rows };
    print!("{}", format_preview(&table, preview_rows));

    if opts.stats {
        print!("{}", format_stats(&column_stats(&table)));
    }

    if let Some(out) = &opts.to_csv {
        tabular::write_csv(&table, out, false)?;
        println!("\nExported to CSV: {}", out.display());
    }

    println!();
    Ok(())
}

fn print_file_info(path: &Path) -> Result<()> {
    let size = std::fs::metadata(path)?.len();
    let abs = path.canonicalize()?;
    println!("\n{}", "=".repeat(60));
    println!(
        "File: {}",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );
    println!("Path: {}", abs.display());
    println!("Size: {}", human_size(size));
    println!("{}", "=".repeat(60));
    Ok(())
}

fn print_sheet_info(path: &Path) -> Result<()> {
    let sheets = tabular::sheet_names(path)?;
    println!("\nSheets ({} total):", sheets.len());
    for (i, sheet) in sheets.iter().enumerate() {
        let table = tabular::read_excel(path, Some(sheet))?;
        println!(
            "  {}. {} - {} rows x {} columns",
            i + 1,
            sheet,
            table.len(),
            table.columns.len()
        );
    }
    Ok(())
}

/// Aligned text preview of the first `max_rows` rows, with a row index.
pub fn format_preview(table: &Table, max_rows: usize) -> String {
    let shown = max_rows.min(table.len());
    let mut out = format!(
        "\nData Preview (showing {} of {} rows):\n{}\n",
        shown,
        table.len(),
        "-".repeat(60)
    );

    let index: Vec<String> = (0..shown).map(|i| i.to_string()).collect();
    let cells: Vec<Vec<String>> = table.rows[..shown]
        .iter()
        .map(|row| row.iter().map(|v| preview_cell(v, 50)).collect())
        .collect();

    let index_width = index.iter().map(|s| s.len()).max().unwrap_or(0);
    let widths: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(c, name)| {
            cells
                .iter()
                .map(|r| r[c].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut header = " ".repeat(index_width);
    for (name, w) in table.columns.iter().zip(&widths) {
        header.push_str(&format!("  {:>w$}", name, w = *w));
    }
    out.push_str(header.trim_end());
    out.push('\n');
    for (i, row) in cells.iter().enumerate() {
        let mut line = format!("{:<w$}", index[i], w = index_width);
        for (cell, w) in row.iter().zip(&widths) {
            line.push_str(&format!("  {:>w$}", cell, w = *w));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn preview_cell(value: &Value, max: usize) -> String {
    let text = match value {
        Value::Null => "NaN".to_string(),
        other => cell_text(other),
    };
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max - 3).collect::<String>())
    } else {
        text
    }
}

/// Per-column type and null counts.
pub fn format_columns(table: &Table) -> String {
    let types = column_types(table);
    let mut out = format!("\nColumns ({} total):\n{}\n", table.columns.len(), "-".repeat(60));
    for (c, name) in table.columns.iter().enumerate() {
        let non_null = table.rows.iter().filter(|r| !r[c].is_null()).count();
        out.push_str(&format!("  - {}\n", name));
        out.push_str(&format!(
            "      Type: {}, Non-null: {}, Null: {}\n",
            types[c].as_str(),
            non_null,
            table.len() - non_null
        ));
    }
    out
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Statistics for every numeric column that has at least one value.
///
/// Quantiles interpolate linearly and `std` is the sample standard
/// deviation (NaN for a single value).
pub fn column_stats(table: &Table) -> Vec<ColumnStats> {
    let types = column_types(table);
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(c, _)| types[*c].is_numeric())
        .filter_map(|(c, name)| {
            let mut values: Vec<f64> = table.rows.iter().filter_map(|r| r[c].as_f64()).collect();
            if values.is_empty() {
                return None;
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let std = if values.len() > 1 {
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
            } else {
                f64::NAN
            };
            Some(ColumnStats {
                name: name.clone(),
                count: values.len(),
                mean,
                std,
                min: values[0],
                q25: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q75: quantile(&values, 0.75),
                max: values[values.len() - 1],
            })
        })
        .collect()
}

/// Statistics table, one column per numeric column.
pub fn format_stats(stats: &[ColumnStats]) -> String {
    if stats.is_empty() {
        return "\nNo numeric columns found for statistics.\n".to_string();
    }
    let mut out = format!("\nStatistics (numeric columns only):\n{}\n", "-".repeat(60));
    let labels = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
    let rows: Vec<Vec<String>> = stats
        .iter()
        .map(|s| {
            [
                s.count as f64,
                s.mean,
                s.std,
                s.min,
                s.q25,
                s.median,
                s.q75,
                s.max,
            ]
            .iter()
            .map(|v| if v.is_nan() { "NaN".to_string() } else { format!("{:.2}", v) })
            .collect()
        })
        .collect();
    let widths: Vec<usize> = stats
        .iter()
        .zip(&rows)
        .map(|(s, r)| r.iter().map(|c| c.len()).chain([s.name.chars().count()]).max().unwrap_or(0))
        .collect();

    let mut header = "     ".to_string();
    for (s, w) in stats.iter().zip(&widths) {
        header.push_str(&format!("  {:>w$}", s.name, w = *w));
    }
    out.push_str(&header);
    out.push('\n');
    for (i, label) in labels.iter().enumerate() {
        let mut line = format!("{:<5}", label);
        for (r, w) in rows.iter().zip(&widths) {
            line.push_str(&format!("  {:>w$}", r[i], w = *w));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn table() -> Table {
        Table {
            columns: vec!["name".into(), "price".into(), "qty".into()],
            rows: vec![
                vec![json!("a"), json!(1.0), json!(1)],
                vec![json!("b"), json!(2.0), Value::Null],
                vec![json!("c"), json!(3.0), json!(3)],
                vec![json!("d"), json!(4.0), json!(5)],
            ],
        }
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024 / 2), "1.5 MB");
    }

    #[test]
    fn test_rejects_non_excel() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.csv");
        std::fs::write(&path, "a\n1\n").unwrap();
        let err = check_excel(&path).unwrap_err();
        assert_eq!(err.to_string(), "Not an Excel file: .csv. Use .xlsx or .xls");
    }

    #[test]
    fn test_column_stats() {
        let stats = column_stats(&table());
        assert_eq!(stats.len(), 2);
        let price = &stats[0];
        assert_eq!(price.count, 4);
        assert_eq!(price.mean, 2.5);
        assert_eq!(price.q25, 1.75);
        assert_eq!(price.median, 2.5);
        assert!((price.std - 1.2909944).abs() < 1e-6);
        let qty = &stats[1];
        assert_eq!(qty.count, 3);
        assert_eq!(qty.max, 5.0);
    }

    #[test]
    fn test_format_columns_counts_nulls() {
        let text = format_columns(&table());
        assert!(text.contains("Columns (3 total):"));
        assert!(text.contains("  - qty\n      Type: int64, Non-null: 3, Null: 1"));
        assert!(text.contains("Type: object"));
    }

    #[test]
    fn test_preview_limits_rows() {
        let text = format_preview(&table(), 2);
        assert!(text.contains("showing 2 of 4 rows"));
        assert!(text.contains("NaN"));
        assert!(!text.contains(" c "));
    }

    #[test]
    fn test_no_numeric_columns() {
        assert!(format_stats(&[]).contains("No numeric columns"));
    }
}
