//! Reading uploaded sheets into an [`InputTable`] and writing course CSVs.

use crate::catalog::CourseRecord;
use crate::import::{Cell, CourseField, InputTable};
use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// The two example courses shipped in the import template.
const TEMPLATE_ROWS: &[(&str, &str, i64, i64)] = &[
    ("CS101", "Introduction to Computers", 3, 3),
    ("MATH201", "Mathematics 1", 2, 2),
];

pub fn read_table(path: &Path) -> anyhow::Result<InputTable> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "csv" {
        read_csv_table(path)
    } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        read_workbook_table(path)
    } else {
        Err(anyhow!(
            "unsupported file type: {} (expected .csv, .xlsx or .xls)",
            path.to_string_lossy()
        ))
    }
}

/// Guesses a cell type the way a dataframe reader would: blank is empty,
/// anything that parses as a number is a number, the rest is text.
fn infer_cell(raw: &str) -> Cell {
    let t = raw.trim();
    if t.is_empty() {
        return Cell::Empty;
    }
    match t.parse::<f64>() {
        Ok(n) if n.is_finite() => Cell::Number(n),
        _ => Cell::Text(raw.to_string()),
    }
}

/// Workbook ranges and hand-edited CSVs often end in blank rows. Interior
/// blank rows stay so row numbers keep matching sheet lines.
fn drop_trailing_blank_rows(rows: &mut Vec<Vec<Cell>>) {
    while rows
        .last()
        .is_some_and(|r| r.iter().all(Cell::is_empty))
    {
        rows.pop();
    }
}

pub fn parse_csv_table<R: std::io::Read>(input: R) -> anyhow::Result<InputTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(input);
    let columns = rdr
        .headers()
        .context("failed to read csv header")?
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("failed to read csv line {}", i + 2))?;
        rows.push(rec.iter().map(infer_cell).collect());
    }
    drop_trailing_blank_rows(&mut rows);
    Ok(InputTable::new(columns, rows))
}

fn read_csv_table(path: &Path) -> anyhow::Result<InputTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    parse_csv_table(file)
}

fn workbook_cell(d: &Data) -> Cell {
    match d {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        // Dates, durations and #N/A-style errors carry no course data; keep
        // their text so a misplaced value still shows up in the row reason.
        other => Cell::Text(other.to_string()),
    }
}

fn read_workbook_table(path: &Path) -> anyhow::Result<InputTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("no worksheet found in {}", path.to_string_lossy()))?
        .with_context(|| format!("failed to read first worksheet of {}", path.to_string_lossy()))?;

    let mut rows_iter = range.rows();
    let Some(header) = rows_iter.next() else {
        return Ok(InputTable::default());
    };
    let columns = header
        .iter()
        .map(|d| match d {
            Data::Empty => String::new(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>();

    let mut rows: Vec<Vec<Cell>> = rows_iter
        .map(|r| r.iter().map(workbook_cell).collect())
        .collect();
    drop_trailing_blank_rows(&mut rows);
    Ok(InputTable::new(columns, rows))
}

fn header_row() -> Vec<&'static str> {
    CourseField::ALL.iter().map(|f| f.column_name()).collect()
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    Ok(())
}

/// Writes courses without their ids, in the same layout the importer reads.
pub fn write_courses_csv(path: &Path, courses: &[CourseRecord]) -> anyhow::Result<usize> {
    ensure_parent(path)?;
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
    w.write_record(header_row())?;
    for c in courses {
        w.write_record([
            c.code.clone(),
            c.name.clone(),
            c.credits.to_string(),
            c.sessions_per_week.to_string(),
        ])?;
    }
    w.flush()
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(courses.len())
}

pub fn write_template_csv(path: &Path) -> anyhow::Result<usize> {
    ensure_parent(path)?;
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
    w.write_record(header_row())?;
    for (code, name, credits, sessions) in TEMPLATE_ROWS {
        w.write_record([
            code.to_string(),
            name.to_string(),
            credits.to_string(),
            sessions.to_string(),
        ])?;
    }
    w.flush()
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(TEMPLATE_ROWS.len())
}
