use super::schema::{ColumnMapping, CourseField};
use super::table::{Cell, InputTable};
use crate::catalog::{CourseDraft, CourseViolation, NewCourse};
use crate::store::{CourseStore, StoreError};
use serde::Serialize;

/// Added to the 1-based data row position so the number shown to the user
/// matches the sheet line, counting the header.
pub const ROW_NUMBER_OFFSET: usize = 1;

/// Placeholders spreadsheet exports write into blank cells. Matched
/// exactly, after trimming.
const MISSING_TOKENS: &[&str] = &[
    "nan", "NaN", "-nan", "-NaN", "NA", "N/A", "n/a", "<NA>", "#N/A", "#N/A N/A", "#NA",
    "-1.#IND", "-1.#QNAN", "1.#IND", "1.#QNAN", "NULL", "null", "None",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Append,
    Replace,
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown import mode: {other} (expected append or replace)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFailureKind {
    Validation,
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub reason: String,
    pub kind: RowFailureKind,
}

impl RowFailure {
    pub fn message(&self) -> String {
        format!("Row {}: {}", self.row, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error(transparent)]
    Invalid(#[from] CourseViolation),

    #[error("could not save course: {0}")]
    Rejected(#[from] StoreError),
}

impl RowError {
    pub fn kind(&self) -> RowFailureKind {
        match self {
            Self::Invalid(_) => RowFailureKind::Validation,
            Self::Rejected(_) => RowFailureKind::Persistence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub mode: ImportMode,
    pub success: bool,
    pub inserted_count: usize,
    pub failed_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_count: Option<usize>,
    pub failures: Vec<RowFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportOutcome {
    fn new(mode: ImportMode) -> Self {
        Self {
            mode,
            success: true,
            inserted_count: 0,
            failed_count: 0,
            removed_count: None,
            failures: Vec::new(),
            error: None,
        }
    }

    /// The operation could not run; nothing was imported.
    pub fn aborted(mode: ImportMode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::new(mode)
        }
    }

    fn record(&mut self, row: usize, result: Result<(), RowError>) {
        match result {
            Ok(()) => self.inserted_count += 1,
            Err(e) => {
                self.failed_count += 1;
                self.failures.push(RowFailure {
                    row,
                    kind: e.kind(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn text_value(cell: &Cell) -> Option<String> {
    let text = match cell {
        Cell::Empty => return None,
        Cell::Text(s) => s.trim().to_string(),
        Cell::Number(n) if n.is_nan() => return None,
        Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Cell::Number(n) => n.to_string(),
        Cell::Bool(b) => b.to_string(),
    };
    if text.is_empty() || MISSING_TOKENS.contains(&text.as_str()) {
        None
    } else {
        Some(text)
    }
}

fn truncate_float(n: f64) -> Option<i64> {
    if n.is_finite() && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Some(n.trunc() as i64)
    } else {
        None
    }
}

/// Non-numeric values read as absent so they fail the presence check.
/// Booleans count as non-numeric here, although a sheet loaded as a
/// dataframe would turn `True` into 1.
fn int_value(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Number(n) => truncate_float(*n),
        Cell::Text(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().and_then(truncate_float))
        }
        Cell::Empty | Cell::Bool(_) => None,
    }
}

fn mapped_cell<'t>(
    table: &'t InputTable,
    mapping: &ColumnMapping,
    row: usize,
    field: CourseField,
) -> Option<&'t Cell> {
    mapping.get(field).map(|col| table.cell(row, col.index))
}

pub fn extract_row(table: &InputTable, mapping: &ColumnMapping, row: usize) -> CourseDraft {
    let cell = |field| mapped_cell(table, mapping, row, field);
    CourseDraft {
        code: cell(CourseField::Code).and_then(text_value),
        name: cell(CourseField::Name).and_then(text_value),
        credits: cell(CourseField::Credits).and_then(int_value),
        sessions_per_week: cell(CourseField::SessionsPerWeek).and_then(int_value),
    }
}

fn import_row<S: CourseStore + ?Sized>(
    store: &S,
    table: &InputTable,
    mapping: &ColumnMapping,
    row: usize,
) -> Result<NewCourse, RowError> {
    let course = extract_row(table, mapping, row).validate()?;
    store.insert(&course)?;
    Ok(course)
}

/// Why [`import_rows`] stopped before the last row.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to clear existing courses: {0}")]
    Clear(#[source] StoreError),

    /// The store abandoned the open batch while saving `row`, so nothing
    /// written earlier in this import survives.
    #[error("batch rolled back by the store at row {row}: {source}")]
    BatchLost {
        row: usize,
        #[source]
        source: StoreError,
    },
}

/// Runs every row in order against `store` inside a batch the caller has
/// begun. Row problems are collected. The import stops only when replace
/// mode cannot clear the store or the store drops the batch.
pub fn import_rows<S: CourseStore + ?Sized>(
    table: &InputTable,
    mapping: &ColumnMapping,
    mode: ImportMode,
    store: &S,
) -> Result<ImportOutcome, LoadError> {
    let mut outcome = ImportOutcome::new(mode);

    if mode == ImportMode::Replace {
        let removed = store.delete_all().map_err(LoadError::Clear)?;
        tracing::info!(removed, "cleared existing courses before import");
        outcome.removed_count = Some(removed);
    }

    for row in 0..table.row_count() {
        let row_number = row + 1 + ROW_NUMBER_OFFSET;
        match import_row(store, table, mapping, row) {
            Err(RowError::Rejected(source)) if !store.batch_active() => {
                tracing::warn!(row = row_number, error = %source, "store dropped the import batch");
                return Err(LoadError::BatchLost {
                    row: row_number,
                    source,
                });
            }
            Ok(course) => {
                tracing::trace!(row = row_number, code = %course.code, "imported course");
                outcome.record(row_number, Ok(()));
            }
            Err(e) => {
                tracing::debug!(row = row_number, reason = %e, "row skipped");
                outcome.record(row_number, Err(e));
            }
        }
    }

    Ok(outcome)
}
