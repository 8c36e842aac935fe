//! Spreadsheet import: header normalization, per-row validation and the
//! append/replace load into a [`CourseStore`].
//!
//! [`run_import`] is the entry point. It rejects a table whose headers do
//! not cover the four course fields before touching the store. After that,
//! it always produces one [`ImportOutcome`] and hands it to the
//! [`ImportReporter`], whether the rows loaded or the operation aborted.

mod importer;
mod schema;
mod table;

pub use importer::{ImportMode, ImportOutcome};
pub use schema::{map_columns, validate_schema, CourseField, DuplicateColumnPolicy, SchemaError};
pub use table::{Cell, InputTable};

use crate::store::{CourseStore, StoreError};
use importer::{import_rows, LoadError};
use schema::ColumnMapping;

/// Receives the result of an import for display.
pub trait ImportReporter {
    fn report_outcome(&mut self, outcome: &ImportOutcome);
    fn report_schema_error(&mut self, error: &SchemaError);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub duplicate_columns: DuplicateColumnPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{context}: {source}")]
    Operation {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ImportError {
    fn operation(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Operation { context, source }
    }
}

fn load<S: CourseStore + ?Sized>(
    table: &InputTable,
    mapping: &ColumnMapping,
    mode: ImportMode,
    store: &S,
) -> Result<ImportOutcome, ImportError> {
    store
        .begin_batch()
        .map_err(ImportError::operation("course store unavailable"))?;

    let outcome = match import_rows(table, mapping, mode, store) {
        Ok(o) => o,
        Err(e) => {
            store.rollback_batch();
            return Err(match e {
                LoadError::Clear(source) => {
                    ImportError::operation("failed to clear existing courses")(source)
                }
                LoadError::BatchLost { source, .. } => {
                    ImportError::operation("import rolled back by the course store")(source)
                }
            });
        }
    };

    if let Err(e) = store.commit_batch() {
        store.rollback_batch();
        return Err(ImportError::operation("failed to commit import")(e));
    }
    Ok(outcome)
}

pub fn run_import<S, R>(
    table: &InputTable,
    options: ImportOptions,
    store: &S,
    reporter: &mut R,
) -> Result<ImportOutcome, ImportError>
where
    S: CourseStore + ?Sized,
    R: ImportReporter + ?Sized,
{
    let mapping = match validate_schema(table, options.duplicate_columns) {
        Ok(m) => m,
        Err(e) => {
            tracing::info!(reason = %e, "import rejected");
            reporter.report_schema_error(&e);
            return Err(e.into());
        }
    };

    tracing::info!(
        mode = options.mode.as_str(),
        rows = table.row_count(),
        "import started"
    );

    match load(table, &mapping, options.mode, store) {
        Ok(outcome) => {
            tracing::info!(
                inserted = outcome.inserted_count,
                failed = outcome.failed_count,
                "import finished"
            );
            reporter.report_outcome(&outcome);
            Ok(outcome)
        }
        Err(e) => {
            tracing::warn!(error = %e, "import aborted");
            reporter.report_outcome(&ImportOutcome::aborted(options.mode, e.to_string()));
            Err(e)
        }
    }
}
