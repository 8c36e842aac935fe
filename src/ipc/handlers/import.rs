use super::{get_optional_bool, get_optional_str, get_required_str, require_db, respond};
use crate::import::{
    map_columns, run_import, validate_schema, DuplicateColumnPolicy, ImportMode, ImportOptions,
    ImportOutcome, ImportReporter, InputTable, SchemaError,
};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::sheet;
use crate::store::{CourseStore, SqliteCourseStore};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Renders row failures the way the import dialog shows them: at most
/// `limit` lines, then a count of the rest.
pub(crate) fn render_messages(outcome: &ImportOutcome, limit: usize) -> Vec<String> {
    let mut lines: Vec<String> = outcome
        .failures
        .iter()
        .take(limit)
        .map(|f| f.message())
        .collect();
    let hidden = outcome.failures.len().saturating_sub(limit);
    if hidden > 0 {
        lines.push(format!("... and {} more errors", hidden));
    }
    lines
}

fn summary(outcome: &ImportOutcome) -> String {
    let mut s = format!("Successfully imported {} course(s)", outcome.inserted_count);
    if let Some(removed) = outcome.removed_count {
        s.push_str(&format!(", replacing {} existing", removed));
    }
    if outcome.failed_count > 0 {
        s.push_str(&format!(
            "; {} row(s) had errors and were skipped",
            outcome.failed_count
        ));
    }
    s
}

/// Turns what the importer reports into the IPC response for `import.run`.
struct ResponseReporter {
    import_id: String,
    display_limit: usize,
    rendered: Option<Result<serde_json::Value, HandlerErr>>,
}

impl ResponseReporter {
    fn new(import_id: String, display_limit: usize) -> Self {
        Self {
            import_id,
            display_limit,
            rendered: None,
        }
    }

    fn finish(self) -> Result<serde_json::Value, HandlerErr> {
        self.rendered
            .unwrap_or_else(|| Err(HandlerErr::new("import_failed", "import produced no result")))
    }
}

impl ImportReporter for ResponseReporter {
    fn report_outcome(&mut self, outcome: &ImportOutcome) {
        let mut body = json!({
            "importId": self.import_id,
            "outcome": outcome,
            "messages": render_messages(outcome, self.display_limit),
        });
        self.rendered = Some(if outcome.success {
            body["summary"] = json!(summary(outcome));
            Ok(body)
        } else {
            let message = outcome
                .error
                .clone()
                .unwrap_or_else(|| "import failed".to_string());
            Err(HandlerErr::new("import_failed", message).with_details(body))
        });
    }

    fn report_schema_error(&mut self, error: &SchemaError) {
        self.rendered = Some(Err(HandlerErr::new(
            error.code(),
            format!("Invalid file format: {}", error),
        )
        .with_details(json!({ "importId": self.import_id, "reason": error.to_string() }))));
    }
}

/// Reads the table from `inPath` (CSV or workbook) or an inline `table`.
fn load_table(params: &serde_json::Value) -> Result<InputTable, HandlerErr> {
    if let Some(path) = get_optional_str(params, "inPath") {
        let path = PathBuf::from(path);
        return sheet::read_table(&path).map_err(|e| {
            HandlerErr::new("parse_failed", format!("{e:#}"))
                .with_details(json!({ "path": path.to_string_lossy() }))
        });
    }
    match params.get("table") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid table: {}", e))),
        None => Err(HandlerErr::bad_params("missing inPath or table")),
    }
}

fn import_options(state: &AppState, params: &serde_json::Value) -> Result<ImportOptions, HandlerErr> {
    let mode = match get_optional_str(params, "mode") {
        Some(raw) => raw.parse::<ImportMode>().map_err(HandlerErr::bad_params)?,
        None => ImportMode::default(),
    };
    let strict = get_optional_bool(params, "strictColumns")?.unwrap_or(state.config.strict_columns);
    Ok(ImportOptions {
        mode,
        duplicate_columns: DuplicateColumnPolicy::from_strict(strict),
    })
}

fn import_template(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let rows = sheet::write_template_csv(&out_path).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    Ok(json!({ "path": out_path.to_string_lossy(), "sampleRows": rows }))
}

fn import_preview(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let table = load_table(params)?;
    let options = import_options(state, params)?;
    let limit = match params.get("previewRows") {
        None | Some(serde_json::Value::Null) => DEFAULT_PREVIEW_ROWS,
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| HandlerErr::bad_params("previewRows must be a non-negative integer"))?,
    };

    let mapping = match validate_schema(&table, options.duplicate_columns) {
        Ok(m) => m,
        Err(e) => {
            let found: serde_json::Map<String, serde_json::Value> = map_columns(&table.columns)
                .presence()
                .into_iter()
                .map(|(f, present)| (f.as_str().to_string(), json!(present)))
                .collect();
            return Ok(json!({
                "valid": false,
                "code": e.code(),
                "reason": e.to_string(),
                "rowCount": table.row_count(),
                "found": found,
            }));
        }
    };

    // Replace mode shows how many stored courses would go away.
    let existing_count = match (options.mode, state.db.as_ref()) {
        (ImportMode::Replace, Some(conn)) => Some(
            SqliteCourseStore::new(conn)
                .list_all()
                .map_err(|e| HandlerErr::store("db_query_failed", e))?
                .len(),
        ),
        _ => None,
    };

    let rows: Vec<&Vec<_>> = table.rows.iter().take(limit).collect();
    Ok(json!({
        "valid": true,
        "message": "Valid format",
        "mode": options.mode,
        "columns": table.columns,
        "mapping": mapping.to_json(),
        "rowCount": table.row_count(),
        "rows": rows,
        "existingCount": existing_count,
    }))
}

fn import_run(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let options = import_options(state, params)?;
    let table = load_table(params)?;
    let conn = require_db(state)?;

    let import_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("import", import_id = %import_id, mode = options.mode.as_str());
    let _enter = span.enter();

    let store = SqliteCourseStore::new(conn);
    let mut reporter = ResponseReporter::new(import_id, state.config.error_display_limit);
    // Both outcomes and schema rejections reach the reporter.
    let _ = run_import(&table, options, &store, &mut reporter);
    reporter.finish()
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.template" => Some(respond(req, import_template(&req.params))),
        "import.preview" => Some(respond(req, import_preview(state, &req.params))),
        "import.run" => Some(respond(req, import_run(state, &req.params))),
        _ => None,
    }
}
