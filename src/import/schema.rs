//! Maps free-form sheet headers onto the four course fields.

use super::table::InputTable;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CourseField {
    Code,
    Name,
    Credits,
    SessionsPerWeek,
}

impl CourseField {
    /// Also the order in which missing columns are reported.
    pub const ALL: [CourseField; 4] = [
        CourseField::Code,
        CourseField::Name,
        CourseField::Credits,
        CourseField::SessionsPerWeek,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Name => "name",
            Self::Credits => "credits",
            Self::SessionsPerWeek => "sessionsPerWeek",
        }
    }

    /// Header written to templates and exports.
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Code => "course_code",
            Self::Name => "course_name",
            Self::Credits => "course_credits",
            Self::SessionsPerWeek => "sessions_per_week",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Name => "name",
            Self::Credits => "credits",
            Self::SessionsPerWeek => "sessions",
        }
    }

    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Code => &["course_code", "coursecode", "code"],
            Self::Name => &["course_name", "coursename", "name"],
            Self::Credits => &["course_credits", "credits", "credit"],
            Self::SessionsPerWeek => &["sessions_per_week", "sessions", "sessionsperweek"],
        }
    }
}

impl std::fmt::Display for CourseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn synonym_table() -> &'static HashMap<&'static str, CourseField> {
    static TABLE: OnceLock<HashMap<&'static str, CourseField>> = OnceLock::new();
    TABLE.get_or_init(|| {
        CourseField::ALL
            .iter()
            .flat_map(|f| f.synonyms().iter().map(move |s| (*s, *f)))
            .collect()
    })
}

/// Lowercase with all whitespace removed, so "Course Name" and
/// " course name " both become "coursename".
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn field_for_label(label: &str) -> Option<CourseField> {
    synonym_table().get(normalize_label(label).as_str()).copied()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedColumn {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    selected: BTreeMap<CourseField, MappedColumn>,
    candidates: BTreeMap<CourseField, Vec<MappedColumn>>,
}

impl ColumnMapping {
    pub fn get(&self, field: CourseField) -> Option<&MappedColumn> {
        self.selected.get(&field)
    }

    pub fn is_present(&self, field: CourseField) -> bool {
        self.selected.contains_key(&field)
    }

    pub fn presence(&self) -> Vec<(CourseField, bool)> {
        CourseField::ALL
            .iter()
            .map(|f| (*f, self.is_present(*f)))
            .collect()
    }

    pub fn first_missing(&self) -> Option<CourseField> {
        CourseField::ALL.into_iter().find(|f| !self.is_present(*f))
    }

    /// Every label that matched `field`, in column order.
    pub fn candidates(&self, field: CourseField) -> &[MappedColumn] {
        self.candidates.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_duplicate(&self) -> Option<(CourseField, Vec<String>)> {
        CourseField::ALL.into_iter().find_map(|f| {
            let c = self.candidates(f);
            if c.len() > 1 {
                Some((f, c.iter().map(|m| m.label.clone()).collect()))
            } else {
                None
            }
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for f in CourseField::ALL {
            let v = match self.get(f) {
                Some(m) => serde_json::json!({ "index": m.index, "label": m.label }),
                None => serde_json::Value::Null,
            };
            out.insert(f.as_str().to_string(), v);
        }
        serde_json::Value::Object(out)
    }
}

/// Later columns overwrite earlier ones for the same field.
pub fn map_columns<S: AsRef<str>>(labels: &[S]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    for (index, label) in labels.iter().enumerate() {
        let label = label.as_ref();
        let Some(field) = field_for_label(label) else {
            continue;
        };
        let col = MappedColumn {
            index,
            label: label.to_string(),
        };
        mapping
            .candidates
            .entry(field)
            .or_default()
            .push(col.clone());
        mapping.selected.insert(field, col);
    }
    mapping
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateColumnPolicy {
    #[default]
    LastWins,
    Reject,
}

impl DuplicateColumnPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Reject
        } else {
            Self::LastWins
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("empty input")]
    EmptyInput,

    #[error("missing column: {} (or '{}')", .0.column_name(), .0.short_name())]
    MissingColumn(CourseField),

    #[error("duplicate columns for {}: {}", .field.column_name(), .labels.join(", "))]
    DuplicateColumn {
        field: CourseField,
        labels: Vec<String>,
    },
}

impl SchemaError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "schema_empty",
            Self::MissingColumn(_) => "schema_missing_column",
            Self::DuplicateColumn { .. } => "schema_duplicate_column",
        }
    }
}

/// Stops at the first defect: an empty table, then the first missing field
/// in [`CourseField::ALL`] order, then (under `Reject`) duplicate headers.
pub fn validate_schema(
    table: &InputTable,
    policy: DuplicateColumnPolicy,
) -> Result<ColumnMapping, SchemaError> {
    if table.is_empty() {
        return Err(SchemaError::EmptyInput);
    }
    let mapping = map_columns(&table.columns);
    if let Some(field) = mapping.first_missing() {
        return Err(SchemaError::MissingColumn(field));
    }
    if policy == DuplicateColumnPolicy::Reject {
        if let Some((field, labels)) = mapping.first_duplicate() {
            return Err(SchemaError::DuplicateColumn { field, labels });
        }
    }
    Ok(mapping)
}
