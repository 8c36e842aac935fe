//! Course records and the field rules every stored course satisfies.
//!
//! Both the single-record commands and the spreadsheet importer build a
//! [`CourseDraft`] and run it through [`CourseDraft::validate`], so a course
//! is checked the same way regardless of how it arrives.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub type CourseId = i64;

pub const CREDITS_RANGE: RangeInclusive<i64> = 1..=10;
pub const SESSIONS_RANGE: RangeInclusive<i64> = 1..=10;

/// Column widths of the `courses` table.
pub const CODE_MAX_CHARS: usize = 10;
pub const NAME_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: CourseId,
    pub code: String,
    pub name: String,
    pub credits: i64,
    pub sessions_per_week: i64,
}

/// A validated course that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    pub credits: i64,
    pub sessions_per_week: i64,
}

impl NewCourse {
    pub fn with_id(self, id: CourseId) -> CourseRecord {
        CourseRecord {
            id,
            code: self.code,
            name: self.name,
            credits: self.credits,
            sessions_per_week: self.sessions_per_week,
        }
    }
}

/// Field values as they were found, before any checks. `None` means the
/// value was absent or could not be read as the expected type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseDraft {
    pub code: Option<String>,
    pub name: Option<String>,
    pub credits: Option<i64>,
    pub sessions_per_week: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CourseViolation {
    #[error("missing course code")]
    MissingCode,
    #[error("missing course name")]
    MissingName,
    #[error("missing course credits")]
    MissingCredits,
    #[error("missing sessions per week")]
    MissingSessions,
    #[error("credits out of range")]
    CreditsOutOfRange,
    #[error("sessions out of range")]
    SessionsOutOfRange,
}

impl CourseDraft {
    /// Checks the fields in a fixed order and stops at the first violation.
    pub fn validate(self) -> Result<NewCourse, CourseViolation> {
        let code = self
            .code
            .as_deref()
            .and_then(present_text)
            .ok_or(CourseViolation::MissingCode)?;
        let name = self
            .name
            .as_deref()
            .and_then(present_text)
            .ok_or(CourseViolation::MissingName)?;
        let credits = self.credits.ok_or(CourseViolation::MissingCredits)?;
        let sessions_per_week = self
            .sessions_per_week
            .ok_or(CourseViolation::MissingSessions)?;

        if !CREDITS_RANGE.contains(&credits) {
            return Err(CourseViolation::CreditsOutOfRange);
        }
        if !SESSIONS_RANGE.contains(&sessions_per_week) {
            return Err(CourseViolation::SessionsOutOfRange);
        }

        Ok(NewCourse {
            code,
            name,
            credits,
            sessions_per_week,
        })
    }
}

fn present_text(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
