use super::{get_course_id, get_required_str, require_db, respond};
use crate::catalog::{CourseDraft, CourseRecord, CourseViolation, NewCourse};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::sheet;
use crate::store::{CourseStore, SqliteCourseStore};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn draft_from_params(params: &serde_json::Value) -> CourseDraft {
    let text = |key: &str| params.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let int = |key: &str| params.get(key).and_then(|v| v.as_i64());
    CourseDraft {
        code: text("code"),
        name: text("name"),
        credits: int("credits"),
        sessions_per_week: int("sessionsPerWeek"),
    }
}

/// Fields missing from `params` keep their current value.
fn overlay(current: &CourseRecord, params: &serde_json::Value) -> CourseDraft {
    let d = draft_from_params(params);
    CourseDraft {
        code: d.code.or_else(|| Some(current.code.clone())),
        name: d.name.or_else(|| Some(current.name.clone())),
        credits: d.credits.or(Some(current.credits)),
        sessions_per_week: d.sessions_per_week.or(Some(current.sessions_per_week)),
    }
}

fn invalid(e: CourseViolation) -> HandlerErr {
    HandlerErr::new("invalid_course", e.to_string())
}

fn validated(draft: CourseDraft) -> Result<NewCourse, HandlerErr> {
    draft.validate().map_err(invalid)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn courses_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let courses = SqliteCourseStore::new(conn)
        .list_all()
        .map_err(|e| HandlerErr::store("db_query_failed", e))?;
    Ok(json!({ "courses": courses }))
}

fn courses_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_course_id(params, "courseId")?;
    let course = SqliteCourseStore::new(conn)
        .get(course_id)
        .map_err(|e| HandlerErr::store("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "course not found")
                .with_details(json!({ "courseId": course_id }))
        })?;
    Ok(json!({ "course": course }))
}

fn courses_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course = validated(draft_from_params(params))?;
    let course_id = SqliteCourseStore::new(conn)
        .insert(&course)
        .map_err(|e| HandlerErr::store("db_insert_failed", e))?;
    tracing::info!(course_id, code = %course.code, "course created");
    Ok(json!({ "courseId": course_id, "course": course.with_id(course_id) }))
}

fn courses_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_course_id(params, "courseId")?;
    let store = SqliteCourseStore::new(conn);
    let current = store
        .get(course_id)
        .map_err(|e| HandlerErr::store("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "course not found")
                .with_details(json!({ "courseId": course_id }))
        })?;
    let course = validated(overlay(&current, params))?;
    store
        .update(course_id, &course)
        .map_err(|e| HandlerErr::store("db_update_failed", e))?;
    Ok(json!({ "course": course.with_id(course_id) }))
}

fn courses_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_course_id(params, "courseId")?;
    SqliteCourseStore::new(conn)
        .delete(course_id)
        .map_err(|e| HandlerErr::store("db_delete_failed", e))?;
    Ok(json!({ "deleted": 1, "message": "course deleted successfully" }))
}

fn courses_delete_many(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = params.get("courseIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing courseIds"));
    };
    let mut ids = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(id) = v.as_i64() else {
            return Err(HandlerErr::bad_params("courseIds must be integers"));
        };
        ids.push(id);
    }
    if ids.is_empty() {
        return Err(HandlerErr::bad_params("courseIds must not be empty"));
    }

    let deleted = SqliteCourseStore::new(conn)
        .delete_many(&ids)
        .map_err(|e| HandlerErr::store("db_delete_failed", e))?;
    tracing::info!(requested = ids.len(), deleted, "courses deleted");
    Ok(json!({
        "deleted": deleted,
        "message": format!("{} course(s) deleted successfully", deleted),
    }))
}

fn courses_stats(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let courses = SqliteCourseStore::new(conn)
        .list_all()
        .map_err(|e| HandlerErr::store("db_query_failed", e))?;
    let total = courses.len();
    let avg = |f: fn(&CourseRecord) -> i64| {
        if total == 0 {
            None
        } else {
            let sum: i64 = courses.iter().map(f).sum();
            Some(round1(sum as f64 / total as f64))
        }
    };
    Ok(json!({
        "total": total,
        "avgCredits": avg(|c| c.credits),
        "avgSessionsPerWeek": avg(|c| c.sessions_per_week),
    }))
}

fn courses_export_csv(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let courses = SqliteCourseStore::new(conn)
        .list_all()
        .map_err(|e| HandlerErr::store("db_query_failed", e))?;
    let rows = sheet::write_courses_csv(&out_path, &courses).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    Ok(json!({ "path": out_path.to_string_lossy(), "rowsExported": rows }))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };
    respond(req, courses_list(conn))
}

fn handle_with_db(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let result = require_db(state).and_then(|conn| f(conn, &req.params));
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.get" => Some(handle_with_db(state, req, courses_get)),
        "courses.create" => Some(handle_with_db(state, req, courses_create)),
        "courses.update" => Some(handle_with_db(state, req, courses_update)),
        "courses.delete" => Some(handle_with_db(state, req, courses_delete)),
        "courses.deleteMany" => Some(handle_with_db(state, req, courses_delete_many)),
        "courses.stats" => Some(handle_with_db(state, req, courses_stats)),
        "courses.exportCsv" => Some(handle_with_db(state, req, courses_export_csv)),
        _ => None,
    }
}
