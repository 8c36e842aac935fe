//! The record store behind both the course commands and the importer.

use crate::catalog::{CourseId, CourseRecord, NewCourse};
use rusqlite::{params_from_iter, Connection, OptionalExtension};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("course {0} not found")]
    NotFound(CourseId),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub trait CourseStore {
    fn insert(&self, course: &NewCourse) -> Result<CourseId, StoreError>;
    fn update(&self, id: CourseId, course: &NewCourse) -> Result<(), StoreError>;
    fn delete(&self, id: CourseId) -> Result<(), StoreError>;
    /// Ids that do not exist are ignored. Returns the number of rows removed.
    fn delete_many(&self, ids: &[CourseId]) -> Result<usize, StoreError>;
    fn delete_all(&self) -> Result<usize, StoreError>;
    fn list_all(&self) -> Result<Vec<CourseRecord>, StoreError>;
    fn get(&self, id: CourseId) -> Result<Option<CourseRecord>, StoreError>;

    /// Groups the writes of one import. Stores without transactions keep
    /// the no-op defaults.
    fn begin_batch(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn commit_batch(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn rollback_batch(&self) {}

    /// False once the store has abandoned an open batch by itself, which
    /// SQLite does on errors such as a full disk.
    fn batch_active(&self) -> bool {
        true
    }
}

/// Import batches open their own transaction, so hand this a connection
/// that is not already inside one.
pub struct SqliteCourseStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteCourseStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn course_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CourseRecord> {
    Ok(CourseRecord {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        credits: row.get(3)?,
        sessions_per_week: row.get(4)?,
    })
}

impl CourseStore for SqliteCourseStore<'_> {
    fn insert(&self, course: &NewCourse) -> Result<CourseId, StoreError> {
        self.conn.execute(
            "INSERT INTO courses(code, name, credits, sessions_per_week) VALUES(?, ?, ?, ?)",
            (
                &course.code,
                &course.name,
                course.credits,
                course.sessions_per_week,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, id: CourseId, course: &NewCourse) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE courses
             SET code = ?, name = ?, credits = ?, sessions_per_week = ?
             WHERE id = ?",
            (
                &course.code,
                &course.name,
                course.credits,
                course.sessions_per_week,
                id,
            ),
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: CourseId) -> Result<(), StoreError> {
        let changed = self.conn.execute("DELETE FROM courses WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete_many(&self, ids: &[CourseId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM courses WHERE id IN ({})", placeholders);
        Ok(self.conn.execute(&sql, params_from_iter(ids.iter()))?)
    }

    fn delete_all(&self) -> Result<usize, StoreError> {
        Ok(self.conn.execute("DELETE FROM courses", [])?)
    }

    fn list_all(&self) -> Result<Vec<CourseRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, code, name, credits, sessions_per_week FROM courses ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], course_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get(&self, id: CourseId) -> Result<Option<CourseRecord>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, code, name, credits, sessions_per_week FROM courses WHERE id = ?",
                [id],
                course_from_row,
            )
            .optional()?)
    }

    fn begin_batch(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_batch(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_batch(&self) {
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "failed to roll back import batch");
        }
    }

    fn batch_active(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn course(code: &str) -> NewCourse {
        NewCourse {
            code: code.into(),
            name: format!("{} name", code),
            credits: 3,
            sessions_per_week: 2,
        }
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let conn = db::open_in_memory();
        let store = SqliteCourseStore::new(&conn);
        let a = store.insert(&course("CS101")).expect("insert a");
        let b = store.insert(&course("CS102")).expect("insert b");
        assert!(b > a);

        let all = store.list_all().expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a);
        assert_eq!(all[0].code, "CS101");
        assert_eq!(all[1].code, "CS102");
    }

    #[test]
    fn update_and_delete_report_missing_ids() {
        let conn = db::open_in_memory();
        let store = SqliteCourseStore::new(&conn);
        let id = store.insert(&course("CS101")).expect("insert");

        store.update(id, &course("CS201")).expect("update");
        assert_eq!(store.get(id).expect("get").map(|c| c.code), Some("CS201".into()));

        assert!(matches!(
            store.update(id + 100, &course("X")),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete(id + 100), Err(StoreError::NotFound(_))));

        store.delete(id).expect("delete");
        assert!(store.get(id).expect("get").is_none());
    }

    #[test]
    fn delete_many_ignores_unknown_ids() {
        let conn = db::open_in_memory();
        let store = SqliteCourseStore::new(&conn);
        let a = store.insert(&course("A1")).expect("insert");
        let b = store.insert(&course("B1")).expect("insert");
        let c = store.insert(&course("C1")).expect("insert");

        assert_eq!(store.delete_many(&[]).expect("empty"), 0);
        assert_eq!(store.delete_many(&[a, c, 9999]).expect("delete many"), 2);
        let left: Vec<_> = store.list_all().expect("list").into_iter().map(|c| c.id).collect();
        assert_eq!(left, vec![b]);

        assert_eq!(store.delete_all().expect("delete all"), 1);
        assert!(store.list_all().expect("list").is_empty());
    }

    #[test]
    fn rolled_back_batch_leaves_courses_untouched() {
        let conn = db::open_in_memory();
        let store = SqliteCourseStore::new(&conn);
        store.insert(&course("KEEP")).expect("insert");

        store.begin_batch().expect("begin");
        store.delete_all().expect("delete all");
        store.insert(&course("TEMP")).expect("insert in batch");
        store.rollback_batch();

        let codes: Vec<_> = store.list_all().expect("list").into_iter().map(|c| c.code).collect();
        assert_eq!(codes, vec!["KEEP".to_string()]);
    }

    #[test]
    fn batch_stays_active_after_a_constraint_failure() {
        let conn = db::open_in_memory();
        let store = SqliteCourseStore::new(&conn);
        assert!(!store.batch_active());

        store.begin_batch().expect("begin");
        assert!(store.batch_active());
        assert!(store.insert(&course("ABCDEFGHIJKLM")).is_err());
        assert!(store.batch_active());
        store.rollback_batch();
        assert!(!store.batch_active());
        // A second rollback has no open batch to act on.
        store.rollback_batch();
    }

    #[test]
    fn table_constraints_reject_oversized_code() {
        let conn = db::open_in_memory();
        let store = SqliteCourseStore::new(&conn);
        let err = store
            .insert(&course("ABCDEFGHIJKLM"))
            .expect_err("code longer than the column allows");
        assert!(err.to_string().contains("CHECK constraint failed"), "{}", err);
        assert!(store.list_all().expect("list").is_empty());
    }
}
