use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::PathBuf;

use crate::models::{Task, TaskDraft, TaskId, TaskPatch};
use crate::session::UserId;
use crate::store::{StatusPredicate, StoreError, TaskStore};
use crate::utils::{format_timestamp, now_timestamp, parse_timestamp};

fn text_conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// SQLite-backed task store. Every row belongs to exactly one user and every
/// statement is scoped by `user_id`.
pub struct SqliteTaskStore {
    conn: Connection,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path` and initialize the schema
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let store = SqliteTaskStore { conn };
        store.initialize_schema()?;

        Ok(store)
    }

    /// A throwaway database that lives as long as the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = SqliteTaskStore {
            conn: Connection::open_in_memory()?,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                status          TEXT NOT NULL DEFAULT 'to-do',
                priority        TEXT NOT NULL DEFAULT 'low',
                date            TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_user_status ON tasks(user_id, status)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cooldowns (
                user_id         TEXT NOT NULL,
                task_id         TEXT NOT NULL,
                until           TEXT NOT NULL,
                PRIMARY KEY (user_id, task_id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Helper function to map a row to a Task
    fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
        let id: i64 = row.get(0)?;
        let status: String = row.get(3)?;
        let priority: String = row.get(4)?;
        let date: Option<String> = row.get(5)?;

        Ok(Task {
            id: TaskId::new(id.to_string()),
            title: row.get(1)?,
            description: row.get(2)?,
            status: status.parse().map_err(|e| text_conversion(3, e))?,
            priority: priority.parse().map_err(|e| text_conversion(4, e))?,
            date: date
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(|e| text_conversion(5, e))?,
        })
    }

    /// Get a single task by ID, scoped to `user`
    pub fn get_task(&self, id: &TaskId, user: &UserId) -> Result<Task, StoreError> {
        let row_id = Self::row_id(id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, status, priority, date
             FROM tasks WHERE id = ?1 AND user_id = ?2",
        )?;

        stmt.query_row(rusqlite::params![row_id, user.as_str()], Self::row_to_task)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.clone()),
                other => StoreError::from(other),
            })
    }

    /// Store ids are integer row ids; anything else cannot exist here.
    fn row_id(id: &TaskId) -> Result<i64, StoreError> {
        id.as_str()
            .parse()
            .map_err(|_| StoreError::NotFound(id.clone()))
    }
}

impl TaskStore for SqliteTaskStore {
    fn list(&mut self, user: &UserId, predicate: StatusPredicate) -> Result<Vec<Task>, StoreError> {
        let (op, status) = match predicate {
            StatusPredicate::Is(s) => ("=", s),
            StatusPredicate::IsNot(s) => ("!=", s),
        };
        let sql = format!(
            "SELECT id, title, description, status, priority, date
             FROM tasks WHERE user_id = ?1 AND status {} ?2 ORDER BY id ASC",
            op
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(rusqlite::params![user.as_str(), status.as_str()], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    fn insert(&mut self, user: &UserId, draft: &TaskDraft) -> Result<Task, StoreError> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO tasks (user_id, title, description, status, priority, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                user.as_str(),
                draft.title,
                draft.description,
                draft.status.as_str(),
                draft.priority.as_str(),
                draft.date.map(format_timestamp),
                now,
                now
            ],
        )?;
        let id = TaskId::new(self.conn.last_insert_rowid().to_string());
        self.get_task(&id, user)
    }

    fn update(&mut self, id: &TaskId, user: &UserId, patch: &TaskPatch) -> Result<(), StoreError> {
        let row_id = Self::row_id(id)?;
        let Some(status) = patch.status else {
            // Nothing to change, but the row must still exist for this user
            return self.get_task(id, user).map(|_| ());
        };

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
            rusqlite::params![status.as_str(), now_timestamp(), row_id, user.as_str()],
        )?;
        tx.commit()?;

        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn delete(&mut self, id: &TaskId, user: &UserId) -> Result<(), StoreError> {
        let row_id = Self::row_id(id)?;
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![row_id, user.as_str()],
        )?;
        tx.execute(
            "DELETE FROM cooldowns WHERE task_id = ?1 AND user_id = ?2",
            rusqlite::params![id.as_str(), user.as_str()],
        )?;
        tx.commit()?;

        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn cooldowns(&mut self, user: &UserId) -> Result<Vec<(TaskId, DateTime<Utc>)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT task_id, until FROM cooldowns WHERE user_id = ?1")?;
        let entries = stmt
            .query_map(rusqlite::params![user.as_str()], |row| {
                let id: String = row.get(0)?;
                let until: String = row.get(1)?;
                let until = DateTime::parse_from_rfc3339(&until)
                    .map_err(|e| text_conversion(1, e))?
                    .with_timezone(&Utc);
                Ok((TaskId::new(id), until))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn set_cooldown(&mut self, id: &TaskId, user: &UserId, until: DateTime<Utc>) -> Result<(), StoreError> {
        // Only tasks this user owns can carry a cooldown
        self.get_task(id, user)?;
        self.conn.execute(
            "INSERT INTO cooldowns (user_id, task_id, until) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, task_id) DO UPDATE SET until = excluded.until",
            rusqlite::params![user.as_str(), id.as_str(), until.to_rfc3339()],
        )?;
        Ok(())
    }
}
