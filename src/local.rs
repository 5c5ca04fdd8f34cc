use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{Task, TaskDraft, TaskId, TaskPatch};
use crate::session::UserId;
use crate::store::{StatusPredicate, StoreError, TaskStore};

/// One persisted row: a task and the user it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    user_id: UserId,
    #[serde(flatten)]
    task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cooldown_until: Option<DateTime<Utc>>,
}

/// Task store kept in a single JSON file: an ordered list of task records.
///
/// The file is read once when the store is opened and rewritten after every
/// successful mutation.
pub struct JsonTaskStore {
    path: PathBuf,
    records: Vec<Record>,
}

impl JsonTaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), records = records.len(), "opened task file");

        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::DirectoryError(e.to_string()))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.records)?;

        // Write to a sibling file first so a crash never leaves half a file behind
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn position(&self, id: &TaskId, user: &UserId) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|r| &r.user_id == user && &r.task.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

impl TaskStore for JsonTaskStore {
    fn list(&mut self, user: &UserId, predicate: StatusPredicate) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| &r.user_id == user && predicate.matches(r.task.status))
            .map(|r| r.task.clone())
            .collect())
    }

    fn insert(&mut self, user: &UserId, draft: &TaskDraft) -> Result<Task, StoreError> {
        let task = Task::from_draft(TaskId::new(uuid::Uuid::now_v7().to_string()), draft);
        self.records.push(Record {
            user_id: user.clone(),
            task: task.clone(),
            cooldown_until: None,
        });
        if let Err(e) = self.save() {
            self.records.pop();
            return Err(e);
        }
        Ok(task)
    }

    fn update(&mut self, id: &TaskId, user: &UserId, patch: &TaskPatch) -> Result<(), StoreError> {
        let index = self.position(id, user)?;
        let before = self.records[index].task.clone();
        patch.apply(&mut self.records[index].task);
        if let Err(e) = self.save() {
            self.records[index].task = before;
            return Err(e);
        }
        Ok(())
    }

    fn delete(&mut self, id: &TaskId, user: &UserId) -> Result<(), StoreError> {
        let index = self.position(id, user)?;
        let removed = self.records.remove(index);
        if let Err(e) = self.save() {
            self.records.insert(index, removed);
            return Err(e);
        }
        Ok(())
    }

    fn cooldowns(&mut self, user: &UserId) -> Result<Vec<(TaskId, DateTime<Utc>)>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| &r.user_id == user)
            .filter_map(|r| r.cooldown_until.map(|until| (r.task.id.clone(), until)))
            .collect())
    }

    fn set_cooldown(&mut self, id: &TaskId, user: &UserId, until: DateTime<Utc>) -> Result<(), StoreError> {
        let index = self.position(id, user)?;
        let before = self.records[index].cooldown_until.replace(until);
        if let Err(e) = self.save() {
            self.records[index].cooldown_until = before;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonTaskStore::open(dir.path().join("tasks.json")).unwrap();
        let user = UserId::new("U1");
        assert!(store.list(&user, StatusPredicate::IsNot(Status::Done)).unwrap().is_empty());
    }

    #[test]
    fn test_mutations_are_written_and_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("tasks.json");
        let user = UserId::new("U1");

        let (kept, gone) = {
            let mut store = JsonTaskStore::open(&path).unwrap();
            let kept = store.insert(&user, &TaskDraft::new("kept", "x")).unwrap();
            let gone = store.insert(&user, &TaskDraft::new("gone", "x")).unwrap();
            store.update(&kept.id, &user, &TaskPatch::status(Status::Done)).unwrap();
            store.delete(&gone.id, &user).unwrap();
            (kept, gone)
        };

        let mut store = JsonTaskStore::open(&path).unwrap();
        let done = store.list(&user, StatusPredicate::Is(Status::Done)).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, kept.id);
        assert!(store.list(&user, StatusPredicate::IsNot(Status::Done)).unwrap().is_empty());
        assert!(matches!(store.delete(&gone.id, &user), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_records_are_scoped_by_user() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonTaskStore::open(dir.path().join("tasks.json")).unwrap();
        let task = store.insert(&UserId::new("U1"), &TaskDraft::new("a", "x")).unwrap();

        let other = UserId::new("U2");
        assert!(store.list(&other, StatusPredicate::IsNot(Status::Done)).unwrap().is_empty());
        assert!(matches!(
            store.update(&task.id, &other, &TaskPatch::status(Status::Done)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_is_an_ordered_list_of_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let mut store = JsonTaskStore::open(&path).unwrap();
        store.insert(&UserId::new("U1"), &TaskDraft::new("first", "x")).unwrap();
        store.insert(&UserId::new("U1"), &TaskDraft::new("second", "x")).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let rows = raw.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "first");
        assert_eq!(rows[0]["user_id"], "U1");
        assert_eq!(rows[1]["status"], "to-do");
    }

    #[test]
    fn test_cooldowns_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let user = UserId::new("U1");
        let until = DateTime::from_timestamp(1_760_000_003, 0).unwrap();

        let task = {
            let mut store = JsonTaskStore::open(&path).unwrap();
            let task = store.insert(&user, &TaskDraft::new("a", "x")).unwrap();
            store.set_cooldown(&task.id, &user, until).unwrap();
            task
        };

        let mut store = JsonTaskStore::open(&path).unwrap();
        assert_eq!(store.cooldowns(&user).unwrap(), vec![(task.id.clone(), until)]);
        assert!(store.cooldowns(&UserId::new("U2")).unwrap().is_empty());
    }

    /// Replace the task file with a directory so the final rename fails.
    fn block_writes(path: &Path) {
        fs::remove_file(path).unwrap();
        fs::create_dir(path).unwrap();
    }

    #[test]
    fn test_failed_save_leaves_records_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let user = UserId::new("U1");
        let mut store = JsonTaskStore::open(&path).unwrap();
        let first = store.insert(&user, &TaskDraft::new("first", "x")).unwrap();
        let second = store.insert(&user, &TaskDraft::new("second", "x")).unwrap();
        let active = store.list(&user, StatusPredicate::IsNot(Status::Done)).unwrap();

        block_writes(&path);

        assert!(store.insert(&user, &TaskDraft::new("third", "x")).is_err());
        assert!(store
            .update(&first.id, &user, &TaskPatch::status(Status::Done))
            .is_err());
        assert!(store.delete(&second.id, &user).is_err());
        let until = DateTime::from_timestamp(1_760_000_003, 0).unwrap();
        assert!(store.set_cooldown(&first.id, &user, until).is_err());

        assert_eq!(store.list(&user, StatusPredicate::IsNot(Status::Done)).unwrap(), active);
        assert!(store.list(&user, StatusPredicate::Is(Status::Done)).unwrap().is_empty());
        assert!(store.cooldowns(&user).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(JsonTaskStore::open(&path), Err(StoreError::JsonError(_))));
    }
}
