//! The session's in-memory view of one user's tasks.
//!
//! Every mutation runs in two phases. `begin_*` validates the request and
//! applies the optimistic change, handing back a pending token. `finish_*`
//! consumes that token together with the store's answer and either confirms
//! the change or rolls it back. The `add_task`, `complete_task` and
//! `remove_task` drivers run both phases around a single store call.
//!
//! The drivers also record cooldown expiries in the store, and `load` reads
//! them back, so a collection built by a later process keeps ignoring actions
//! on tasks that were just added or completed.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};

use crate::clock::{Clock, SystemClock};
use crate::error::TaskError;
use crate::models::{Status, Task, TaskDraft, TaskId, TaskPatch};
use crate::session::{Identity, Session};
use crate::store::{StatusPredicate, StoreError, TaskStore};

/// Seconds during which a freshly added or completed task ignores further actions.
pub const DEFAULT_COOLDOWN_SECS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Active,
    Done,
}

impl Partition {
    pub fn for_status(status: Status) -> Self {
        if status.is_done() {
            Partition::Done
        } else {
            Partition::Active
        }
    }
}

/// An optimistic insert waiting for the store to assign an id.
#[derive(Debug)]
#[must_use = "an unfinished mutation leaves its optimistic change in place"]
pub struct PendingInsert {
    temp_id: TaskId,
    draft: TaskDraft,
}

impl PendingInsert {
    pub fn temp_id(&self) -> &TaskId {
        &self.temp_id
    }

    pub fn draft(&self) -> &TaskDraft {
        &self.draft
    }
}

/// A task optimistically moved to `done`, with what is needed to move it back.
#[derive(Debug)]
#[must_use = "an unfinished mutation leaves its optimistic change in place"]
pub struct PendingComplete {
    original: Task,
    index: usize,
}

impl PendingComplete {
    pub fn id(&self) -> &TaskId {
        &self.original.id
    }
}

/// A done task optimistically removed, with its former position.
#[derive(Debug)]
#[must_use = "an unfinished mutation leaves its optimistic change in place"]
pub struct PendingRemove {
    removed: Task,
    index: usize,
}

impl PendingRemove {
    pub fn id(&self) -> &TaskId {
        &self.removed.id
    }
}

/// How a successful removal left the local collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Both partitions were refetched after the delete.
    Reloaded,
    /// The delete went through but the refetch failed; local state is the optimistic one.
    Stale,
}

pub struct TaskCollection {
    identity: Identity,
    active: Vec<Task>,
    done: Vec<Task>,
    in_flight: HashSet<TaskId>,
    cooldowns: HashMap<TaskId, DateTime<Utc>>,
    cooldown: TimeDelta,
    clock: Box<dyn Clock>,
}

impl TaskCollection {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            active: Vec::new(),
            done: Vec::new(),
            in_flight: HashSet::new(),
            cooldowns: HashMap::new(),
            cooldown: TimeDelta::seconds(DEFAULT_COOLDOWN_SECS),
            clock: Box::new(SystemClock),
        }
    }

    /// Build a collection for the signed-in user of `session`.
    pub fn for_session(session: &Session) -> Result<Self, TaskError> {
        Ok(Self::new(session.require()?.clone()))
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_cooldown(mut self, cooldown: TimeDelta) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn active(&self) -> &[Task] {
        &self.active
    }

    pub fn done(&self) -> &[Task] {
        &self.done
    }

    pub fn find(&self, id: &TaskId) -> Option<(Partition, &Task)> {
        if let Some(task) = self.active.iter().find(|t| &t.id == id) {
            return Some((Partition::Active, task));
        }
        self.done
            .iter()
            .find(|t| &t.id == id)
            .map(|task| (Partition::Done, task))
    }

    pub fn is_cooling_down(&self, id: &TaskId) -> bool {
        let now = self.clock.now();
        self.cooldowns.get(id).is_some_and(|until| *until > now)
    }

    pub fn is_in_flight(&self, id: &TaskId) -> bool {
        self.in_flight.contains(id)
    }

    // --- Loading ---

    /// Replace both partitions with the store's view of this user's tasks and
    /// pick up any cooldowns still running.
    ///
    /// On failure both partitions are left empty.
    pub fn load<S: TaskStore + ?Sized>(&mut self, store: &mut S) -> Result<(), TaskError> {
        match self.fetch(store) {
            Ok((active, done)) => {
                tracing::info!(
                    user_id = %self.identity.user_id,
                    active = active.len(),
                    done = done.len(),
                    "loaded tasks"
                );
                self.active = active;
                self.done = done;
                self.restore_cooldowns(store);
                Ok(())
            }
            Err(e) => {
                tracing::error!(user_id = %self.identity.user_id, error = %e, "failed to load tasks");
                self.active.clear();
                self.done.clear();
                Err(TaskError::Load(e))
            }
        }
    }

    fn fetch<S: TaskStore + ?Sized>(&self, store: &mut S) -> Result<(Vec<Task>, Vec<Task>), StoreError> {
        let user = &self.identity.user_id;
        let active = store.list(user, StatusPredicate::IsNot(Status::Done))?;
        let done = store.list(user, StatusPredicate::Is(Status::Done))?;
        Ok((active, done))
    }

    // --- Add ---

    /// Validate `draft` and show it immediately under a temporary id.
    pub fn begin_add(&mut self, draft: TaskDraft) -> Result<PendingInsert, TaskError> {
        if draft.title.trim().is_empty() {
            return Err(TaskError::Validation("Title is required".to_string()));
        }
        if draft.description.trim().is_empty() {
            return Err(TaskError::Validation("Description is required".to_string()));
        }

        let temp_id = TaskId::temporary();
        let task = Task::from_draft(temp_id.clone(), &draft);
        self.partition_mut(Partition::for_status(task.status)).push(task);
        self.in_flight.insert(temp_id.clone());
        tracing::debug!(task_id = %temp_id, "optimistic insert");

        Ok(PendingInsert { temp_id, draft })
    }

    /// Swap the placeholder for the stored task, or drop it if the insert failed.
    pub fn finish_add(
        &mut self,
        pending: PendingInsert,
        result: Result<Task, StoreError>,
    ) -> Result<Task, TaskError> {
        let PendingInsert { temp_id, .. } = pending;
        self.in_flight.remove(&temp_id);

        match result {
            Ok(stored) => {
                let slot = self.take(&temp_id);
                if self.find(&stored.id).is_none() {
                    let target = Partition::for_status(stored.status);
                    let list = self.partition_mut(target);
                    match slot {
                        Some((partition, index)) if partition == target => {
                            list.insert(index.min(list.len()), stored.clone())
                        }
                        _ => list.push(stored.clone()),
                    }
                }
                self.start_cooldown(&stored.id);
                tracing::debug!(temp_id = %temp_id, task_id = %stored.id, "insert confirmed");
                Ok(stored)
            }
            Err(e) => {
                self.take(&temp_id);
                tracing::warn!(task_id = %temp_id, error = %e, "insert failed, rolled back");
                Err(TaskError::Insert(e))
            }
        }
    }

    pub fn add_task<S: TaskStore + ?Sized>(
        &mut self,
        store: &mut S,
        draft: TaskDraft,
    ) -> Result<Task, TaskError> {
        let pending = self.begin_add(draft)?;
        let result = store.insert(&self.identity.user_id, pending.draft());
        let stored = self.finish_add(pending, result)?;
        self.persist_cooldown(store, &stored.id);
        Ok(stored)
    }

    // --- Complete ---

    /// Move an active task into `done` ahead of the store confirming it.
    ///
    /// Returns `Ok(None)` when no active task has this id.
    pub fn begin_complete(&mut self, id: &TaskId) -> Result<Option<PendingComplete>, TaskError> {
        self.guard(id)?;

        let Some(index) = self.active.iter().position(|t| &t.id == id) else {
            return Ok(None);
        };
        let original = self.active.remove(index);
        let mut moved = original.clone();
        moved.status = Status::Done;
        self.done.push(moved);
        self.start_cooldown(id);
        self.in_flight.insert(id.clone());
        tracing::debug!(task_id = %id, "optimistic complete");

        Ok(Some(PendingComplete { original, index }))
    }

    pub fn finish_complete(
        &mut self,
        pending: PendingComplete,
        result: Result<(), StoreError>,
    ) -> Result<(), TaskError> {
        let PendingComplete { original, index } = pending;
        self.in_flight.remove(&original.id);

        match result {
            Ok(()) => {
                tracing::debug!(task_id = %original.id, "complete confirmed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(task_id = %original.id, error = %e, "complete failed, rolled back");
                self.done.retain(|t| t.id != original.id);
                let index = index.min(self.active.len());
                self.active.insert(index, original);
                Err(TaskError::Update(e))
            }
        }
    }

    /// Mark an active task done. Returns whether a task was moved.
    pub fn complete_task<S: TaskStore + ?Sized>(
        &mut self,
        store: &mut S,
        id: &TaskId,
    ) -> Result<bool, TaskError> {
        let Some(pending) = self.begin_complete(id)? else {
            return Ok(false);
        };
        let result = store.update(id, &self.identity.user_id, &TaskPatch::status(Status::Done));
        let outcome = self.finish_complete(pending, result);
        self.persist_cooldown(store, id);
        outcome?;
        Ok(true)
    }

    // --- Remove ---

    /// Drop a done task from view ahead of the store deleting it.
    pub fn begin_remove(&mut self, id: &TaskId) -> Result<PendingRemove, TaskError> {
        self.guard(id)?;

        let index = self
            .done
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| TaskError::InvalidState(id.clone()))?;
        let removed = self.done.remove(index);
        self.in_flight.insert(id.clone());
        tracing::debug!(task_id = %id, "optimistic remove");

        Ok(PendingRemove { removed, index })
    }

    /// A failed delete puts the task back where it was in `done`.
    pub fn finish_remove(
        &mut self,
        pending: PendingRemove,
        result: Result<(), StoreError>,
    ) -> Result<(), TaskError> {
        let PendingRemove { removed, index } = pending;
        self.in_flight.remove(&removed.id);

        match result {
            Ok(()) => {
                tracing::debug!(task_id = %removed.id, "remove confirmed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(task_id = %removed.id, error = %e, "remove failed, rolled back");
                if self.find(&removed.id).is_none() {
                    let index = index.min(self.done.len());
                    self.done.insert(index, removed);
                }
                Err(TaskError::Delete(e))
            }
        }
    }

    /// Delete a done task, then refetch both partitions.
    pub fn remove_task<S: TaskStore + ?Sized>(
        &mut self,
        store: &mut S,
        id: &TaskId,
    ) -> Result<Resolution, TaskError> {
        let pending = self.begin_remove(id)?;
        let result = store.delete(id, &self.identity.user_id);
        self.finish_remove(pending, result)?;

        match self.fetch(store) {
            Ok((active, done)) => {
                self.active = active;
                self.done = done;
                Ok(Resolution::Reloaded)
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "reload after delete failed, keeping local state");
                Ok(Resolution::Stale)
            }
        }
    }

    // --- Internals ---

    fn guard(&self, id: &TaskId) -> Result<(), TaskError> {
        if self.is_in_flight(id) || self.is_cooling_down(id) {
            tracing::debug!(task_id = %id, "action suppressed during cooldown");
            return Err(TaskError::Ignored(id.clone()));
        }
        Ok(())
    }

    /// Merge the store's unexpired cooldowns into ours, keeping the later expiry.
    fn restore_cooldowns<S: TaskStore + ?Sized>(&mut self, store: &mut S) {
        let entries = match store.cooldowns(&self.identity.user_id) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(user_id = %self.identity.user_id, error = %e, "failed to read cooldowns");
                return;
            }
        };
        let now = self.clock.now();
        for (id, until) in entries.into_iter().filter(|(_, until)| *until > now) {
            let entry = self.cooldowns.entry(id).or_insert(until);
            if until > *entry {
                *entry = until;
            }
        }
    }

    /// Cooldowns are a debounce, so failing to record one is logged and otherwise ignored.
    fn persist_cooldown<S: TaskStore + ?Sized>(&self, store: &mut S, id: &TaskId) {
        let Some(until) = self.cooldowns.get(id) else {
            return;
        };
        if let Err(e) = store.set_cooldown(id, &self.identity.user_id, *until) {
            tracing::warn!(task_id = %id, error = %e, "failed to record cooldown");
        }
    }

    fn start_cooldown(&mut self, id: &TaskId) {
        let now = self.clock.now();
        self.cooldowns.retain(|_, until| *until > now);
        self.cooldowns.insert(id.clone(), now + self.cooldown);
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut Vec<Task> {
        match partition {
            Partition::Active => &mut self.active,
            Partition::Done => &mut self.done,
        }
    }

    /// Remove the task with `id` from whichever partition holds it.
    fn take(&mut self, id: &TaskId) -> Option<(Partition, usize)> {
        for partition in [Partition::Active, Partition::Done] {
            let list = self.partition_mut(partition);
            if let Some(index) = list.iter().position(|t| &t.id == id) {
                list.remove(index);
                return Some((partition, index));
            }
        }
        None
    }
}
