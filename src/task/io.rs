//! Store access for task records.

use super::index::{Entry, TaskIndex};
use super::{ReportOutcome, Task};
use crate::context::StoreContext;
use crate::error::{LockstepError, Result};
use crate::store::{Collection, Mutation, validate_id};
use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Task table: one collection per batch under `{store}/tasks/`, plus the
/// open and by-type marker indexes.
#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks_dir: PathBuf,
    index: TaskIndex,
}

impl TaskStore {
    pub fn new(ctx: &StoreContext) -> Self {
        Self {
            tasks_dir: ctx.tasks_dir.clone(),
            index: TaskIndex::new(ctx.tasks_dir.clone()),
        }
    }

    fn collection(&self, batch_id: &str) -> Result<Collection<Task>> {
        validate_id(batch_id)?;
        Ok(Collection::new(self.tasks_dir.join(batch_id)))
    }

    pub fn get(&self, batch_id: &str, task_id: &str) -> Result<Option<Task>> {
        self.collection(batch_id)?.get(task_id)
    }

    /// All tasks of a batch, in `seq` order.
    pub fn list(&self, batch_id: &str) -> Result<Vec<Task>> {
        let mut tasks = self.collection(batch_id)?.list()?;
        tasks.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Number of task records present for a batch.
    pub fn count(&self, batch_id: &str) -> Result<usize> {
        Ok(self.collection(batch_id)?.ids()?.len())
    }

    /// Write a new task. Fails if the id is already taken.
    ///
    /// Index markers go first, so a crash never leaves an unindexed task.
    pub fn insert(&self, task: Task) -> Result<()> {
        let collection = self.collection(&task.batch_id)?;
        validate_id(&task.id)?;
        self.index.add_open(&task)?;
        self.index.add_typed(&task, false)?;

        let id = task.id.clone();
        if !collection.insert(&id, task)? {
            return Err(LockstepError::StoreError(format!(
                "task '{}' already exists",
                id
            )));
        }
        Ok(())
    }

    /// Unfinished tasks of a batch in `seq` order, read lazily from the open
    /// index.
    ///
    /// Markers of finished tasks are dropped on the way; markers whose
    /// document is not there (yet) are skipped.
    pub fn open_tasks(&self, batch_id: &str) -> Result<OpenTasks<'_>> {
        validate_id(batch_id)?;
        Ok(OpenTasks {
            store: self,
            entries: self.index.open_entries(batch_id)?.into_iter(),
        })
    }

    /// Tasks of one type, processed or not, across all batches.
    ///
    /// Ordered by batch id, then `seq`. Unprocessed includes terminally
    /// failed tasks.
    pub fn list_by_type(&self, task_type: &str, processed: bool) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for entry in self.index.typed_entries(task_type, processed)? {
            let Some(task) = self.get(&entry.batch_id, &entry.task_id)? else {
                continue;
            };
            if task.task_type != task_type {
                continue;
            }
            if task.processed == processed {
                tasks.push(task);
            } else if task.processed {
                // Processed never reverts, so the unprocessed marker is dead.
                self.drop_marker(self.index.remove_typed(&task, false), &task.id);
            }
        }
        Ok(tasks)
    }

    /// Number of tasks of one type in the given processed state.
    pub fn count_by_type(&self, task_type: &str, processed: bool) -> Result<usize> {
        Ok(self.list_by_type(task_type, processed)?.len())
    }

    /// Start the next attempt, fenced on `seen_attempts`.
    ///
    /// Returns the updated task, or `None` if the task vanished, finished,
    /// ran out of attempts, or was attempted by someone else meanwhile.
    pub fn begin_attempt(
        &self,
        batch_id: &str,
        task_id: &str,
        seen_attempts: u32,
    ) -> Result<Option<Task>> {
        self.collection(batch_id)?.update(task_id, |current| {
            let Some(mut task) = current else {
                return (Mutation::Keep, None);
            };
            match task.begin_attempt(seen_attempts, Utc::now()) {
                Some(_) => (Mutation::Put(task.clone()), Some(task)),
                None => (Mutation::Keep, None),
            }
        })
    }

    /// Report a successful attempt.
    pub fn mark_processed(
        &self,
        batch_id: &str,
        task_id: &str,
        attempt: u32,
        result: Value,
    ) -> Result<ReportOutcome> {
        self.report(batch_id, task_id, |task| {
            task.mark_processed(attempt, result, Utc::now())
        })
    }

    /// Report a failed attempt.
    pub fn record_failure(
        &self,
        batch_id: &str,
        task_id: &str,
        attempt: u32,
        error: &str,
        permanent: bool,
    ) -> Result<ReportOutcome> {
        self.report(batch_id, task_id, |task| {
            task.record_failure(attempt, error, permanent, Utc::now())
        })
    }

    fn report<F>(&self, batch_id: &str, task_id: &str, apply: F) -> Result<ReportOutcome>
    where
        F: FnOnce(&mut Task) -> ReportOutcome,
    {
        let reported = self.collection(batch_id)?.update(task_id, |current| {
            let Some(mut task) = current else {
                return (Mutation::Keep, Ok((ReportOutcome::Stale, None)));
            };
            match apply(&mut task) {
                ReportOutcome::Stale => (Mutation::Keep, Ok((ReportOutcome::Stale, None))),
                outcome => {
                    // The processed marker must exist before the document says so.
                    if outcome == ReportOutcome::Completed
                        && let Err(e) = self.index.add_typed(&task, true)
                    {
                        return (Mutation::Keep, Err(e));
                    }
                    (Mutation::Put(task.clone()), Ok((outcome, Some(task))))
                }
            }
        })?;

        let (outcome, task) = reported?;
        if let Some(task) = task {
            self.unindex_finished(&task);
        }
        Ok(outcome)
    }

    /// Fail an exhausted task. Returns whether it changed.
    pub fn mark_exhausted(&self, batch_id: &str, task_id: &str) -> Result<bool> {
        let failed = self.collection(batch_id)?.update(task_id, |current| {
            let Some(mut task) = current else {
                return (Mutation::Keep, None);
            };
            if task.mark_exhausted(Utc::now()) {
                (Mutation::Put(task.clone()), Some(task))
            } else {
                (Mutation::Keep, None)
            }
        })?;

        match failed {
            Some(task) => {
                self.unindex_finished(&task);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop markers a finished task no longer matches.
    fn unindex_finished(&self, task: &Task) {
        if !task.is_finished() {
            return;
        }
        self.drop_marker(self.index.remove_open(task), &task.id);
        if task.processed {
            self.drop_marker(self.index.remove_typed(task, false), &task.id);
        }
    }

    /// Stale markers are harmless, so failing to remove one only warns.
    fn drop_marker(&self, removed: Result<()>, task_id: &str) {
        if let Err(e) = removed {
            tracing::warn!(task_id, error = %e, "failed to drop task index marker");
        }
    }

    /// Delete one task record and its index markers.
    pub fn delete(&self, batch_id: &str, task_id: &str) -> Result<bool> {
        let collection = self.collection(batch_id)?;
        let Some(task) = collection.get(task_id)? else {
            return Ok(false);
        };
        let deleted = collection.delete(task_id)?;
        self.index.remove_open(&task)?;
        self.index.remove_typed(&task, false)?;
        self.index.remove_typed(&task, true)?;
        Ok(deleted)
    }

    /// Delete every task of a batch, directory and index markers included.
    pub fn delete_all(&self, batch_id: &str) -> Result<()> {
        let collection = self.collection(batch_id)?;
        self.index.remove_batch(batch_id)?;
        collection.remove_all()
    }

    fn open_task(&self, entry: &Entry) -> Result<Option<Task>> {
        let Some(task) = self.get(&entry.batch_id, &entry.task_id)? else {
            return Ok(None);
        };
        if task.is_finished() {
            // Finished never reverts, so the open marker is dead.
            self.drop_marker(self.index.remove_open_entry(entry), &task.id);
            return Ok(None);
        }
        Ok(Some(task))
    }

    /// Batch ids that have a task directory, sorted.
    ///
    /// Used to find task directories orphaned by an interrupted cleanup.
    pub fn batch_ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.tasks_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LockstepError::StoreError(format!(
                    "failed to read tasks directory '{}': {}",
                    self.tasks_dir.display(),
                    e
                )));
            }
        };

        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| validate_id(name).is_ok())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Lazy walk over a batch's open index; see [`TaskStore::open_tasks`].
pub struct OpenTasks<'a> {
    store: &'a TaskStore,
    entries: std::vec::IntoIter<Entry>,
}

impl Iterator for OpenTasks<'_> {
    type Item = Result<Task>;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            match self.store.open_task(&entry) {
                Ok(Some(task)) => return Some(Ok(task)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
