//! Marker-file indexes over task records.
//!
//! Both indexes are directories of empty marker files named
//! `{seq:010}.{task_id}`, so a sorted directory listing is `seq` order:
//!
//! ```text
//! {store}/tasks/{batch_id}/.open/                        unfinished tasks of a batch
//! {store}/tasks/.by_type/{type}/processed/{batch_id}/    processed tasks of a type
//! {store}/tasks/.by_type/{type}/unprocessed/{batch_id}/  unprocessed tasks of a type
//! ```
//!
//! A marker is written before the document change that makes it true and
//! removed after the change that makes it false. Each index is therefore a
//! superset of the tasks in its state; readers confirm against the document
//! and drop markers whose task has moved on for good.

use super::Task;
use crate::error::{LockstepError, Result};
use crate::store::{key_to_id, validate_id};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const OPEN_DIR: &str = ".open";
const BY_TYPE_DIR: &str = ".by_type";
const PROCESSED_DIR: &str = "processed";
const UNPROCESSED_DIR: &str = "unprocessed";

/// One marker: where a task sits in its batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Entry {
    pub batch_id: String,
    pub seq: u32,
    pub task_id: String,
}

impl Entry {
    fn parse(batch_id: &str, name: &str) -> Option<Self> {
        let (seq, task_id) = name.split_once('.')?;
        validate_id(task_id).ok()?;
        Some(Self {
            batch_id: batch_id.to_string(),
            seq: seq.parse().ok()?,
            task_id: task_id.to_string(),
        })
    }
}

fn marker_name(task: &Task) -> String {
    format!("{:010}.{}", task.seq, task.id)
}

fn state_dir(processed: bool) -> &'static str {
    if processed { PROCESSED_DIR } else { UNPROCESSED_DIR }
}

#[derive(Debug, Clone)]
pub(super) struct TaskIndex {
    tasks_dir: PathBuf,
}

impl TaskIndex {
    pub fn new(tasks_dir: PathBuf) -> Self {
        Self { tasks_dir }
    }

    fn open_dir(&self, batch_id: &str) -> PathBuf {
        self.tasks_dir.join(batch_id).join(OPEN_DIR)
    }

    fn type_root(&self) -> PathBuf {
        self.tasks_dir.join(BY_TYPE_DIR)
    }

    fn typed_dir(&self, task_type: &str, processed: bool) -> Result<PathBuf> {
        Ok(self
            .type_root()
            .join(key_to_id(task_type)?)
            .join(state_dir(processed)))
    }

    pub fn add_open(&self, task: &Task) -> Result<()> {
        touch(&self.open_dir(&task.batch_id).join(marker_name(task)))
    }

    pub fn remove_open(&self, task: &Task) -> Result<()> {
        remove(&self.open_dir(&task.batch_id).join(marker_name(task)))
    }

    pub fn remove_open_entry(&self, entry: &Entry) -> Result<()> {
        remove(
            &self
                .open_dir(&entry.batch_id)
                .join(format!("{:010}.{}", entry.seq, entry.task_id)),
        )
    }

    pub fn add_typed(&self, task: &Task, processed: bool) -> Result<()> {
        let dir = self.typed_dir(&task.task_type, processed)?;
        touch(&dir.join(&task.batch_id).join(marker_name(task)))
    }

    pub fn remove_typed(&self, task: &Task, processed: bool) -> Result<()> {
        let dir = self.typed_dir(&task.task_type, processed)?;
        remove(&dir.join(&task.batch_id).join(marker_name(task)))
    }

    /// Open markers of a batch, in `seq` order.
    pub fn open_entries(&self, batch_id: &str) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = list_names(&self.open_dir(batch_id))?
            .iter()
            .filter_map(|name| Entry::parse(batch_id, name))
            .collect();
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    /// Markers of one task type and state, by batch id then `seq`.
    pub fn typed_entries(&self, task_type: &str, processed: bool) -> Result<Vec<Entry>> {
        let dir = self.typed_dir(task_type, processed)?;
        let mut entries = Vec::new();
        for batch_id in list_names(&dir)? {
            if validate_id(&batch_id).is_err() {
                continue;
            }
            let mut batch_entries: Vec<Entry> = list_names(&dir.join(&batch_id))?
                .iter()
                .filter_map(|name| Entry::parse(&batch_id, name))
                .collect();
            batch_entries.sort_by_key(|e| e.seq);
            entries.extend(batch_entries);
        }
        Ok(entries)
    }

    /// Drop every by-type marker of a batch. Open markers live inside the
    /// batch's task directory and go with it.
    pub fn remove_batch(&self, batch_id: &str) -> Result<()> {
        for type_id in list_names(&self.type_root())? {
            for state in [PROCESSED_DIR, UNPROCESSED_DIR] {
                let dir = self.type_root().join(&type_id).join(state).join(batch_id);
                match fs::remove_dir_all(&dir) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(LockstepError::StoreError(format!(
                            "failed to remove index '{}': {}",
                            dir.display(),
                            e
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            LockstepError::StoreError(format!(
                "failed to create index directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    File::create(path).map(drop).map_err(|e| {
        LockstepError::StoreError(format!(
            "failed to write index marker '{}': {}",
            path.display(),
            e
        ))
    })
}

fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockstepError::StoreError(format!(
            "failed to remove index marker '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Entry names of a directory; a missing directory is empty.
fn list_names(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(LockstepError::StoreError(format!(
                "failed to read index '{}': {}",
                dir.display(),
                e
            )));
        }
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}
