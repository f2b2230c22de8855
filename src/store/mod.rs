//! Shared document store for lockstep.
//!
//! Every table (locks, batches, tasks) is a [`Collection`]: a directory of
//! JSON documents, one file per record id.
//!
//! # Guarantees
//!
//! - **Reads are lock-free.** Documents are only ever replaced through
//!   [`crate::fs::atomic_write`], so a reader sees a complete old or new
//!   document, never a torn one.
//! - **Writes are conditional and linearizable per key.** [`Collection::update`]
//!   holds an exclusive OS file lock on `.guards/{id}.guard` while it reads the
//!   current document, asks the caller what to do, and applies the decision.
//!   The OS drops the file lock when its holder exits, so a crashed process
//!   never wedges a record.
//! - **No multi-record transactions.** Invariants spanning several records
//!   are maintained by idempotent recomputation in the callers.
//!
//! # Layout
//!
//! ```text
//! {collection_dir}/
//!   {id}.json           current document
//!   .guards/{id}.guard  per-record write guard (never deleted while in use)
//!   .{id}.json.*.tmp    in-flight atomic writes (ignored by listings)
//! ```

mod guard;

use crate::error::{LockstepError, Result};
use crate::fs::{atomic_write, is_temp_file};
use guard::RecordGuard;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9@][A-Za-z0-9._:@-]{0,127}$").expect("Invalid record id regex")
});

/// Directory holding the per-record guard files of a collection.
const GUARDS_DIR: &str = ".guards";

/// Decision returned by an [`Collection::update`] closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
    /// Leave the stored document untouched.
    Keep,
    /// Replace (or create) the document.
    Put(T),
    /// Remove the document.
    Delete,
}

/// Validate a record id (or lock key / lock type).
///
/// Ids become file names, so anything that could escape the collection
/// directory is rejected.
pub fn validate_id(id: &str) -> Result<&str> {
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(LockstepError::UserError(format!(
            "invalid id '{}': contains path traversal characters",
            id
        )));
    }

    if !ID_REGEX.is_match(id) {
        return Err(LockstepError::UserError(format!(
            "invalid id '{}': must start with a letter, digit or '@' and contain only \
             letters, digits, '.', '_', ':', '@' or '-' (max 128 chars)",
            id
        )));
    }

    Ok(id)
}

/// Escape byte for [`key_to_id`]; not in the pass-through set, so encoded
/// ids decode unambiguously.
const KEY_ESCAPE: char = '@';

/// Encode an arbitrary non-empty string (a lock key or lock type) as a
/// record id.
///
/// ASCII letters and digits, `_`, `-` and `:` pass through, as does `.`
/// unless it leads or follows another `.`; every other byte becomes `@XX`.
/// Ids already valid and free of `@` and `..` encode to themselves. The
/// encoded form is limited to 128 characters like any other id.
pub fn key_to_id(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(LockstepError::UserError("key must not be empty".to_string()));
    }

    let mut id = String::with_capacity(key.len());
    let mut prev = None;
    for byte in key.bytes() {
        let plain = match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => true,
            b'_' | b'-' | b':' => prev.is_some(),
            b'.' => prev.is_some() && prev != Some(b'.'),
            _ => false,
        };
        if plain {
            id.push(byte as char);
        } else {
            id.push(KEY_ESCAPE);
            id.push_str(&format!("{:02X}", byte));
        }
        prev = Some(byte);
    }

    if id.len() > 128 {
        return Err(LockstepError::UserError(format!(
            "key '{}' is too long: encodes to {} characters (max 128)",
            key,
            id.len()
        )));
    }
    validate_id(&id)?;
    Ok(id)
}

/// Reverse [`key_to_id`]. `None` if `id` is not a valid encoding.
pub fn id_to_key(id: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(id.len());
    let mut rest = id.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == KEY_ESCAPE as u8 {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

/// A directory of JSON documents of type `T`.
#[derive(Debug)]
pub struct Collection<T> {
    dir: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Collection<T> {
    /// Open a collection rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _marker: PhantomData,
        }
    }

    /// The collection directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn guard_path(&self, id: &str) -> PathBuf {
        self.dir.join(GUARDS_DIR).join(format!("{}.guard", id))
    }

    /// Read the current document, if any.
    pub fn get(&self, id: &str) -> Result<Option<T>> {
        validate_id(id)?;
        read_doc(&self.doc_path(id))
    }

    /// Conditionally mutate one document.
    ///
    /// `f` receives the current document (or `None`) and returns the mutation
    /// to apply plus a value handed back to the caller. No other writer can
    /// change the document between the read and the write.
    pub fn update<R, F>(&self, id: &str, f: F) -> Result<R>
    where
        F: FnOnce(Option<T>) -> (Mutation<T>, R),
    {
        validate_id(id)?;
        let path = self.doc_path(id);
        let _guard = RecordGuard::acquire(&self.guard_path(id))?;

        let current = read_doc(&path)?;
        let (mutation, out) = f(current);

        match mutation {
            Mutation::Keep => {}
            Mutation::Put(doc) => write_doc(&path, &doc)?,
            Mutation::Delete => remove_doc(&path)?,
        }

        Ok(out)
    }

    /// Insert a document only if no document with this id exists.
    ///
    /// Returns `false` (and writes nothing) when the id is taken.
    pub fn insert(&self, id: &str, doc: T) -> Result<bool> {
        self.update(id, |current| match current {
            Some(_) => (Mutation::Keep, false),
            None => (Mutation::Put(doc), true),
        })
    }

    /// Delete a document. Returns whether one existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.update(id, |current| match current {
            Some(_) => (Mutation::Delete, true),
            None => (Mutation::Keep, false),
        })
    }

    /// List the ids of all stored documents, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LockstepError::StoreError(format!(
                    "failed to read collection '{}': {}",
                    self.dir.display(),
                    e
                )));
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                LockstepError::StoreError(format!("failed to read collection entry: {}", e))
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || is_temp_file(name) {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Load every document in the collection.
    ///
    /// Documents deleted while listing are skipped; unreadable documents are
    /// skipped with a warning so one corrupt record cannot stall every worker.
    pub fn list(&self) -> Result<Vec<T>> {
        let mut docs = Vec::new();
        for id in self.ids()? {
            match read_doc(&self.doc_path(&id)) {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(collection = %self.dir.display(), id = %id, error = %e, "skipping unreadable record");
                }
            }
        }
        Ok(docs)
    }

    /// Remove the whole collection directory, guards included.
    ///
    /// Only safe once no process can write to the collection any more.
    pub fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockstepError::StoreError(format!(
                "failed to remove collection '{}': {}",
                self.dir.display(),
                e
            ))),
        }
    }

    /// Remove the guard file of a record that no longer exists.
    ///
    /// Only safe once no process can write to the record any more.
    pub fn remove_guard(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        match fs::remove_file(self.guard_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockstepError::StoreError(format!(
                "failed to remove guard for '{}': {}",
                id, e
            ))),
        }
    }
}

fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LockstepError::StoreError(format!(
                "failed to read record '{}': {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        LockstepError::StoreError(format!(
            "failed to parse record '{}': {}",
            path.display(),
            e
        ))
    })
}

fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(doc)
        .map_err(|e| LockstepError::StoreError(format!("failed to serialize record: {}", e)))?;
    atomic_write(path, &json)
}

fn remove_doc(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockstepError::StoreError(format!(
            "failed to delete record '{}': {}",
            path.display(),
            e
        ))),
    }
}
