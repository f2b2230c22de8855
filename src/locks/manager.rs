//! Lock acquisition, renewal, release, listing, and reaping.

use super::guard::LockGuard;
use super::metadata::{LockRecord, get_owner_string};
use super::types::{Acquire, LockHandle, Release, Renewal};
use crate::context::StoreContext;
use crate::error::{LockstepError, Result};
use crate::store::{Collection, Mutation, id_to_key, key_to_id};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Lock manager over the generic `(lock_type, key)` lock table.
///
/// Cheap to clone; holds no state besides the table location and the owner
/// string written into acquired records.
#[derive(Debug, Clone)]
pub struct LockManager {
    locks_dir: PathBuf,
    owner: String,
}

impl LockManager {
    /// Create a manager with a fresh owner identity.
    pub fn new(ctx: &StoreContext) -> Self {
        Self::with_owner(ctx, get_owner_string())
    }

    /// Create a manager with an explicit owner identity.
    pub fn with_owner(ctx: &StoreContext, owner: impl Into<String>) -> Self {
        Self {
            locks_dir: ctx.locks_dir.clone(),
            owner: owner.into(),
        }
    }

    /// The owner string written into acquired records.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn table(&self, lock_type: &str) -> Result<Collection<LockRecord>> {
        Ok(Collection::new(self.locks_dir.join(key_to_id(lock_type)?)))
    }

    /// Acquire `(lock_type, key)` for `ttl`.
    ///
    /// Succeeds when no live record exists; an expired record is overwritten.
    /// A live record held by anyone (including this owner) is a conflict.
    ///
    /// `lock_type` and `key` may be any non-empty strings; they are encoded
    /// into file names (see [`key_to_id`]) and fail with `UserError` only if
    /// the encoding exceeds 128 characters.
    pub fn acquire(&self, lock_type: &str, key: &str, ttl: Duration) -> Result<Acquire> {
        let table = self.table(lock_type)?;
        let ttl = to_chrono(ttl)?;

        table.update(&key_to_id(key)?, |current| {
            let now = Utc::now();
            if let Some(existing) = current
                && existing.is_live_at(now)
            {
                return (Mutation::Keep, Acquire::Conflict(existing));
            }

            let record = LockRecord {
                lock_type: lock_type.to_string(),
                key: key.to_string(),
                token: Uuid::now_v7().to_string(),
                owner: self.owner.clone(),
                acquired_at: now,
                expires_on: now + ttl,
            };
            let handle = LockHandle::from_record(&record);
            (Mutation::Put(record), Acquire::Acquired(handle))
        })
    }

    /// Acquire a lock wrapped in a [`LockGuard`]; `None` on conflict.
    pub fn try_guard(&self, lock_type: &str, key: &str, ttl: Duration) -> Result<Option<LockGuard>> {
        Ok(self
            .acquire(lock_type, key, ttl)?
            .acquired()
            .map(|handle| LockGuard::new(self.clone(), handle)))
    }

    /// Extend the expiry of a held lock to `now + ttl`.
    ///
    /// Returns [`Renewal::Lost`] if the record is missing, carries a different
    /// token, or has already expired. On success `handle.expires_on` is
    /// updated.
    pub fn renew(&self, handle: &mut LockHandle, ttl: Duration) -> Result<Renewal> {
        let table = self.table(&handle.lock_type)?;
        let ttl = to_chrono(ttl)?;
        let token = handle.token.clone();

        let renewal = table.update(&key_to_id(&handle.key)?, |current| match current {
            Some(mut record) => {
                let now = Utc::now();
                if record.token != token || !record.is_live_at(now) {
                    return (Mutation::Keep, Renewal::Lost);
                }
                record.expires_on = now + ttl;
                let expires_on = record.expires_on;
                (Mutation::Put(record), Renewal::Renewed(expires_on))
            }
            None => (Mutation::Keep, Renewal::Lost),
        })?;

        if let Renewal::Renewed(expires_on) = renewal {
            handle.expires_on = expires_on;
        }
        Ok(renewal)
    }

    /// Delete the lock if it still carries the handle's token.
    pub fn release(&self, handle: &LockHandle) -> Result<Release> {
        let table = self.table(&handle.lock_type)?;
        table.update(&key_to_id(&handle.key)?, |current| match current {
            Some(record) if record.token == handle.token => (Mutation::Delete, Release::Released),
            _ => (Mutation::Keep, Release::NotHeld),
        })
    }

    /// The live record for `(lock_type, key)`, if any.
    pub fn get(&self, lock_type: &str, key: &str) -> Result<Option<LockRecord>> {
        let record = self.table(lock_type)?.get(&key_to_id(key)?)?;
        Ok(record.filter(|r| r.is_live()))
    }

    /// Whether a live lock exists for `(lock_type, key)`.
    pub fn is_locked(&self, lock_type: &str, key: &str) -> Result<bool> {
        Ok(self.get(lock_type, key)?.is_some())
    }

    /// Lock types present in the table, sorted.
    pub fn lock_types(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.locks_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LockstepError::StoreError(format!(
                    "failed to read locks directory '{}': {}",
                    self.locks_dir.display(),
                    e
                )));
            }
        };

        let mut types = Vec::new();
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if let Some(lock_type) = entry
                .file_name()
                .to_str()
                .filter(|name| !name.starts_with('.'))
                .and_then(id_to_key)
                && is_dir
            {
                types.push(lock_type);
            }
        }
        types.sort();
        Ok(types)
    }

    /// List locks of every type, sorted by `(lock_type, key)`.
    pub fn list(&self, include_expired: bool) -> Result<Vec<LockRecord>> {
        let mut records = Vec::new();
        for lock_type in self.lock_types()? {
            records.extend(self.list_type(&lock_type, include_expired)?);
        }
        Ok(records)
    }

    /// List locks of one type, sorted by key.
    pub fn list_type(&self, lock_type: &str, include_expired: bool) -> Result<Vec<LockRecord>> {
        let now = Utc::now();
        Ok(self
            .table(lock_type)?
            .list()?
            .into_iter()
            .filter(|r| include_expired || r.is_live_at(now))
            .collect())
    }

    /// Force-remove a lock regardless of holder. Returns the removed record.
    ///
    /// Operator escape hatch: the previous holder will see `Lost` at its
    /// next renewal.
    pub fn clear(&self, lock_type: &str, key: &str) -> Result<Option<LockRecord>> {
        self.table(lock_type)?.update(&key_to_id(key)?, |current| match current {
            Some(record) => (Mutation::Delete, Some(record)),
            None => (Mutation::Keep, None),
        })
    }

    /// Delete every expired record. Returns how many were removed.
    ///
    /// Each deletion re-checks expiry under the record guard, so a lock
    /// renewed or re-acquired meanwhile survives.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut purged = 0;
        for lock_type in self.lock_types()? {
            let table = self.table(&lock_type)?;
            for id in table.ids()? {
                let removed = table.update(&id, |current| match current {
                    Some(record) if !record.is_live_at(Utc::now()) => (Mutation::Delete, true),
                    _ => (Mutation::Keep, false),
                });
                match removed {
                    Ok(true) => purged += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(lock_type = %lock_type, id = %id, error = %e, "failed to purge lock");
                    }
                }
            }
        }
        Ok(purged)
    }

    /// Remove the guard file of a key whose resource no longer exists.
    pub(crate) fn discard_key(&self, lock_type: &str, key: &str) -> Result<()> {
        self.table(lock_type)?.remove_guard(&key_to_id(key)?)
    }
}

fn to_chrono(ttl: Duration) -> Result<chrono::Duration> {
    if ttl.is_zero() {
        return Err(LockstepError::UserError(
            "lock ttl must be greater than zero".to_string(),
        ));
    }
    chrono::Duration::from_std(ttl)
        .map_err(|e| LockstepError::UserError(format!("invalid lock ttl: {}", e)))
}
