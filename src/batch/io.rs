//! Store access for batch records.

use super::Batch;
use crate::context::StoreContext;
use crate::error::{LockstepError, Result};
use crate::store::{Collection, Mutation};

/// Batch table under `{store}/batches/`.
#[derive(Debug, Clone)]
pub struct BatchStore {
    batches: Collection<Batch>,
}

impl BatchStore {
    pub fn new(ctx: &StoreContext) -> Self {
        Self {
            batches: Collection::new(ctx.batches_dir.clone()),
        }
    }

    pub fn get(&self, batch_id: &str) -> Result<Option<Batch>> {
        self.batches.get(batch_id)
    }

    /// Like [`Self::get`] but a missing batch is [`LockstepError::BatchNotFound`].
    pub fn require(&self, batch_id: &str) -> Result<Batch> {
        self.get(batch_id)?
            .ok_or_else(|| LockstepError::BatchNotFound(batch_id.to_string()))
    }

    /// All batches in creation order (`created_on`, then `id`).
    pub fn list(&self) -> Result<Vec<Batch>> {
        let mut batches = self.batches.list()?;
        batches.sort_by(|a, b| {
            a.created_on
                .cmp(&b.created_on)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(batches)
    }

    /// Write a new batch. Fails if the id is already taken.
    pub fn insert(&self, batch: Batch) -> Result<()> {
        let id = batch.id.clone();
        if !self.batches.insert(&id, batch)? {
            return Err(LockstepError::StoreError(format!(
                "batch '{}' already exists",
                id
            )));
        }
        Ok(())
    }

    /// Conditionally mutate a batch.
    ///
    /// `f` sees the current batch and returns whether it changed it; only
    /// changed batches are written. Returns the batch as stored afterwards,
    /// or `None` if it does not exist.
    pub fn modify<F>(&self, batch_id: &str, f: F) -> Result<Option<(Batch, bool)>>
    where
        F: FnOnce(&mut Batch) -> bool,
    {
        self.batches.update(batch_id, |current| {
            let Some(mut batch) = current else {
                return (Mutation::Keep, None);
            };
            if f(&mut batch) {
                (Mutation::Put(batch.clone()), Some((batch, true)))
            } else {
                (Mutation::Keep, Some((batch, false)))
            }
        })
    }

    /// Delete a batch only if `pred` holds for the stored record.
    pub fn delete_if<P>(&self, batch_id: &str, pred: P) -> Result<bool>
    where
        P: FnOnce(&Batch) -> bool,
    {
        self.batches.update(batch_id, |current| match current {
            Some(batch) if pred(&batch) => (Mutation::Delete, true),
            _ => (Mutation::Keep, false),
        })
    }

    pub fn delete(&self, batch_id: &str) -> Result<bool> {
        self.batches.delete(batch_id)
    }

    /// Remove the guard file of a deleted batch.
    pub(crate) fn discard_guard(&self, batch_id: &str) -> Result<()> {
        self.batches.remove_guard(batch_id)
    }
}
