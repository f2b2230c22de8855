//! Tests for batch records and the batch store.

use super::*;
use crate::error::LockstepError;
use crate::test_support::create_test_store;

#[test]
fn test_status_ranks_and_terminality() {
    assert_eq!(BatchStatus::Pending.rank(), 0);
    assert_eq!(BatchStatus::Running.rank(), 1);
    assert_eq!(BatchStatus::Canceling.rank(), 2);
    for status in [
        BatchStatus::Completed,
        BatchStatus::Failed,
        BatchStatus::Canceled,
    ] {
        assert_eq!(status.rank(), 3);
        assert!(status.is_terminal());
    }
    assert!(!BatchStatus::Canceling.is_terminal());
}

#[test]
fn test_transitions_only_move_forward() {
    use BatchStatus::*;

    assert!(Pending.can_transition_to(Running));
    assert!(Pending.can_transition_to(Canceling));
    assert!(Running.can_transition_to(Completed));
    assert!(Canceling.can_transition_to(Canceled));
    assert!(Canceling.can_transition_to(Failed));

    assert!(!Running.can_transition_to(Pending));
    assert!(!Running.can_transition_to(Running));
    assert!(!Canceling.can_transition_to(Running));
    assert!(!Completed.can_transition_to(Failed));
    assert!(!Canceled.can_transition_to(Completed));
}

#[test]
fn test_status_parse_and_display() {
    for status in [
        BatchStatus::Pending,
        BatchStatus::Running,
        BatchStatus::Canceling,
        BatchStatus::Completed,
        BatchStatus::Failed,
        BatchStatus::Canceled,
    ] {
        assert_eq!(status.to_string().parse::<BatchStatus>().unwrap(), status);
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            format!("\"{}\"", status)
        );
    }
    assert!("CANCELED".parse::<BatchStatus>().is_ok());
    assert!("done".parse::<BatchStatus>().is_err());
}

#[test]
fn test_advance_to_sets_completed_on_for_terminal() {
    let mut batch = Batch::new("noop", 2);
    let now = Utc::now();

    assert!(batch.advance_to(BatchStatus::Running, now));
    assert!(batch.completed_on.is_none());
    assert!(!batch.advance_to(BatchStatus::Pending, now));

    assert!(batch.advance_to(BatchStatus::Completed, now));
    assert_eq!(batch.completed_on, Some(now));
    assert!(!batch.advance_to(BatchStatus::Canceled, now));
    assert_eq!(batch.status, BatchStatus::Completed);
}

#[test]
fn test_raise_counts_never_decreases() {
    let mut batch = Batch::new("noop", 5);
    let now = Utc::now();

    assert!(batch.raise_counts(2, 1, now));
    assert!(!batch.raise_counts(1, 0, now));
    assert_eq!(batch.processed_task_count, 2);
    assert_eq!(batch.failed_task_count, 1);

    assert!(batch.raise_counts(1, 3, now));
    assert_eq!(batch.processed_task_count, 2);
    assert_eq!(batch.failed_task_count, 3);
    assert!(batch.all_tasks_finished());
    assert_eq!(batch.finished_status(), BatchStatus::Failed);
}

#[test]
fn test_empty_batch_is_already_finished() {
    let batch = Batch::new("noop", 0);
    assert!(batch.all_tasks_finished());
    assert_eq!(batch.finished_status(), BatchStatus::Completed);
}

#[test]
fn test_store_require_missing_batch() {
    let (_temp_dir, ctx) = create_test_store();
    let store = BatchStore::new(&ctx);

    let err = store.require("nope").unwrap_err();
    assert!(matches!(err, LockstepError::BatchNotFound(id) if id == "nope"));
}

#[test]
fn test_store_list_in_creation_order() {
    let (_temp_dir, ctx) = create_test_store();
    let store = BatchStore::new(&ctx);

    let first = Batch::new("a", 1);
    let second = Batch::new("b", 1);
    store.insert(second.clone()).unwrap();
    store.insert(first.clone()).unwrap();

    let ids: Vec<String> = store.list().unwrap().into_iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[test]
fn test_store_modify_writes_only_changes() {
    let (_temp_dir, ctx) = create_test_store();
    let store = BatchStore::new(&ctx);
    let batch = Batch::new("noop", 1);
    let id = batch.id.clone();
    store.insert(batch).unwrap();

    let (after, changed) = store
        .modify(&id, |b| b.advance_to(BatchStatus::Running, Utc::now()))
        .unwrap()
        .unwrap();
    assert!(changed);
    assert_eq!(after.status, BatchStatus::Running);

    let (after, changed) = store
        .modify(&id, |b| b.advance_to(BatchStatus::Pending, Utc::now()))
        .unwrap()
        .unwrap();
    assert!(!changed);
    assert_eq!(after.status, BatchStatus::Running);
    assert_eq!(store.require(&id).unwrap().status, BatchStatus::Running);

    assert!(store.modify("missing", |_| true).unwrap().is_none());
}

#[test]
fn test_store_insert_duplicate_and_delete() {
    let (_temp_dir, ctx) = create_test_store();
    let store = BatchStore::new(&ctx);
    let batch = Batch::new("noop", 1);

    store.insert(batch.clone()).unwrap();
    assert!(store.insert(batch.clone()).is_err());
    assert!(store.delete(&batch.id).unwrap());
    assert!(store.get(&batch.id).unwrap().is_none());
}
