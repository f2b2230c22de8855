//! Tests for task records, fenced mutations, and the task store.

use super::*;
use crate::test_support::create_test_store;
use serde_json::json;

fn sample_task(max_attempts: u32) -> Task {
    Task::new(
        "batch-1",
        0,
        TaskSpec::new("noop", json!({"n": 1})),
        max_attempts,
    )
}

#[test]
fn test_new_task_is_claimable() {
    let task = sample_task(3);

    assert!(task.is_claimable());
    assert!(!task.is_finished());
    assert!(!task.is_exhausted());
    assert_eq!(task.attempts, 0);
    assert_eq!(task.status_label(), "queued");
    assert!(uuid::Uuid::parse_str(&task.id).is_ok());
}

#[test]
fn test_begin_attempt_is_fenced() {
    let mut task = sample_task(2);
    let now = Utc::now();

    assert_eq!(task.begin_attempt(0, now), Some(1));
    // A second worker that also saw attempts == 0 must not start an attempt.
    assert_eq!(task.begin_attempt(0, now), None);
    assert_eq!(task.begin_attempt(1, now), Some(2));
    assert_eq!(task.begin_attempt(2, now), None);
    assert!(task.is_exhausted());
    assert_eq!(task.status_label(), "exhausted");
}

#[test]
fn test_mark_processed_stores_result() {
    let mut task = sample_task(3);
    let attempt = task.begin_attempt(0, Utc::now()).unwrap();

    let outcome = task.mark_processed(attempt, json!({"ok": true}), Utc::now());
    assert_eq!(outcome, ReportOutcome::Completed);
    assert!(task.processed);
    assert!(!task.failed);
    assert_eq!(task.result, Some(json!({"ok": true})));
    assert!(task.completed_on.is_some());

    // Replays are no-ops.
    assert_eq!(
        task.mark_processed(attempt, json!(null), Utc::now()),
        ReportOutcome::Stale
    );
    assert_eq!(
        task.record_failure(attempt, "late", false, Utc::now()),
        ReportOutcome::Stale
    );
    assert!(task.processed && !task.failed);
}

#[test]
fn test_record_failure_retries_until_ceiling() {
    let mut task = sample_task(3);

    for expected in [ReportOutcome::Retry, ReportOutcome::Retry, ReportOutcome::Failed] {
        let attempt = task.begin_attempt(task.attempts, Utc::now()).unwrap();
        let outcome = task.record_failure(attempt, &format!("boom {}", attempt), false, Utc::now());
        assert_eq!(outcome, expected);
    }

    assert!(task.failed);
    assert_eq!(task.attempts, 3);
    assert_eq!(task.last_error.as_deref(), Some("boom 3"));
    assert!(!task.is_claimable());
}

#[test]
fn test_permanent_failure_skips_retries() {
    let mut task = sample_task(5);
    let attempt = task.begin_attempt(0, Utc::now()).unwrap();

    let outcome = task.record_failure(attempt, "unknown task type", true, Utc::now());
    assert_eq!(outcome, ReportOutcome::Failed);
    assert!(task.failed);
    assert_eq!(task.attempts, 1);
}

#[test]
fn test_report_from_superseded_attempt_is_stale() {
    let mut task = sample_task(3);
    let first = task.begin_attempt(0, Utc::now()).unwrap();
    // Lock expired; another worker started attempt 2.
    let second = task.begin_attempt(first, Utc::now()).unwrap();

    assert_eq!(
        task.mark_processed(first, json!(1), Utc::now()),
        ReportOutcome::Stale
    );
    assert!(!task.processed);
    assert_eq!(
        task.mark_processed(second, json!(2), Utc::now()),
        ReportOutcome::Completed
    );
}

#[test]
fn test_mark_exhausted() {
    let mut task = sample_task(1);
    assert!(!task.mark_exhausted(Utc::now()));

    task.begin_attempt(0, Utc::now()).unwrap();
    assert!(task.mark_exhausted(Utc::now()));
    assert!(task.failed);
    assert!(task.last_error.as_deref().unwrap().contains("did not report"));
    assert!(!task.mark_exhausted(Utc::now()));
}

#[test]
fn test_task_json_omits_empty_optionals() {
    let task = sample_task(3);
    let value = serde_json::to_value(&task).unwrap();

    assert!(value.get("last_error").is_none());
    assert!(value.get("result").is_none());
    assert!(value.get("completed_on").is_none());
    assert_eq!(value["task_params"], json!({"n": 1}));

    let parsed: Task = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, task);
}

#[test]
fn test_store_insert_list_and_count() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);

    for seq in [2, 0, 1] {
        let task = Task::new("b1", seq, TaskSpec::new("noop", json!(seq)), 3);
        store.insert(task).unwrap();
    }

    let seqs: Vec<u32> = store.list("b1").unwrap().iter().map(|t| t.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(store.count("b1").unwrap(), 3);
    assert_eq!(store.count("other").unwrap(), 0);
    assert_eq!(store.batch_ids().unwrap(), vec!["b1"]);
}

#[test]
fn test_store_insert_duplicate_is_error() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    let task = Task::new("b1", 0, TaskSpec::new("noop", json!(null)), 3);

    store.insert(task.clone()).unwrap();
    assert!(store.insert(task).is_err());
}

#[test]
fn test_store_attempt_and_report_flow() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    let task = Task::new("b1", 0, TaskSpec::new("noop", json!(null)), 2);
    let id = task.id.clone();
    store.insert(task).unwrap();

    let started = store.begin_attempt("b1", &id, 0).unwrap().unwrap();
    assert_eq!(started.attempts, 1);
    assert!(store.begin_attempt("b1", &id, 0).unwrap().is_none());

    assert_eq!(
        store.record_failure("b1", &id, 1, "first", false).unwrap(),
        ReportOutcome::Retry
    );
    store.begin_attempt("b1", &id, 1).unwrap().unwrap();
    assert_eq!(
        store.mark_processed("b1", &id, 2, json!("done")).unwrap(),
        ReportOutcome::Completed
    );

    let stored = store.get("b1", &id).unwrap().unwrap();
    assert!(stored.processed);
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.last_error.as_deref(), Some("first"));
    assert_eq!(stored.result, Some(json!("done")));
}

#[test]
fn test_store_report_on_missing_task_is_stale() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);

    assert_eq!(
        store.mark_processed("b1", "gone", 1, json!(null)).unwrap(),
        ReportOutcome::Stale
    );
    assert!(store.begin_attempt("b1", "gone", 0).unwrap().is_none());
    assert!(!store.mark_exhausted("b1", "gone").unwrap());
}

#[test]
fn test_store_delete_all() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    store
        .insert(Task::new("b1", 0, TaskSpec::new("noop", json!(null)), 3))
        .unwrap();

    store.delete_all("b1").unwrap();
    assert!(store.list("b1").unwrap().is_empty());
    assert!(store.batch_ids().unwrap().is_empty());
}

fn open_markers(ctx: &crate::context::StoreContext, batch_id: &str) -> Vec<String> {
    let dir = ctx.tasks_dir.join(batch_id).join(".open");
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn test_open_index_tracks_unfinished_tasks() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    let tasks: Vec<Task> = (0..3)
        .map(|seq| Task::new("b1", seq, TaskSpec::new("noop", json!(seq)), 1))
        .collect();
    for task in &tasks {
        store.insert(task.clone()).unwrap();
    }
    assert_eq!(open_markers(&ctx, "b1").len(), 3);

    store.begin_attempt("b1", &tasks[0].id, 0).unwrap().unwrap();
    store.mark_processed("b1", &tasks[0].id, 1, json!("ok")).unwrap();
    store.begin_attempt("b1", &tasks[2].id, 0).unwrap().unwrap();
    assert_eq!(
        store.record_failure("b1", &tasks[2].id, 1, "boom", false).unwrap(),
        ReportOutcome::Failed
    );

    let open: Vec<String> = store
        .open_tasks("b1")
        .unwrap()
        .map(|t| t.unwrap().id)
        .collect();
    assert_eq!(open, vec![tasks[1].id.clone()]);
    assert_eq!(open_markers(&ctx, "b1"), vec![format!("0000000001.{}", tasks[1].id)]);
}

#[test]
fn test_open_index_is_in_seq_order() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    for seq in [11, 2, 7] {
        store
            .insert(Task::new("b1", seq, TaskSpec::new("noop", json!(null)), 3))
            .unwrap();
    }

    let seqs: Vec<u32> = store
        .open_tasks("b1")
        .unwrap()
        .map(|t| t.unwrap().seq)
        .collect();
    assert_eq!(seqs, vec![2, 7, 11]);
}

#[test]
fn test_open_index_drops_markers_of_finished_tasks() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    let task = Task::new("b1", 0, TaskSpec::new("noop", json!(null)), 3);
    let id = task.id.clone();
    store.insert(task).unwrap();
    store.begin_attempt("b1", &id, 0).unwrap().unwrap();
    store.mark_processed("b1", &id, 1, json!(null)).unwrap();

    // A crash between the report and the marker removal leaves the marker.
    let marker = ctx.tasks_dir.join("b1").join(".open").join(format!("0000000000.{}", id));
    std::fs::write(&marker, b"").unwrap();

    assert_eq!(store.open_tasks("b1").unwrap().count(), 0);
    assert!(!marker.exists());
}

#[test]
fn test_open_marker_without_document_is_skipped_and_kept() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);

    // An insert that has written its marker but not yet its document.
    let dir = ctx.tasks_dir.join("b1").join(".open");
    std::fs::create_dir_all(&dir).unwrap();
    let marker = dir.join("0000000000.not-written-yet");
    std::fs::write(&marker, b"").unwrap();

    assert_eq!(store.open_tasks("b1").unwrap().count(), 0);
    assert!(marker.exists());
    assert!(store.list("b1").unwrap().is_empty());
}

#[test]
fn test_list_by_type_and_processed_state() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);

    let mut ids = Vec::new();
    for (batch_id, seq, task_type) in [
        ("b1", 0, "resize"),
        ("b1", 1, "resize"),
        ("b1", 2, "upload"),
        ("b2", 0, "resize"),
    ] {
        let task = Task::new(batch_id, seq, TaskSpec::new(task_type, json!(null)), 1);
        ids.push(task.id.clone());
        store.insert(task).unwrap();
    }

    store.begin_attempt("b1", &ids[1], 0).unwrap().unwrap();
    store.mark_processed("b1", &ids[1], 1, json!(null)).unwrap();
    store.begin_attempt("b2", &ids[3], 0).unwrap().unwrap();
    store.record_failure("b2", &ids[3], 1, "boom", false).unwrap();

    let processed: Vec<String> = store
        .list_by_type("resize", true)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(processed, vec![ids[1].clone()]);

    // Failed tasks are unprocessed too.
    let unprocessed: Vec<String> = store
        .list_by_type("resize", false)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(unprocessed, vec![ids[0].clone(), ids[3].clone()]);

    assert_eq!(store.count_by_type("upload", false).unwrap(), 1);
    assert_eq!(store.count_by_type("upload", true).unwrap(), 0);
    assert_eq!(store.count_by_type("missing type", false).unwrap(), 0);

    store.delete_all("b1").unwrap();
    assert_eq!(store.count_by_type("resize", true).unwrap(), 0);
    assert_eq!(store.count_by_type("upload", false).unwrap(), 0);
    assert_eq!(store.count_by_type("resize", false).unwrap(), 1);
}

#[test]
fn test_stale_report_leaves_index_alone() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    let task = Task::new("b1", 0, TaskSpec::new("noop", json!(null)), 3);
    let id = task.id.clone();
    store.insert(task).unwrap();
    store.begin_attempt("b1", &id, 0).unwrap().unwrap();
    store.begin_attempt("b1", &id, 1).unwrap().unwrap();

    // Attempt 1 reports after attempt 2 started.
    assert_eq!(
        store.mark_processed("b1", &id, 1, json!(null)).unwrap(),
        ReportOutcome::Stale
    );
    assert_eq!(store.count_by_type("noop", true).unwrap(), 0);
    assert_eq!(store.count_by_type("noop", false).unwrap(), 1);
    assert_eq!(open_markers(&ctx, "b1").len(), 1);
}

#[test]
fn test_delete_removes_index_markers() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    let task = Task::new("b1", 0, TaskSpec::new("noop", json!(null)), 3);
    let id = task.id.clone();
    store.insert(task).unwrap();

    assert!(store.delete("b1", &id).unwrap());
    assert!(open_markers(&ctx, "b1").is_empty());
    assert_eq!(store.count_by_type("noop", false).unwrap(), 0);
    assert!(!store.delete("b1", &id).unwrap());
}

#[test]
fn test_store_mark_exhausted_fails_only_exhausted_tasks() {
    let (_temp_dir, ctx) = create_test_store();
    let store = TaskStore::new(&ctx);
    let task = Task::new("b1", 0, TaskSpec::new("noop", json!(null)), 1);
    let id = task.id.clone();
    store.insert(task).unwrap();

    assert!(!store.mark_exhausted("b1", &id).unwrap());

    // The only attempt starts and its worker dies before reporting.
    store.begin_attempt("b1", &id, 0).unwrap().unwrap();
    assert!(store.mark_exhausted("b1", &id).unwrap());
    assert!(!store.mark_exhausted("b1", &id).unwrap());

    let stored = store.get("b1", &id).unwrap().unwrap();
    assert!(stored.failed);
    assert!(stored.last_error.is_some());
    assert!(open_markers(&ctx, "b1").is_empty());
}
