//! Fenced mutation helpers for task transitions.
//!
//! Every helper is a pure state change applied inside a conditional store
//! update. Reports carry the attempt number they belong to; a report whose
//! attempt is no longer current (the lock expired and another worker started
//! a newer attempt) or whose task already finished is rejected as
//! [`ReportOutcome::Stale`] and changes nothing.

use super::Task;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Effect of reporting an attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The task is now processed.
    Completed,
    /// The failure was recorded; attempts remain.
    Retry,
    /// The task is now terminally failed.
    Failed,
    /// Nothing changed: the report belongs to a superseded attempt.
    Stale,
}

impl Task {
    /// Start the next attempt, fenced on the attempts value seen under the
    /// task lock. Returns the new attempt number.
    pub fn begin_attempt(&mut self, seen_attempts: u32, now: DateTime<Utc>) -> Option<u32> {
        if !self.is_claimable() || self.attempts != seen_attempts {
            return None;
        }
        self.attempts += 1;
        self.updated_on = now;
        Some(self.attempts)
    }

    fn is_current_attempt(&self, attempt: u32) -> bool {
        !self.is_finished() && self.attempts == attempt
    }

    /// Record a successful attempt.
    pub fn mark_processed(
        &mut self,
        attempt: u32,
        result: Value,
        now: DateTime<Utc>,
    ) -> ReportOutcome {
        if !self.is_current_attempt(attempt) {
            return ReportOutcome::Stale;
        }
        self.processed = true;
        self.result = (!result.is_null()).then_some(result);
        self.updated_on = now;
        self.completed_on = Some(now);
        ReportOutcome::Completed
    }

    /// Record a failed attempt.
    ///
    /// `permanent` failures (e.g. no handler for the task type) fail the task
    /// regardless of remaining attempts.
    pub fn record_failure(
        &mut self,
        attempt: u32,
        error: &str,
        permanent: bool,
        now: DateTime<Utc>,
    ) -> ReportOutcome {
        if !self.is_current_attempt(attempt) {
            return ReportOutcome::Stale;
        }
        self.last_error = Some(error.to_string());
        self.updated_on = now;

        if permanent || self.attempts >= self.max_attempts {
            self.failed = true;
            self.completed_on = Some(now);
            ReportOutcome::Failed
        } else {
            ReportOutcome::Retry
        }
    }

    /// Fail a task whose final attempt never reported.
    pub fn mark_exhausted(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_exhausted() {
            return false;
        }
        self.failed = true;
        if self.last_error.is_none() {
            self.last_error = Some(format!(
                "attempt {} of {} did not report before its lock expired",
                self.attempts, self.max_attempts
            ));
        }
        self.updated_on = now;
        self.completed_on = Some(now);
        true
    }
}
