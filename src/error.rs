//! Error types for lockstep.
//!
//! Uses thiserror for derive macros. Lock conflicts are deliberately absent:
//! a conflicting acquisition is an ordinary [`crate::locks::Acquire::Conflict`]
//! value, not a failure.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for lockstep operations.
#[derive(Error, Debug)]
pub enum LockstepError {
    /// User provided invalid arguments or the store is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// Reading or writing the shared store failed.
    #[error("Store operation failed: {0}")]
    StoreError(String),

    /// No batch record with the given id exists.
    #[error("batch '{0}' not found")]
    BatchNotFound(String),

    /// An operator lock operation could not be completed.
    #[error("Lock operation failed: {0}")]
    LockError(String),

    /// Renewal failed; exclusivity is no longer guaranteed.
    #[error("Lock lost: {0}")]
    LockLost(String),

    /// No handler is registered for the task type.
    #[error("unknown task type '{0}'")]
    UnknownTaskType(String),

    /// A handler reported a failure.
    #[error("Task execution failed: {0}")]
    ExecutionError(String),

    /// A batch was only partially written and needs reconciliation.
    #[error("Inconsistent batch creation: {0}")]
    InconsistentBatchCreation(String),
}

impl LockstepError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockstepError::UserError(_) => exit_codes::USER_ERROR,
            LockstepError::BatchNotFound(_) => exit_codes::USER_ERROR,
            LockstepError::StoreError(_) => exit_codes::STORE_FAILURE,
            LockstepError::InconsistentBatchCreation(_) => exit_codes::STORE_FAILURE,
            LockstepError::LockError(_) => exit_codes::LOCK_FAILURE,
            LockstepError::LockLost(_) => exit_codes::LOCK_FAILURE,
            LockstepError::UnknownTaskType(_) => exit_codes::TASK_FAILURE,
            LockstepError::ExecutionError(_) => exit_codes::TASK_FAILURE,
        }
    }

    /// Whether retrying the same task could succeed.
    ///
    /// A missing handler registration is a configuration problem; running the
    /// task again cannot fix it.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LockstepError::UnknownTaskType(_))
    }
}

/// Result type alias for lockstep operations.
pub type Result<T> = std::result::Result<T, LockstepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = LockstepError::UserError("bad argument".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn batch_not_found_is_a_user_error() {
        let err = LockstepError::BatchNotFound("0190".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert_eq!(err.to_string(), "batch '0190' not found");
    }

    #[test]
    fn store_errors_have_correct_exit_code() {
        let err = LockstepError::StoreError("disk full".to_string());
        assert_eq!(err.exit_code(), exit_codes::STORE_FAILURE);

        let err = LockstepError::InconsistentBatchCreation("3 of 5 tasks".to_string());
        assert_eq!(err.exit_code(), exit_codes::STORE_FAILURE);
    }

    #[test]
    fn lock_errors_have_correct_exit_code() {
        assert_eq!(
            LockstepError::LockError("held".to_string()).exit_code(),
            exit_codes::LOCK_FAILURE
        );
        assert_eq!(
            LockstepError::LockLost("task/abc".to_string()).exit_code(),
            exit_codes::LOCK_FAILURE
        );
    }

    #[test]
    fn unknown_task_type_is_not_retryable() {
        assert!(!LockstepError::UnknownTaskType("import".to_string()).is_retryable());
        assert!(LockstepError::ExecutionError("boom".to_string()).is_retryable());
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = LockstepError::UnknownTaskType("import".to_string());
        assert_eq!(err.to_string(), "unknown task type 'import'");

        let err = LockstepError::ExecutionError("parse failed".to_string());
        assert_eq!(err.to_string(), "Task execution failed: parse failed");
    }
}
