//! Exit code constants for the lockstep CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state, unknown batch)
//! - 2: Task failure (handler error or unknown task type surfaced to the CLI)
//! - 3: Store failure (filesystem or serialization error in the shared store)
//! - 4: Lock failure (lock held, lost, or could not be cleared)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid state, or missing records.
pub const USER_ERROR: i32 = 1;

/// Task failure: a handler reported an error or its type is not registered.
pub const TASK_FAILURE: i32 = 2;

/// Store failure: the shared store could not be read or written.
pub const STORE_FAILURE: i32 = 3;

/// Lock failure: a lock was held elsewhere or lost mid-operation.
pub const LOCK_FAILURE: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, TASK_FAILURE, STORE_FAILURE, LOCK_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
        assert_eq!(LOCK_FAILURE, 4);
    }
}
