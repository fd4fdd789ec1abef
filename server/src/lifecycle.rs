// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Task status transitions.
//!
//! `Pending -> In Progress -> Completed`, where `Completed` is terminal.
//! Applying a transition never touches storage; the caller persists the
//! returned task with a write conditioned on the status it started from.
use chrono::{DateTime, Utc};
use ems_common::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The task is already `Completed` and accepts no further change.
    Locked,
}

/// Computes the task as it looks after moving to `next` at time `now`.
pub fn apply_transition(
    task: &Task,
    next: TaskStatus,
    now: DateTime<Utc>,
) -> Result<Task, TransitionError> {
    if task.status.is_terminal() {
        return Err(TransitionError::Locked);
    }

    let mut updated = task.clone();
    match next {
        TaskStatus::InProgress => {
            // Only the first entry into In Progress is recorded.
            if updated.start_date.is_none() {
                updated.start_date = Some(now);
            }
        }
        TaskStatus::Completed => {
            updated.end_date = Some(now);
            updated.completed_at = Some(now);
        }
        TaskStatus::Pending => {}
    }
    updated.status = next;

    Ok(updated)
}
