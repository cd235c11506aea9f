//! Task completion: marks a task done, spawns the next occurrence of a
//! recurring task and appends a health-log entry for the pet.
//!
//! The primary write (marking done) is the source of truth. The successor
//! insert and the health-log append run after it and only log on failure,
//! so a caller sees success as soon as the task itself is durably done.

use crate::clock::Clock;
use crate::error::AppError;
use crate::model::{HealthLogEntry, Task};
use crate::recurrence;
use crate::storage::{HealthLogStore, Stores, TaskPatch, TaskStore, UpdateOutcome};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct TaskCompletionService {
    tasks: Arc<dyn TaskStore>,
    health_logs: Arc<dyn HealthLogStore>,
    clock: Arc<dyn Clock>,
}

impl TaskCompletionService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        health_logs: Arc<dyn HealthLogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            health_logs,
            clock,
        }
    }

    pub fn from_stores(stores: &Stores, clock: Arc<dyn Clock>) -> Self {
        Self::new(stores.tasks.clone(), stores.health_logs.clone(), clock)
    }

    /// Completes `task_id` on behalf of `requester_id` and returns the
    /// updated task (not its successor).
    ///
    /// Errors with `not_found` when the task is missing or belongs to another
    /// owner, and with `conflict` when it is already done.
    pub fn complete_task(
        &self,
        task_id: &str,
        requester_id: &str,
        note: Option<&str>,
    ) -> Result<Task, AppError> {
        let task = self
            .tasks
            .get(task_id)?
            .filter(|task| task.owner_id == requester_id)
            .ok_or_else(|| AppError::not_found("task not found"))?;

        if task.is_done {
            return Err(AppError::conflict("task already completed"));
        }

        let note = note
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let done_at = self.clock.now();
        let patch = TaskPatch::completion(done_at, note.clone());

        let completed = match self.tasks.update(task_id, &patch)? {
            UpdateOutcome::Updated(task) => task,
            UpdateOutcome::AlreadyDone(_) => {
                debug!(task_id, "lost completion race");
                return Err(AppError::conflict("task already completed"));
            }
            UpdateOutcome::Missing => return Err(AppError::not_found("task not found")),
        };
        info!(task_id, pet_id = %completed.pet_id, "task completed");

        let mut partial = false;
        if completed.is_recurring()
            && let Err(err) = self.spawn_successor(&completed)
        {
            error!(task_id, error = %err, "successor task was not created");
            partial = true;
        }

        if let Err(err) = self.append_health_log(&completed, done_at, note) {
            error!(task_id, error = %err, "health log entry was not written");
            partial = true;
        }

        if partial {
            warn!(task_id, "completion partially applied");
        }

        Ok(completed)
    }

    fn spawn_successor(&self, completed: &Task) -> Result<Task, AppError> {
        let due_date = recurrence::next_due(completed.due_date, &completed.recurring)?;
        let successor = Task {
            id: successor_id(&completed.pet_id),
            owner_id: completed.owner_id.clone(),
            pet_id: completed.pet_id.clone(),
            task_type: completed.task_type,
            due_date,
            recurring: completed.recurring,
            is_done: false,
            done_at: None,
            note: None,
        };
        self.tasks.insert(successor.clone())?;
        info!(
            task_id = %completed.id,
            successor_id = %successor.id,
            due_date = %successor.due_date,
            "scheduled next occurrence"
        );
        Ok(successor)
    }

    fn append_health_log(
        &self,
        completed: &Task,
        done_at: OffsetDateTime,
        note: Option<String>,
    ) -> Result<(), AppError> {
        let description = note
            .clone()
            .unwrap_or_else(|| format!("Completed task: {}", completed.task_type));
        let entry = HealthLogEntry {
            id: format!("log-{}", Uuid::now_v7()),
            task_id: Some(completed.id.clone()),
            pet_id: completed.pet_id.clone(),
            owner_id: completed.owner_id.clone(),
            entry_type: completed.task_type.as_str().to_string(),
            description,
            date: done_at,
            note,
        };
        self.health_logs.insert(entry)
    }
}

/// Fresh id for the next occurrence. The v7 uuid keeps ids unique even when
/// several tasks of one pet complete within the same instant.
fn successor_id(pet_id: &str) -> String {
    format!("{pet_id}-{}", Uuid::now_v7())
}
