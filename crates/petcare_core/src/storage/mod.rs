//! Store contracts consumed by the completion service, the reminder
//! dispatcher and the owner-scoped API, plus the JSON file backend.

pub mod json_store;

use crate::error::AppError;
use crate::model::{HealthLogEntry, PushTarget, Reminder, Task};
use std::sync::Arc;
use time::OffsetDateTime;

pub use json_store::JsonStore;

pub trait TaskStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Task>, AppError>;

    /// Merges `patch` into the stored task as one atomic write.
    fn update(&self, id: &str, patch: &TaskPatch) -> Result<UpdateOutcome, AppError>;

    /// Fails with `conflict` when the id is already taken.
    fn insert(&self, task: Task) -> Result<(), AppError>;

    /// Tasks of `owner_id` due in `[start, end)`, earliest first.
    fn query_by_owner_and_due_range(
        &self,
        owner_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Task>, AppError>;
}

pub trait HealthLogStore: Send + Sync {
    fn insert(&self, entry: HealthLogEntry) -> Result<(), AppError>;

    fn query_by_pet(&self, pet_id: &str, order: SortOrder)
    -> Result<Vec<HealthLogEntry>, AppError>;
}

pub trait ReminderStore: Send + Sync {
    fn insert(&self, reminder: Reminder) -> Result<(), AppError>;

    fn query_unsent(&self) -> Result<Vec<Reminder>, AppError>;

    /// Sent is terminal: marking an already-sent reminder is a no-op.
    fn mark_sent(&self, id: &str) -> Result<(), AppError>;
}

pub trait PushTargetStore: Send + Sync {
    /// Replaces any target previously registered for the same owner.
    fn register(&self, target: PushTarget) -> Result<(), AppError>;

    fn target_for(&self, owner_id: &str) -> Result<Option<PushTarget>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Partial task update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub is_done: Option<bool>,
    pub done_at: Option<OffsetDateTime>,
    pub note: Option<String>,
    /// Only apply while the stored task is still pending.
    pub require_pending: bool,
}

impl TaskPatch {
    pub fn completion(done_at: OffsetDateTime, note: Option<String>) -> Self {
        Self {
            is_done: Some(true),
            done_at: Some(done_at),
            note,
            require_pending: true,
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(is_done) = self.is_done {
            task.is_done = is_done;
        }
        if let Some(done_at) = self.done_at {
            task.done_at = Some(done_at);
        }
        if let Some(note) = self.note.as_ref() {
            task.note = Some(note.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Task),
    /// The `require_pending` guard failed; carries the stored task.
    AlreadyDone(Task),
    Missing,
}

/// The store handles shared by the services.
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn TaskStore>,
    pub health_logs: Arc<dyn HealthLogStore>,
    pub reminders: Arc<dyn ReminderStore>,
    pub push_targets: Arc<dyn PushTargetStore>,
}

impl Stores {
    pub fn json(store: Arc<JsonStore>) -> Self {
        Self {
            tasks: store.clone(),
            health_logs: store.clone(),
            reminders: store.clone(),
            push_targets: store,
        }
    }
}
