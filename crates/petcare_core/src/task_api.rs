use crate::clock::{Clock, SystemClock};
use crate::completion::TaskCompletionService;
use crate::config::Config;
use crate::dispatcher::ReminderDispatcher;
use crate::error::AppError;
use crate::model::{HealthLogEntry, PushTarget, Recurrence, Reminder, Task, TaskType};
use crate::notify::NotificationGateway;
use crate::storage::{JsonStore, SortOrder, Stores};
use std::sync::Arc;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use tracing::info;
use uuid::Uuid;

/// Input for [`PetCare::create_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub id: String,
    pub pet_id: String,
    pub task_type: TaskType,
    pub due_date: OffsetDateTime,
    pub recurring: Recurrence,
    pub note: Option<String>,
}

/// Owner-scoped operations over the stores. Every call takes the
/// authenticated owner id and never exposes another owner's records.
pub struct PetCare {
    stores: Stores,
    clock: Arc<dyn Clock>,
    completion: TaskCompletionService,
}

impl PetCare {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        let completion = TaskCompletionService::from_stores(&stores, clock.clone());
        Self {
            stores,
            clock,
            completion,
        }
    }

    pub fn open(config: &Config) -> Result<Self, AppError> {
        let store = JsonStore::open(config)?;
        Ok(Self::new(
            Stores::json(Arc::new(store)),
            Arc::new(SystemClock),
        ))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn dispatcher(&self, gateway: Arc<dyn NotificationGateway>) -> ReminderDispatcher {
        ReminderDispatcher::from_stores(&self.stores, gateway, self.clock.clone())
    }

    pub fn create_task(&self, owner_id: &str, new_task: NewTask) -> Result<Task, AppError> {
        let owner_id = required(owner_id, "owner is required")?;
        let id = required(&new_task.id, "id is required")?;
        let pet_id = required(&new_task.pet_id, "pet id is required")?;

        let task = Task {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            pet_id: pet_id.to_string(),
            task_type: new_task.task_type,
            due_date: new_task.due_date,
            recurring: new_task.recurring,
            is_done: false,
            done_at: None,
            note: trimmed_note(new_task.note.as_deref()),
        };
        self.stores.tasks.insert(task.clone())?;
        info!(task_id = %task.id, pet_id = %task.pet_id, "task created");
        Ok(task)
    }

    pub fn get_task(&self, owner_id: &str, task_id: &str) -> Result<Task, AppError> {
        let task_id = required(task_id, "id is required")?;
        self.stores
            .tasks
            .get(task_id)?
            .filter(|task| task.owner_id == owner_id)
            .ok_or_else(|| AppError::not_found("task not found"))
    }

    pub fn complete_task(
        &self,
        owner_id: &str,
        task_id: &str,
        note: Option<&str>,
    ) -> Result<Task, AppError> {
        let task_id = required(task_id, "id is required")?;
        self.completion.complete_task(task_id, owner_id, note)
    }

    /// Tasks due on `day` as seen from `offset`.
    pub fn daily_tasks(
        &self,
        owner_id: &str,
        day: Date,
        offset: UtcOffset,
    ) -> Result<Vec<Task>, AppError> {
        let start = day.midnight().assume_offset(offset);
        let end = start + Duration::days(1);
        self.stores
            .tasks
            .query_by_owner_and_due_range(owner_id, start, end)
    }

    /// Open tasks due from the start of today onwards, earliest first.
    pub fn upcoming_tasks(&self, owner_id: &str, offset: UtcOffset) -> Result<Vec<Task>, AppError> {
        let today = self.clock.now().to_offset(offset).date();
        let start = today.midnight().assume_offset(offset);
        let end = Date::MAX.midnight().assume_utc();
        let tasks = self
            .stores
            .tasks
            .query_by_owner_and_due_range(owner_id, start, end)?;
        Ok(tasks.into_iter().filter(|task| !task.is_done).collect())
    }

    pub fn schedule_reminder(
        &self,
        owner_id: &str,
        task_id: &str,
        reminder_time: OffsetDateTime,
        message: &str,
    ) -> Result<Reminder, AppError> {
        let task = self.get_task(owner_id, task_id)?;
        let message = required(message, "message is required")?;

        let reminder = Reminder {
            id: format!("reminder-{}", Uuid::now_v7()),
            task_id: task.id,
            owner_id: task.owner_id,
            reminder_time,
            message: message.to_string(),
            sent: false,
            created_at: self.clock.now(),
        };
        self.stores.reminders.insert(reminder.clone())?;
        info!(
            reminder_id = %reminder.id,
            task_id = %reminder.task_id,
            reminder_time = %reminder.reminder_time,
            "reminder scheduled"
        );
        Ok(reminder)
    }

    /// The owner's unsent reminders, soonest first.
    pub fn pending_reminders(&self, owner_id: &str) -> Result<Vec<Reminder>, AppError> {
        let mut reminders: Vec<Reminder> = self
            .stores
            .reminders
            .query_unsent()?
            .into_iter()
            .filter(|reminder| reminder.owner_id == owner_id)
            .collect();
        reminders.sort_by_key(|reminder| reminder.reminder_time);
        Ok(reminders)
    }

    pub fn register_push_target(&self, owner_id: &str, target: &str) -> Result<PushTarget, AppError> {
        let owner_id = required(owner_id, "owner is required")?;
        let target = required(target, "push target is required")?;

        let push_target = PushTarget {
            owner_id: owner_id.to_string(),
            target: target.to_string(),
            updated_at: self.clock.now(),
        };
        self.stores.push_targets.register(push_target.clone())?;
        info!(owner_id, "push target registered");
        Ok(push_target)
    }

    /// Health log of a pet, newest first.
    pub fn pet_logs(&self, owner_id: &str, pet_id: &str) -> Result<Vec<HealthLogEntry>, AppError> {
        self.owned_entries(owner_id, pet_id, SortOrder::Descending)
    }

    /// Health log of a pet, oldest first.
    pub fn pet_timeline(
        &self,
        owner_id: &str,
        pet_id: &str,
    ) -> Result<Vec<HealthLogEntry>, AppError> {
        self.owned_entries(owner_id, pet_id, SortOrder::Ascending)
    }

    fn owned_entries(
        &self,
        owner_id: &str,
        pet_id: &str,
        order: SortOrder,
    ) -> Result<Vec<HealthLogEntry>, AppError> {
        let pet_id = required(pet_id, "pet id is required")?;
        let entries = self.stores.health_logs.query_by_pet(pet_id, order)?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.owner_id == owner_id)
            .collect())
    }
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn required<'a>(value: &'a str, message: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input(message));
    }
    Ok(trimmed)
}

fn trimmed_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
