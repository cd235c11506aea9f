mod health_log;
mod push_target;
mod reminder;
mod task;

pub use health_log::HealthLogEntry;
pub use push_target::PushTarget;
pub use reminder::Reminder;
pub use task::{Recurrence, RecurrenceKind, Task, TaskType};
