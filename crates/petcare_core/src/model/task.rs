use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub pet_id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(with = "time::serde::rfc3339")]
    pub due_date: OffsetDateTime,
    #[serde(default)]
    pub recurring: Recurrence,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub done_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Task {
    pub fn is_recurring(&self) -> bool {
        self.recurring.kind != RecurrenceKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Vaccination,
    Grooming,
    Walk,
    Feeding,
    Medication,
    Deworming,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Vaccination,
        TaskType::Grooming,
        TaskType::Walk,
        TaskType::Feeding,
        TaskType::Medication,
        TaskType::Deworming,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Vaccination => "Vaccination",
            TaskType::Grooming => "Grooming",
            TaskType::Walk => "Walk",
            TaskType::Feeding => "Feeding",
            TaskType::Medication => "Medication",
            TaskType::Deworming => "Deworming",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(raw: &str) -> Option<TaskType> {
        let trimmed = raw.trim();
        TaskType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a completed task regenerates its next occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(alias = "type")]
    pub kind: RecurrenceKind,
    #[serde(default)]
    pub interval: u32,
}

impl Recurrence {
    pub const NONE: Recurrence = Recurrence {
        kind: RecurrenceKind::None,
        interval: 0,
    };

    pub fn new(kind: RecurrenceKind, interval: u32) -> Self {
        Self { kind, interval }
    }
}

impl Default for Recurrence {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceKind::None => "none",
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
        }
    }

    pub fn parse(raw: &str) -> Option<RecurrenceKind> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Some(RecurrenceKind::None),
            "daily" => Some(RecurrenceKind::Daily),
            "weekly" => Some(RecurrenceKind::Weekly),
            "monthly" => Some(RecurrenceKind::Monthly),
            _ => None,
        }
    }
}
