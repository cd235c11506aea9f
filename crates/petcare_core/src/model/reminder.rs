use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub task_id: String,
    pub owner_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub reminder_time: OffsetDateTime,
    pub message: String,
    #[serde(default)]
    pub sent: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Reminder {
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.reminder_time <= now
    }
}
