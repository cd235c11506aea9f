use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Device token a user registered for push delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTarget {
    pub owner_id: String,
    pub target: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
