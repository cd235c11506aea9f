use petcare_core::error::AppError;
use petcare_core::model::{Recurrence, RecurrenceKind, TaskType};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Accepts RFC 3339, or `YYYY-MM-DD[ HH:MM[:SS]]` read in `offset`
/// (date-only input means midnight).
pub fn parse_datetime(raw: &str, offset: UtcOffset) -> Result<OffsetDateTime, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("datetime is required"));
    }

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed);
    }

    let with_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let with_minutes = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let date_only = format_description!("[year]-[month]-[day]");

    if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, with_seconds)
        .or_else(|_| PrimitiveDateTime::parse(trimmed, with_minutes))
    {
        return Ok(parsed.assume_offset(offset));
    }

    if let Ok(date) = Date::parse(trimmed, date_only) {
        return Ok(date.midnight().assume_offset(offset));
    }

    Err(AppError::invalid_input(
        "datetime must be RFC3339 or YYYY-MM-DD [HH:MM[:SS]]",
    ))
}

pub fn parse_task_type(raw: &str) -> Result<TaskType, AppError> {
    TaskType::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = TaskType::ALL.iter().map(|kind| kind.as_str()).collect();
        AppError::invalid_input(format!(
            "unknown task type '{}' (expected one of {})",
            raw.trim(),
            known.join(", ")
        ))
    })
}

/// An omitted interval means 1 for recurring kinds and 0 for `none`.
pub fn parse_recurrence(kind: &str, interval: Option<u32>) -> Result<Recurrence, AppError> {
    let kind = RecurrenceKind::parse(kind).ok_or_else(|| {
        AppError::invalid_input(format!(
            "unknown recurrence '{}' (expected none, daily, weekly or monthly)",
            kind.trim()
        ))
    })?;

    let interval = match (kind, interval) {
        (RecurrenceKind::None, _) => 0,
        (_, Some(0)) => {
            return Err(AppError::invalid_input(
                "interval must be at least 1 for recurring tasks",
            ));
        }
        (_, Some(value)) => value,
        (_, None) => 1,
    };

    Ok(Recurrence::new(kind, interval))
}
