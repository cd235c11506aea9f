use crate::error::AppError;
use crate::model::{Recurrence, RecurrenceKind};
use time::{Date, Duration, Month, OffsetDateTime};

/// Due date of the occurrence that follows one due at `base`.
///
/// Monthly steps keep the day of month when the target month has it and
/// clamp to the month's last day otherwise (Jan 31 + 1 month = Feb 28/29).
/// Time of day and offset are carried over unchanged.
pub fn next_due(base: OffsetDateTime, rule: &Recurrence) -> Result<OffsetDateTime, AppError> {
    let interval = i64::from(rule.interval);
    match rule.kind {
        RecurrenceKind::None => Err(AppError::invalid_input(
            "recurrence kind none has no next occurrence",
        )),
        RecurrenceKind::Daily => add_days(base, interval),
        RecurrenceKind::Weekly => add_days(base, interval * 7),
        RecurrenceKind::Monthly => add_months(base, rule.interval),
    }
}

fn add_days(base: OffsetDateTime, days: i64) -> Result<OffsetDateTime, AppError> {
    base.checked_add(Duration::days(days))
        .ok_or_else(|| AppError::invalid_data("next due date is out of range"))
}

fn add_months(base: OffsetDateTime, months: u32) -> Result<OffsetDateTime, AppError> {
    let month_index = i64::from(base.year()) * 12 + i64::from(u8::from(base.month())) - 1;
    let target = month_index + i64::from(months);
    let year = i32::try_from(target.div_euclid(12))
        .map_err(|_| AppError::invalid_data("next due date is out of range"))?;
    let month = Month::try_from(target.rem_euclid(12) as u8 + 1)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;

    let date = clamped_date(year, month, base.day())?;
    Ok(base.replace_date(date))
}

fn clamped_date(year: i32, month: Month, preferred_day: u8) -> Result<Date, AppError> {
    for day in (1..=preferred_day).rev() {
        if let Ok(date) = Date::from_calendar_date(year, month, day) {
            return Ok(date);
        }
    }
    Err(AppError::invalid_data("next due date is out of range"))
}

#[cfg(test)]
mod tests {
    use super::next_due;
    use crate::model::{Recurrence, RecurrenceKind};
    use time::macros::{datetime, offset};
    use time::{Duration, Month};

    fn rule(kind: RecurrenceKind, interval: u32) -> Recurrence {
        Recurrence::new(kind, interval)
    }

    #[test]
    fn daily_adds_exact_days() {
        let base = datetime!(2024-03-10 09:00:00 UTC);
        for n in [0_u32, 1, 2, 30, 365] {
            let next = next_due(base, &rule(RecurrenceKind::Daily, n)).unwrap();
            assert_eq!(next, base + Duration::days(i64::from(n)));
        }
    }

    #[test]
    fn daily_spans_leap_day() {
        let base = datetime!(2024-02-28 18:30:00 UTC);
        let next = next_due(base, &rule(RecurrenceKind::Daily, 1)).unwrap();
        assert_eq!(next, datetime!(2024-02-29 18:30:00 UTC));
    }

    #[test]
    fn weekly_adds_seven_days_per_interval() {
        let base = datetime!(2024-12-30 07:15:00 UTC);
        for n in [1_u32, 2, 4, 52] {
            let next = next_due(base, &rule(RecurrenceKind::Weekly, n)).unwrap();
            assert_eq!(next, base + Duration::days(7 * i64::from(n)));
        }
    }

    #[test]
    fn monthly_preserves_day_and_time() {
        let base = datetime!(2024-03-10 09:00:00 UTC);
        let next = next_due(base, &rule(RecurrenceKind::Monthly, 1)).unwrap();
        assert_eq!(next, datetime!(2024-04-10 09:00:00 UTC));
    }

    #[test]
    fn monthly_carries_year() {
        let base = datetime!(2024-11-15 12:00:00 UTC);
        let next = next_due(base, &rule(RecurrenceKind::Monthly, 3)).unwrap();
        assert_eq!(next.year(), 2025);
        assert_eq!(next.month(), Month::February);
        assert_eq!(next.day(), 15);

        let far = next_due(base, &rule(RecurrenceKind::Monthly, 25)).unwrap();
        assert_eq!(far, datetime!(2026-12-15 12:00:00 UTC));
    }

    #[test]
    fn monthly_month_matches_modular_arithmetic() {
        let base = datetime!(2023-05-20 08:00:00 UTC);
        for n in 0_u32..=36 {
            let next = next_due(base, &rule(RecurrenceKind::Monthly, n)).unwrap();
            let expected_index = (5 - 1 + n) % 12 + 1;
            let expected_year = 2023 + ((5 - 1 + n) / 12) as i32;
            assert_eq!(u8::from(next.month()) as u32, expected_index, "interval {n}");
            assert_eq!(next.year(), expected_year, "interval {n}");
            assert_eq!(next.day(), 20);
        }
    }

    #[test]
    fn monthly_clamps_to_end_of_shorter_month() {
        let base = datetime!(2023-01-31 10:00:00 UTC);
        let next = next_due(base, &rule(RecurrenceKind::Monthly, 1)).unwrap();
        assert_eq!(next, datetime!(2023-02-28 10:00:00 UTC));

        let leap = datetime!(2024-01-31 10:00:00 UTC);
        let next = next_due(leap, &rule(RecurrenceKind::Monthly, 1)).unwrap();
        assert_eq!(next, datetime!(2024-02-29 10:00:00 UTC));

        let may = datetime!(2024-05-31 10:00:00 UTC);
        let next = next_due(may, &rule(RecurrenceKind::Monthly, 1)).unwrap();
        assert_eq!(next, datetime!(2024-06-30 10:00:00 UTC));
    }

    #[test]
    fn monthly_keeps_offset() {
        let base = datetime!(2024-03-10 09:00:00 +02:00);
        let next = next_due(base, &rule(RecurrenceKind::Monthly, 1)).unwrap();
        assert_eq!(next.offset(), offset!(+02:00));
        assert_eq!(next, datetime!(2024-04-10 09:00:00 +02:00));
    }

    #[test]
    fn none_is_rejected() {
        let base = datetime!(2024-03-10 09:00:00 UTC);
        let err = next_due(base, &Recurrence::NONE).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }
}
