//! One reminder sweep: deliver every due, unsent reminder and mark it sent.
//!
//! Delivery is at-most-once and best-effort. A reminder is marked sent once
//! it is due whether or not delivery worked, and whether or not its owner has
//! a registered push target.

use crate::clock::Clock;
use crate::error::AppError;
use crate::model::Reminder;
use crate::notify::NotificationGateway;
use crate::storage::{PushTargetStore, ReminderStore, Stores};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

pub const REMINDER_TITLE: &str = "PetPal Reminder";

/// Counts for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub not_due: usize,
    pub delivered: usize,
    pub delivery_failed: usize,
    pub no_target: usize,
    pub mark_failed: usize,
}

impl SweepReport {
    /// Reminders that left the unsent state during this sweep.
    pub fn marked_sent(&self) -> usize {
        self.delivered + self.delivery_failed + self.no_target
    }
}

enum Delivery {
    Delivered,
    Failed,
    NoTarget,
}

pub struct ReminderDispatcher {
    reminders: Arc<dyn ReminderStore>,
    push_targets: Arc<dyn PushTargetStore>,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
}

impl ReminderDispatcher {
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        push_targets: Arc<dyn PushTargetStore>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reminders,
            push_targets,
            gateway,
            clock,
        }
    }

    pub fn from_stores(
        stores: &Stores,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            stores.reminders.clone(),
            stores.push_targets.clone(),
            gateway,
            clock,
        )
    }

    /// Fails only when the unsent reminders cannot be listed. Problems with a
    /// single reminder are logged and counted, and the sweep moves on.
    pub fn sweep(&self) -> Result<SweepReport, AppError> {
        let pending = self.reminders.query_unsent()?;
        let now = self.clock.now();
        let mut report = SweepReport {
            examined: pending.len(),
            ..SweepReport::default()
        };

        for reminder in &pending {
            if !reminder.is_due(now) {
                report.not_due += 1;
                continue;
            }
            self.process(reminder, now, &mut report);
        }

        if report.marked_sent() > 0 || report.mark_failed > 0 {
            info!(
                examined = report.examined,
                delivered = report.delivered,
                delivery_failed = report.delivery_failed,
                no_target = report.no_target,
                mark_failed = report.mark_failed,
                "reminder sweep finished"
            );
        } else {
            debug!(examined = report.examined, "reminder sweep found nothing due");
        }
        Ok(report)
    }

    fn process(&self, reminder: &Reminder, now: OffsetDateTime, report: &mut SweepReport) {
        let delivery = self.deliver(reminder);

        if let Err(err) = self.reminders.mark_sent(&reminder.id) {
            error!(reminder_id = %reminder.id, error = %err, "failed to mark reminder sent");
            report.mark_failed += 1;
            return;
        }

        match delivery {
            Delivery::Delivered => report.delivered += 1,
            Delivery::Failed => report.delivery_failed += 1,
            Delivery::NoTarget => report.no_target += 1,
        }
        debug!(
            reminder_id = %reminder.id,
            late_by_secs = (now - reminder.reminder_time).whole_seconds(),
            "reminder marked sent"
        );
    }

    fn deliver(&self, reminder: &Reminder) -> Delivery {
        let target = match self.push_targets.target_for(&reminder.owner_id) {
            Ok(Some(target)) => target,
            Ok(None) => {
                debug!(
                    reminder_id = %reminder.id,
                    owner_id = %reminder.owner_id,
                    "no push target registered"
                );
                return Delivery::NoTarget;
            }
            Err(err) => {
                warn!(reminder_id = %reminder.id, error = %err, "push target lookup failed");
                return Delivery::Failed;
            }
        };

        match self
            .gateway
            .send(&target.target, REMINDER_TITLE, &reminder.message)
        {
            Ok(()) => Delivery::Delivered,
            Err(err) => {
                warn!(reminder_id = %reminder.id, error = %err, "reminder delivery failed");
                Delivery::Failed
            }
        }
    }
}
