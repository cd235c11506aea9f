use crate::error::AppError;
use crate::notify::NotificationGateway;
use notify_rust::Notification;
use tracing::debug;

/// Shows reminders as desktop notifications on the local session bus.
pub struct DesktopGateway;

impl NotificationGateway for DesktopGateway {
    fn send(&self, target: &str, title: &str, body: &str) -> Result<(), AppError> {
        debug!(target_id = target, "showing desktop notification");
        Notification::new()
            .appname("petcare")
            .summary(title)
            .body(body)
            .show()
            .map_err(|err| AppError::io(err.to_string()))?;
        Ok(())
    }
}
