use crate::error::AppError;
use crate::notify::NotificationGateway;
use tauri_winrt_notification::Toast;
use tracing::debug;

pub struct DesktopGateway;

impl NotificationGateway for DesktopGateway {
    fn send(&self, target: &str, title: &str, body: &str) -> Result<(), AppError> {
        debug!(target_id = target, "showing toast notification");
        Toast::new(Toast::POWERSHELL_APP_ID)
            .title(title)
            .text1(body)
            .show()
            .map_err(|err| AppError::io(err.to_string()))
    }
}
