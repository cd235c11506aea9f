use crate::error::AppError;
use std::sync::Arc;
use tracing::info;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::DesktopGateway;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::DesktopGateway;

const DISABLE_ENV_VAR: &str = "PETCARE_DISABLE_NOTIFICATIONS";

/// Delivers a push message to a registered device target.
pub trait NotificationGateway: Send + Sync {
    fn send(&self, target: &str, title: &str, body: &str) -> Result<(), AppError>;
}

/// Records deliveries in the log instead of showing them.
pub struct LogGateway;

impl NotificationGateway for LogGateway {
    fn send(&self, target: &str, title: &str, body: &str) -> Result<(), AppError> {
        info!(target_id = target, title, body, "notification delivered to log");
        Ok(())
    }
}

pub fn gateway_from_env(enabled: bool) -> Arc<dyn NotificationGateway> {
    if !enabled || std::env::var(DISABLE_ENV_VAR).is_ok() {
        return Arc::new(LogGateway);
    }

    match platform_gateway() {
        Ok(gateway) => gateway,
        Err(err) => {
            info!(error = %err, "desktop notifications unavailable, logging instead");
            Arc::new(LogGateway)
        }
    }
}

#[cfg(any(target_os = "linux", windows))]
pub fn platform_gateway() -> Result<Arc<dyn NotificationGateway>, AppError> {
    Ok(Arc::new(DesktopGateway))
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_gateway() -> Result<Arc<dyn NotificationGateway>, AppError> {
    Err(AppError::invalid_data(
        "notifications are not supported on this platform",
    ))
}
