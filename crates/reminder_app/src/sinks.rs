use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use reminder_core::{
    BannerOptions, BannerSink, DesktopNotification, DesktopNotifier, HostError,
    NotificationPermission, Severity,
};
use tracing::{debug, info};

const NOTIFY_SEND: &str = "notify-send";
const APP_NAME: &str = "reminderd";

/// Prints banners to stdout and mirrors them in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleBanner;

#[async_trait]
impl BannerSink for ConsoleBanner {
    async fn show(
        &self,
        message: &str,
        severity: Severity,
        options: Option<BannerOptions>,
    ) -> Result<(), HostError> {
        let label = severity_label(severity);
        info!(severity = label, timeout = ?options.map(|o| o.timeout), "{message}");
        println!("[{label}] {message}");
        Ok(())
    }
}

pub fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "success",
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

/// Desktop notifications through `notify-send`. Without the program on
/// `PATH` permission is permanently denied.
#[derive(Debug, Clone)]
pub struct NotifySend {
    program: Option<PathBuf>,
}

impl NotifySend {
    pub fn detect() -> Self {
        Self::found(which::which(NOTIFY_SEND).ok())
    }

    /// Looks for `notify-send` in `search_path` instead of `PATH`.
    pub fn detect_in(search_path: impl AsRef<OsStr>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::found(which::which_in(NOTIFY_SEND, Some(search_path), cwd).ok())
    }

    fn found(program: Option<PathBuf>) -> Self {
        match &program {
            Some(path) => debug!(path = %path.display(), "found notify-send"),
            None => info!("notify-send not found; desktop notifications disabled"),
        }
        Self { program }
    }

    pub fn with_program(program: Option<PathBuf>) -> Self {
        Self { program }
    }
}

#[async_trait]
impl DesktopNotifier for NotifySend {
    fn permission(&self) -> NotificationPermission {
        if self.program.is_some() {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Denied
        }
    }

    async fn request_permission(&self) -> Result<NotificationPermission, HostError> {
        Ok(self.permission())
    }

    async fn show(&self, notification: DesktopNotification) -> Result<(), HostError> {
        let Some(program) = &self.program else {
            return Err(HostError::Unavailable("notify-send is not installed".into()));
        };
        let status = tokio::process::Command::new(program)
            .args(notify_send_args(&notification))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(HostError::Rejected(format!("notify-send exited with {status}")))
        }
    }
}

/// Arguments for one notification. The tag maps to a synchronous hint so a
/// repeated tag replaces the earlier popup.
pub fn notify_send_args(notification: &DesktopNotification) -> Vec<String> {
    vec![
        "-a".to_string(),
        APP_NAME.to_string(),
        "-t".to_string(),
        notification.auto_dismiss.as_millis().to_string(),
        "-h".to_string(),
        format!("string:x-canonical-private-synchronous:{}", notification.tag),
        notification.title.clone(),
        notification.body.clone(),
    ]
}
