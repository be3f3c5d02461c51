use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, HostError};
use crate::scanner::ReminderRecord;
use crate::time::format_for_notification;

pub const TITLE_PREFIX: &str = "📅 Reminder";
pub const BANNER_TIMEOUT: Duration = Duration::from_millis(8_000);
pub const DESKTOP_AUTO_DISMISS: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BannerOptions {
    pub timeout: Duration,
}

/// In-host banner surface.
#[async_trait]
pub trait BannerSink: Send + Sync {
    async fn show(
        &self,
        message: &str,
        severity: Severity,
        options: Option<BannerOptions>,
    ) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Not decided yet; may be requested.
    Default,
    /// The platform has no notification surface.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub auto_dismiss: Duration,
}

/// OS-level notification surface.
#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    async fn request_permission(&self) -> Result<NotificationPermission, HostError>;

    async fn show(&self, notification: DesktopNotification) -> Result<(), HostError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
}

pub fn compose_message(
    reminder: &ReminderRecord,
    lead_minutes: u32,
    now: NaiveDateTime,
) -> NotificationMessage {
    let when = format_for_notification(reminder.when, now);
    let schedule_line = if lead_minutes > 0 {
        format!("🕐 Scheduled for: {when} (in {lead_minutes} minutes)")
    } else {
        format!("🎯 Scheduled for: {when}")
    };
    NotificationMessage {
        title: format!("{TITLE_PREFIX}: {}", reminder.container_name),
        body: format!("{}\n\n{schedule_line}", reminder.display_text),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    SentWithFallback,
    Skipped,
    Failed,
}

impl Delivery {
    pub fn delivered(&self) -> bool {
        matches!(self, Self::Sent | Self::SentWithFallback)
    }
}

#[derive(Debug)]
pub struct DispatchReport {
    pub banner: Delivery,
    pub desktop: Delivery,
    pub errors: Vec<DispatchError>,
}

impl DispatchReport {
    pub fn delivered_any(&self) -> bool {
        self.banner.delivered() || self.desktop.delivered()
    }
}

/// Fans a reminder out to the banner and desktop sinks. Never fails: every
/// sink error is logged and recorded in the [`DispatchReport`].
pub struct NotificationDispatcher {
    banner: Arc<dyn BannerSink>,
    desktop: Option<Arc<dyn DesktopNotifier>>,
}

impl NotificationDispatcher {
    pub fn new(banner: Arc<dyn BannerSink>, desktop: Option<Arc<dyn DesktopNotifier>>) -> Self {
        Self { banner, desktop }
    }

    pub fn banner(&self) -> &Arc<dyn BannerSink> {
        &self.banner
    }

    /// Asks for OS permission once if the user has not decided yet.
    pub async fn request_permission_if_undecided(&self) {
        let Some(desktop) = &self.desktop else {
            debug!("no desktop notifier configured");
            return;
        };
        match desktop.permission() {
            NotificationPermission::Default => match desktop.request_permission().await {
                Ok(permission) => info!(?permission, "desktop notification permission"),
                Err(err) => warn!(%err, "could not request desktop notification permission"),
            },
            NotificationPermission::Unavailable => warn!("desktop notifications unavailable"),
            permission => debug!(?permission, "desktop notification permission"),
        }
    }

    pub async fn dispatch(
        &self,
        reminder: &ReminderRecord,
        lead_minutes: u32,
        now: NaiveDateTime,
    ) -> DispatchReport {
        let message = compose_message(reminder, lead_minutes, now);
        let mut errors = Vec::new();

        let banner = self.send_banner(&message.body, &mut errors).await;
        let desktop = self
            .send_desktop(reminder, lead_minutes, &message, &mut errors)
            .await;

        DispatchReport {
            banner,
            desktop,
            errors,
        }
    }

    async fn send_banner(&self, body: &str, errors: &mut Vec<DispatchError>) -> Delivery {
        let options = BannerOptions {
            timeout: BANNER_TIMEOUT,
        };
        let Err(err) = self.banner.show(body, Severity::Info, Some(options)).await else {
            return Delivery::Sent;
        };
        warn!(%err, "banner notification failed; retrying with plain call");
        errors.push(DispatchError::Banner(err));

        match self.banner.show(body, Severity::Info, None).await {
            Ok(()) => Delivery::SentWithFallback,
            Err(err) => {
                warn!(%err, "banner fallback failed");
                errors.push(DispatchError::Banner(err));
                Delivery::Failed
            }
        }
    }

    async fn send_desktop(
        &self,
        reminder: &ReminderRecord,
        lead_minutes: u32,
        message: &NotificationMessage,
        errors: &mut Vec<DispatchError>,
    ) -> Delivery {
        let Some(desktop) = &self.desktop else {
            return Delivery::Skipped;
        };
        let permission = desktop.permission();
        if permission != NotificationPermission::Granted {
            debug!(?permission, "desktop notification not permitted");
            return Delivery::Skipped;
        }

        let notification = DesktopNotification {
            title: message.title.clone(),
            body: message.body.clone(),
            tag: format!("{}_{lead_minutes}", reminder.id),
            auto_dismiss: DESKTOP_AUTO_DISMISS,
        };
        match desktop.show(notification).await {
            Ok(()) => Delivery::Sent,
            Err(err) => {
                warn!(%err, "desktop notification failed");
                errors.push(DispatchError::Desktop(err));
                Delivery::Failed
            }
        }
    }
}
