//! Timer wiring around [`ReminderService`].
//!
//! Three independent timers drive the service: the due check, the periodic
//! rescan (which also prunes the ledger) and the daily rescan. Each one owns a
//! [`CancellationToken`]; re-arming a timer cancels its predecessor first, so
//! timers never accumulate. Cancellation is only observed between ticks, never
//! in the middle of a due check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::host::{CommandKind, CommandRegistry, CommandSpec};
use crate::notifications::Severity;
use crate::service::ReminderService;
use crate::settings::{ReminderSettings, SettingsDiff};

pub const RESCAN_SLASH_COMMAND: &str = "reminders: rescan";
pub const RESCAN_PALETTE_COMMAND: &str = "rescan-reminders";
pub const RESCAN_KEYBINDING: &str = "mod+shift+r";
pub const RESCANNED_MESSAGE: &str = "Reminders rescanned!";
pub const RESCAN_FAILED_MESSAGE: &str = "Reminder rescan failed";
/// Longest period a repeating timer accepts.
pub const MAX_TIMER_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    DueCheck,
    PeriodicRescan,
    DailyRescan,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [Self::DueCheck, Self::PeriodicRescan, Self::DailyRescan];
}

struct TimerHandle {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl TimerHandle {
    fn cancel(self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct Timers {
    due_check: Option<TimerHandle>,
    periodic_rescan: Option<TimerHandle>,
    daily_rescan: Option<TimerHandle>,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<TimerHandle> {
        match kind {
            TimerKind::DueCheck => &mut self.due_check,
            TimerKind::PeriodicRescan => &mut self.periodic_rescan,
            TimerKind::DailyRescan => &mut self.daily_rescan,
        }
    }
}

pub struct ReminderScheduler {
    service: Arc<ReminderService>,
    commands: Option<Arc<dyn CommandRegistry>>,
    timers: Mutex<Timers>,
}

impl ReminderScheduler {
    pub fn new(service: Arc<ReminderService>) -> Self {
        Self {
            service,
            commands: None,
            timers: Mutex::new(Timers::default()),
        }
    }

    pub fn with_command_registry(mut self, registry: Arc<dyn CommandRegistry>) -> Self {
        self.commands = Some(registry);
        self
    }

    pub fn service(&self) -> &Arc<ReminderService> {
        &self.service
    }

    /// Host "ready": load settings, ask for notification permission, register
    /// commands, run the initial scan and arm every timer.
    pub async fn start(&self) {
        let settings = self.service.load_settings().await;
        self.service
            .dispatcher()
            .request_permission_if_undecided()
            .await;
        self.register_commands();
        // Failure is logged by the service; timers still start so a later scan can recover.
        let _ = self.service.rescan().await;
        for kind in TimerKind::ALL {
            self.arm(kind, &settings);
        }
        info!(
            poll_interval_seconds = settings.poll_interval_seconds,
            daily_rescan_hour = settings.daily_rescan_hour,
            "reminder scheduler started"
        );
    }

    /// Host "before unload": cancel all timers.
    pub fn stop(&self) {
        let mut timers = self.timers.lock();
        for kind in TimerKind::ALL {
            if let Some(handle) = timers.slot(kind).take() {
                handle.cancel();
            }
        }
        info!("reminder scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        TimerKind::ALL.into_iter().any(|kind| self.is_armed(kind))
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.timers.lock().slot(kind).is_some()
    }

    /// Host settings-change callback. Recreates only the timers whose
    /// configuration changed, and only while the scheduler is running.
    pub async fn apply_settings(&self, new: &Value, old: &Value) -> SettingsDiff {
        let new_settings = ReminderSettings::from_value(new);
        let old_settings = ReminderSettings::from_value(old);
        let diff = SettingsDiff::between(&old_settings, &new_settings);
        self.service.apply_settings(new_settings.clone()).await;
        info!(?diff, "settings changed");

        if self.is_running() {
            if diff.due_check {
                self.arm(TimerKind::DueCheck, &new_settings);
            }
            if diff.periodic_rescan {
                self.arm(TimerKind::PeriodicRescan, &new_settings);
            }
            if diff.daily_rescan {
                self.arm(TimerKind::DailyRescan, &new_settings);
            }
        }
        diff
    }

    /// Runs a registered command by key. Returns `false` for unknown keys.
    pub async fn run_command(&self, key: &str) -> bool {
        match key {
            RESCAN_SLASH_COMMAND | RESCAN_PALETTE_COMMAND => {
                info!(command = key, "manual rescan triggered");
                match self.service.rescan().await {
                    Ok(_) => {
                        self.service
                            .announce(RESCANNED_MESSAGE, Severity::Success)
                            .await
                    }
                    Err(_) => {
                        self.service
                            .announce(RESCAN_FAILED_MESSAGE, Severity::Warning)
                            .await
                    }
                }
                true
            }
            other => {
                warn!(command = other, "unknown command");
                false
            }
        }
    }

    fn register_commands(&self) {
        let Some(registry) = &self.commands else {
            return;
        };
        let specs = [
            CommandSpec {
                key: RESCAN_SLASH_COMMAND.to_string(),
                label: RESCAN_SLASH_COMMAND.to_string(),
                kind: CommandKind::Slash,
                keybinding: None,
            },
            CommandSpec {
                key: RESCAN_PALETTE_COMMAND.to_string(),
                label: "Rescan for scheduled reminders".to_string(),
                kind: CommandKind::Palette,
                keybinding: Some(RESCAN_KEYBINDING.to_string()),
            },
        ];
        for spec in specs {
            if let Err(err) = registry.register(spec) {
                warn!(%err, "command registration failed");
            }
        }
    }

    fn arm(&self, kind: TimerKind, settings: &ReminderSettings) {
        let cancel = CancellationToken::new();
        let service = Arc::clone(&self.service);
        let task = match kind {
            TimerKind::DueCheck => spawn_repeating(
                kind,
                settings.poll_interval(),
                cancel.clone(),
                move || {
                    let service = Arc::clone(&service);
                    async move {
                        service.check_due().await;
                    }
                },
            ),
            TimerKind::PeriodicRescan => spawn_repeating(
                kind,
                settings.periodic_rescan_interval(),
                cancel.clone(),
                move || {
                    let service = Arc::clone(&service);
                    async move {
                        let _ = service.rescan().await;
                        service.prune_ledger().await;
                    }
                },
            ),
            TimerKind::DailyRescan => {
                spawn_daily_rescan(service, settings.daily_rescan_hour, cancel.clone())
            }
        };

        let previous = self.timers.lock().slot(kind).replace(TimerHandle {
            cancel,
            _task: task,
        });
        if let Some(previous) = previous {
            previous.cancel();
        }
        debug!(?kind, "timer armed");
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        let mut timers = self.timers.lock();
        for kind in TimerKind::ALL {
            if let Some(handle) = timers.slot(kind).take() {
                handle.cancel();
            }
        }
    }
}

fn spawn_repeating<F, Fut>(
    kind: TimerKind,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let period = period.clamp(Duration::from_secs(1), MAX_TIMER_PERIOD);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tick().await;
        }
        debug!(?kind, "timer cancelled");
    })
}

fn spawn_daily_rescan(
    service: Arc<ReminderService>,
    hour: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = service.clock().now();
            let next = next_daily_rescan(now, hour);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(%next, "daily rescan scheduled");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            info!("daily rescan triggered");
            let _ = service.rescan().await;
            service.prune_ledger().await;
        }
        debug!(kind = ?TimerKind::DailyRescan, "timer cancelled");
    })
}

/// Next `hour:00` strictly after `now`.
pub fn next_daily_rescan(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date().and_time(time);
    if today <= now {
        today + ChronoDuration::days(1)
    } else {
        today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn daily_rescan_lands_later_today_when_possible() {
        assert_eq!(next_daily_rescan(at(14, 1, 30), 3), at(14, 3, 0));
    }

    #[test]
    fn daily_rescan_rolls_to_tomorrow_once_passed() {
        assert_eq!(next_daily_rescan(at(14, 3, 0), 3), at(15, 3, 0));
        assert_eq!(next_daily_rescan(at(14, 9, 0), 3), at(15, 3, 0));
    }

    #[test]
    fn daily_rescan_crosses_month_boundary() {
        let expected = NaiveDate::from_ymd_opt(2025, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(next_daily_rescan(at(31, 23, 59), 0), expected);
    }

    #[test]
    fn out_of_range_hour_is_clamped() {
        assert_eq!(next_daily_rescan(at(14, 1, 0), 99), at(14, 23, 0));
    }
}
