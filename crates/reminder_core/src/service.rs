use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    clock::{Clock, SystemClock},
    dedup::{NotificationLedger, LEDGER_SETTINGS_KEY},
    error::ScanError,
    host::{BlockSource, MemorySettings, SettingsStore},
    notifications::{BannerSink, DesktopNotifier, NotificationDispatcher, Severity},
    scanner::{ReminderRecord, ReminderScanner, ScanOptions},
    settings::{DedupStorage, ReminderSettings, SettingsDiff},
};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("a block source is required")]
    MissingBlockSource,
    #[error("a banner sink is required")]
    MissingBannerSink,
}

/// Owns the candidate list, the notification ledger and the collaborators
/// that feed them. Timers live in [`crate::scheduler::ReminderScheduler`].
pub struct ReminderService {
    scanner: ReminderScanner,
    dispatcher: NotificationDispatcher,
    settings_store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    settings: RwLock<ReminderSettings>,
    reminders: RwLock<Arc<Vec<ReminderRecord>>>,
    ledger: Mutex<NotificationLedger>,
    tick_guard: tokio::sync::Mutex<()>,
}

pub struct ReminderServiceBuilder {
    block_source: Option<Arc<dyn BlockSource>>,
    banner_sink: Option<Arc<dyn BannerSink>>,
    desktop_notifier: Option<Arc<dyn DesktopNotifier>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    settings: ReminderSettings,
}

impl ReminderServiceBuilder {
    pub fn new() -> Self {
        Self {
            block_source: None,
            banner_sink: None,
            desktop_notifier: None,
            settings_store: None,
            clock: None,
            settings: ReminderSettings::default(),
        }
    }

    pub fn with_block_source(mut self, source: Arc<dyn BlockSource>) -> Self {
        self.block_source = Some(source);
        self
    }

    pub fn with_banner_sink(mut self, sink: Arc<dyn BannerSink>) -> Self {
        self.banner_sink = Some(sink);
        self
    }

    pub fn with_desktop_notifier(mut self, notifier: Arc<dyn DesktopNotifier>) -> Self {
        self.desktop_notifier = Some(notifier);
        self
    }

    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Initial settings; replaced by the store's values on [`ReminderService::load_settings`].
    pub fn with_settings(mut self, settings: ReminderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<ReminderService, BuildError> {
        let source = self.block_source.ok_or(BuildError::MissingBlockSource)?;
        let banner = self.banner_sink.ok_or(BuildError::MissingBannerSink)?;
        Ok(ReminderService {
            scanner: ReminderScanner::new(source),
            dispatcher: NotificationDispatcher::new(banner, self.desktop_notifier),
            settings_store: self
                .settings_store
                .unwrap_or_else(|| Arc::new(MemorySettings::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            settings: RwLock::new(self.settings),
            reminders: RwLock::new(Arc::new(Vec::new())),
            ledger: Mutex::new(NotificationLedger::new()),
            tick_guard: tokio::sync::Mutex::new(()),
        })
    }
}

impl Default for ReminderServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderService {
    pub fn builder() -> ReminderServiceBuilder {
        ReminderServiceBuilder::new()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> ReminderSettings {
        self.settings.read().clone()
    }

    /// Current candidate list. The returned snapshot never changes underneath the caller.
    pub fn reminders(&self) -> Arc<Vec<ReminderRecord>> {
        Arc::clone(&*self.reminders.read())
    }

    pub fn ledger(&self) -> NotificationLedger {
        self.ledger.lock().clone()
    }

    /// Reads settings (and, when persisted, the ledger) from the settings store.
    /// A store failure keeps the current values.
    #[instrument(skip(self))]
    pub async fn load_settings(&self) -> ReminderSettings {
        let snapshot = match self.settings_store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "could not read settings; keeping current values");
                return self.settings();
            }
        };
        let settings = ReminderSettings::from_value(&snapshot);
        if settings.dedup_storage == DedupStorage::Persisted {
            let persisted = snapshot
                .get(LEDGER_SETTINGS_KEY)
                .map(NotificationLedger::from_value)
                .unwrap_or_default();
            debug!(entries = persisted.len(), "restored notification ledger");
            *self.ledger.lock() = persisted;
        }
        *self.settings.write() = settings.clone();
        settings
    }

    /// Swaps in new settings and reports which timers depend on the change.
    pub async fn apply_settings(&self, new: ReminderSettings) -> SettingsDiff {
        let old = std::mem::replace(&mut *self.settings.write(), new.clone());
        if old.dedup_storage != new.dedup_storage && new.dedup_storage == DedupStorage::Persisted {
            self.persist_ledger().await;
        }
        SettingsDiff::between(&old, &new)
    }

    /// Replaces the candidate list with a fresh scan. On failure the previous
    /// list stays in place.
    #[instrument(skip(self))]
    pub async fn rescan(&self) -> Result<usize, ScanError> {
        let settings = self.settings();
        let options = ScanOptions {
            horizon: settings.horizon,
            all_day_hour: settings.all_day_hour(),
        };
        let now = self.clock.now();
        match self.scanner.scan(now, options).await {
            Ok(reminders) => {
                let count = reminders.len();
                for reminder in &reminders {
                    debug!(
                        id = %reminder.id,
                        when = %reminder.when,
                        container = %reminder.container_name,
                        "upcoming reminder"
                    );
                }
                *self.reminders.write() = Arc::new(reminders);
                info!(count, "found upcoming reminders");
                Ok(count)
            }
            Err(err) => {
                warn!(%err, "reminder scan failed; keeping previous list");
                Err(err)
            }
        }
    }

    /// Dispatches every due, not-yet-sent reminder once. Returns the number
    /// dispatched. A tick that overlaps a running one does nothing.
    #[instrument(skip(self))]
    pub async fn check_due(&self) -> usize {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            debug!("previous due check still running; skipping tick");
            return 0;
        };

        let reminders = self.reminders();
        let settings = self.settings();
        let policy = settings.due_policy();
        let now = self.clock.now();
        if reminders.is_empty() {
            debug!("no upcoming reminders");
        }

        let mut dispatched = 0;
        for reminder in reminders.iter() {
            for &lead in &settings.lead_time_minutes {
                if !policy.should_notify(reminder.when, lead, now) {
                    continue;
                }
                let key = settings.key_policy.key(&reminder.id, reminder.when, lead);
                let already_sent = self.ledger.lock().has_fired(&key);
                if already_sent {
                    continue;
                }

                let report = self.dispatcher.dispatch(reminder, lead, now).await;
                if !report.delivered_any() {
                    warn!(%key, "no sink accepted the notification; will retry");
                    continue;
                }
                self.ledger.lock().mark_fired(key.clone(), self.clock.now());
                dispatched += 1;
                info!(%key, id = %reminder.id, lead, "notification sent");
            }
        }

        if dispatched > 0 && settings.dedup_storage == DedupStorage::Persisted {
            self.persist_ledger().await;
        }
        dispatched
    }

    /// Removes ledger entries older than the retention window.
    pub async fn prune_ledger(&self) -> usize {
        let settings = self.settings();
        let removed = self
            .ledger
            .lock()
            .prune(self.clock.now(), settings.retention());
        if removed > 0 {
            info!(removed, "pruned old notification records");
            if settings.dedup_storage == DedupStorage::Persisted {
                self.persist_ledger().await;
            }
        }
        removed
    }

    /// Shows a one-off banner, logging rather than returning failures.
    pub async fn announce(&self, message: &str, severity: Severity) {
        if let Err(err) = self.dispatcher.banner().show(message, severity, None).await {
            warn!(%err, message, "banner announcement failed");
        }
    }

    async fn persist_ledger(&self) {
        let value = self.ledger.lock().to_value();
        if let Err(err) = self
            .settings_store
            .set(json!({ LEDGER_SETTINGS_KEY: value }))
            .await
        {
            warn!(%err, "could not persist notification ledger");
        }
    }
}
