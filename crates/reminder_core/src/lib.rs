//! Scheduled-reminder engine for block-structured notes.
//!
//! [`ReminderService`] scans the host for scheduled blocks and dispatches
//! notifications once per key; [`ReminderScheduler`] drives it with timers.
//! Everything host-specific sits behind the traits in [`host`] and
//! [`notifications`].

pub mod clock;
pub mod dedup;
pub mod due;
pub mod error;
pub mod host;
pub mod notifications;
pub mod scanner;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod time;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::dedup::{KeyPolicy, NotificationKey, NotificationLedger};
pub use crate::error::{DispatchError, HostError, ScanError};
pub use crate::host::{
    BlockQuery, BlockRecord, BlockSource, CommandKind, CommandRegistry, CommandSpec,
    MemorySettings, SettingsStore,
};
pub use crate::notifications::{
    BannerOptions, BannerSink, DesktopNotification, DesktopNotifier, NotificationDispatcher,
    NotificationPermission, Severity,
};
pub use crate::scanner::{HorizonPolicy, ReminderRecord, ReminderScanner, ScanOptions};
pub use crate::scheduler::{ReminderScheduler, TimerKind};
pub use crate::service::{BuildError, ReminderService, ReminderServiceBuilder};
pub use crate::settings::{DedupStorage, ReminderSettings, SettingsDiff};
