use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reminder_core::{ReminderScheduler, ReminderService, ReminderSettings, SettingsStore};
use serde_json::Value;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::commands::ConsoleCommands;
use crate::config::{AppConfig, ResolvedPaths};
use crate::notes::NotesDirectory;
use crate::settings_file::JsonFileSettings;
use crate::sinks::{ConsoleBanner, NotifySend};
use crate::watch::{spawn_watcher, Change};

/// Quiet period after the last notes change before rescanning.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(750);

pub struct Daemon {
    scheduler: ReminderScheduler,
    store: Arc<JsonFileSettings>,
    commands: Arc<ConsoleCommands>,
    applied: Value,
}

impl Daemon {
    pub async fn new(paths: &ResolvedPaths) -> Result<Self> {
        let store = Arc::new(JsonFileSettings::new(&paths.settings));
        let commands = Arc::new(ConsoleCommands::new());
        let service = ReminderService::builder()
            .with_block_source(Arc::new(NotesDirectory::new(&paths.notes_root)))
            .with_banner_sink(Arc::new(ConsoleBanner))
            .with_desktop_notifier(Arc::new(NotifySend::detect()))
            .with_settings_store(store.clone())
            .build()
            .context("unable to assemble reminder service")?;
        let scheduler =
            ReminderScheduler::new(Arc::new(service)).with_command_registry(commands.clone());
        let applied = store.snapshot().await.unwrap_or_else(|err| {
            warn!(%err, "settings file unreadable; starting from defaults");
            Value::Null
        });
        Ok(Self {
            scheduler,
            store,
            commands,
            applied,
        })
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn commands(&self) -> &Arc<ConsoleCommands> {
        &self.commands
    }

    /// Re-reads the settings file and hands real changes to the scheduler.
    /// Ledger-only writes leave the typed settings unchanged and are skipped.
    pub async fn reload_settings(&mut self) -> bool {
        let fresh = match self.store.snapshot().await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(%err, "settings file unreadable; keeping current settings");
                return false;
            }
        };
        if ReminderSettings::from_value(&fresh) == ReminderSettings::from_value(&self.applied) {
            debug!("settings file changed without affecting reminder settings");
            return false;
        }
        self.scheduler.apply_settings(&fresh, &self.applied).await;
        self.applied = fresh;
        true
    }
}

pub async fn run(config: AppConfig) -> Result<()> {
    let paths = config.resolve()?;
    let mut daemon = Daemon::new(&paths).await?;
    daemon.scheduler.start().await;

    let (change_tx, mut change_rx) = mpsc::unbounded_channel();
    let _watcher = if config.watch {
        Some(spawn_watcher(&paths, change_tx.clone())?)
    } else {
        info!("filesystem watching disabled");
        None
    };

    let (command_tx, mut command_rx) = mpsc::channel(16);
    let console = Arc::clone(&daemon.commands);
    tokio::spawn(async move {
        console
            .forward(BufReader::new(tokio::io::stdin()), command_tx)
            .await;
    });

    println!(
        "reminderd watching {} (type `rescan`, Ctrl-C to quit)",
        paths.notes_root.display()
    );
    let mut console_open = true;
    let mut rescan_at: Option<Instant> = None;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(%err, "unable to listen for Ctrl-C");
                }
                info!("shutting down");
                break;
            }
            command = command_rx.recv(), if console_open => match command {
                Some(key) => {
                    daemon.scheduler.run_command(&key).await;
                }
                None => console_open = false,
            },
            Some(change) = change_rx.recv() => match change {
                Change::Notes => rescan_at = Some(Instant::now() + WATCH_DEBOUNCE),
                Change::Settings => {
                    daemon.reload_settings().await;
                }
            },
            _ = tokio::time::sleep_until(rescan_at.unwrap_or_else(Instant::now)),
                if rescan_at.is_some() =>
            {
                rescan_at = None;
                info!("notes changed; rescanning");
                let _ = daemon.scheduler.service().rescan().await;
            }
        }
    }

    daemon.scheduler.stop();
    drop(change_tx);
    Ok(())
}
