mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{at, block, Harness, RecordingCommands};
use reminder_core::scheduler::{
    RESCANNED_MESSAGE, RESCAN_KEYBINDING, RESCAN_PALETTE_COMMAND, RESCAN_SLASH_COMMAND,
};
use reminder_core::{CommandKind, ReminderScheduler, Severity, TimerKind};
use serde_json::json;

const DENTIST: &str = "- Call the dentist SCHEDULED: <2025-10-14 Tue 14:30>";

fn scheduler(harness: &Harness) -> (ReminderScheduler, Arc<RecordingCommands>) {
    let commands = Arc::new(RecordingCommands::default());
    let scheduler =
        ReminderScheduler::new(harness.service.clone()).with_command_registry(commands.clone());
    (scheduler, commands)
}

#[tokio::test(start_paused = true)]
async fn start_registers_commands_and_arms_timers() {
    let harness = Harness::new(vec![block("b1", DENTIST)], json!({}), at(14, 9, 0));
    let (scheduler, commands) = scheduler(&harness);
    assert!(!scheduler.is_running());

    scheduler.start().await;
    assert!(scheduler.is_running());
    for kind in TimerKind::ALL {
        assert!(scheduler.is_armed(kind), "{kind:?} should be armed");
    }
    assert_eq!(harness.service.reminders().len(), 1, "initial scan ran");

    let registered = commands.registered.lock();
    assert_eq!(registered.len(), 2);
    assert_eq!(registered[0].key, RESCAN_SLASH_COMMAND);
    assert_eq!(registered[0].kind, CommandKind::Slash);
    assert_eq!(registered[1].key, RESCAN_PALETTE_COMMAND);
    assert_eq!(registered[1].keybinding.as_deref(), Some(RESCAN_KEYBINDING));
    drop(registered);

    scheduler.stop();
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn due_check_timer_sends_when_time_arrives() {
    let harness = Harness::new(vec![block("b1", DENTIST)], json!({}), at(14, 14, 29));
    let (scheduler, _) = scheduler(&harness);
    scheduler.start().await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(harness.banner.messages().is_empty());

    harness.clock.set(at(14, 14, 30));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.banner.messages().len(), 1);

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(harness.banner.messages().len(), 1);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn stopped_scheduler_sends_nothing() {
    let harness = Harness::new(vec![block("b1", DENTIST)], json!({}), at(14, 14, 30));
    let (scheduler, _) = scheduler(&harness);
    scheduler.start().await;
    scheduler.stop();

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(harness.banner.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn periodic_rescan_picks_up_new_blocks() {
    let harness = Harness::new(Vec::new(), json!({}), at(14, 9, 0));
    let (scheduler, _) = scheduler(&harness);
    scheduler.start().await;
    assert!(harness.service.reminders().is_empty());

    harness.blocks.push(block("b1", DENTIST));
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(harness.service.reminders().len(), 1);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn daily_rescan_runs_at_configured_hour_and_rearms() {
    let harness = Harness::new(
        Vec::new(),
        json!({ "periodicRescanMinutes": 10_080, "dailyRescanHour": 3 }),
        at(14, 2, 59),
    );
    let (scheduler, _) = scheduler(&harness);
    scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(harness.service.reminders().is_empty());

    harness.blocks.push(block("b1", DENTIST));
    harness.clock.set(at(14, 3, 0));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(harness.service.reminders().len(), 1);

    // Re-armed from the clock at fire time: next run is 03:00 the day after.
    harness.blocks.push(block(
        "b2",
        "- Renew passport SCHEDULED: <2025-10-15 Wed 10:00>",
    ));
    harness.clock.set(at(15, 2, 59));
    tokio::time::sleep(Duration::from_secs(86_300)).await;
    let ids: Vec<_> = harness
        .service
        .reminders()
        .iter()
        .map(|reminder| reminder.id.clone())
        .collect();
    assert_eq!(ids, vec!["b1".to_string()]);

    harness.clock.set(at(15, 3, 0));
    tokio::time::sleep(Duration::from_secs(120)).await;
    let ids: Vec<_> = harness
        .service
        .reminders()
        .iter()
        .map(|reminder| reminder.id.clone())
        .collect();
    assert_eq!(ids, vec!["b2".to_string()]);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn oversized_poll_interval_keeps_due_check_alive() {
    let harness = Harness::new(
        vec![block("b1", DENTIST)],
        json!({ "pollIntervalSeconds": u64::MAX }),
        at(14, 14, 30),
    );
    let (scheduler, _) = scheduler(&harness);
    scheduler.start().await;
    assert_eq!(harness.service.settings().poll_interval_seconds, 30);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(harness.banner.messages().len(), 1);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn settings_change_restarts_only_affected_timer() {
    let harness = Harness::new(vec![block("b1", DENTIST)], json!({}), at(14, 14, 29));
    let (scheduler, _) = scheduler(&harness);
    scheduler.start().await;

    let old = json!({});
    let new = json!({ "pollIntervalSeconds": 5 });
    let diff = scheduler.apply_settings(&new, &old).await;
    assert!(diff.due_check);
    assert!(!diff.periodic_rescan);
    assert!(!diff.daily_rescan);
    assert_eq!(harness.service.settings().poll_interval_seconds, 5);

    harness.clock.set(at(14, 14, 30));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(harness.banner.messages().len(), 1, "new 5s interval in effect");

    let unchanged = scheduler.apply_settings(&new, &new).await;
    assert!(unchanged.is_empty());
    assert!(scheduler.is_running());
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn settings_change_while_stopped_arms_nothing() {
    let harness = Harness::new(Vec::new(), json!({}), at(14, 9, 0));
    let (scheduler, _) = scheduler(&harness);
    scheduler
        .apply_settings(&json!({ "pollIntervalSeconds": 5 }), &json!({}))
        .await;
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn rescan_command_rescans_and_confirms() {
    let harness = Harness::new(Vec::new(), json!({}), at(14, 9, 0));
    let (scheduler, _) = scheduler(&harness);
    scheduler.start().await;

    harness.blocks.push(block("b1", DENTIST));
    assert!(scheduler.run_command(RESCAN_PALETTE_COMMAND).await);
    assert_eq!(harness.service.reminders().len(), 1);
    let shown = harness.banner.shown.lock().clone();
    assert_eq!(
        shown,
        vec![(RESCANNED_MESSAGE.to_string(), Severity::Success)]
    );

    assert!(scheduler.run_command(RESCAN_SLASH_COMMAND).await);
    assert!(!scheduler.run_command("unknown").await);
    scheduler.stop();
}
