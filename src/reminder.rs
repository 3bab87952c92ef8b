use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::models::{
    last_activity_timestamp, Frequency, FrequencyUnit, Task, TaskLog, TaskType, Timestamp,
};
use crate::state::AppState;
use crate::storage::Storage;

pub const REMINDER_TICK_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    Default,
}

/// The host's notification surface as seen by the scheduler.
pub trait ReminderNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;
    fn notify(&self, task: &Task) -> Result<(), String>;
}

/// Tag for a task's notifications, letting the host collapse duplicate
/// pending notifications for the same task.
pub fn notification_tag(task_id: &str) -> String {
    format!("task-{task_id}")
}

pub fn unit_millis(unit: FrequencyUnit) -> i64 {
    match unit {
        FrequencyUnit::Minute => 60 * 1_000,
        FrequencyUnit::Hour => 60 * 60 * 1_000,
        FrequencyUnit::Day => 24 * 60 * 60 * 1_000,
        FrequencyUnit::Week => 7 * 24 * 60 * 60 * 1_000,
        // 30-day month, 365-day year approximations.
        FrequencyUnit::Month => 30 * 24 * 60 * 60 * 1_000,
        FrequencyUnit::Year => 365 * 24 * 60 * 60 * 1_000,
    }
}

/// A habit without a stored frequency still gets reminded, at the default
/// cadence of once a day.
fn frequency_millis(frequency: Option<Frequency>) -> i64 {
    let frequency = frequency.unwrap_or(Frequency {
        value: 1,
        unit: FrequencyUnit::Day,
    });
    i64::from(frequency.value.max(1)) * unit_millis(frequency.unit)
}

/// The reminder predicate, evaluated over fresh collections every tick.
/// A task fires when both clocks have run past the configured frequency:
/// time since the last logged activity (or creation) and time since the
/// last reminder. The second clock reads as elapsed-forever until the
/// first fire.
pub fn due_reminders(
    now: Timestamp,
    tasks: &[Task],
    logs: &[TaskLog],
    global_enabled: bool,
    permission: NotificationPermission,
) -> Vec<Task> {
    if !global_enabled || permission != NotificationPermission::Granted {
        return Vec::new();
    }

    tasks
        .iter()
        .filter(|task| {
            if task.kind != TaskType::Habit || !task.notification_enabled || task.is_completed {
                return false;
            }
            let freq_ms = frequency_millis(task.frequency);
            let time_since_activity = now - last_activity_timestamp(task, logs);
            if time_since_activity < freq_ms {
                return false;
            }
            match task.last_notified_at {
                Some(notified_at) => now - notified_at >= freq_ms,
                None => true,
            }
        })
        .cloned()
        .collect()
}

/// One evaluator pass: notify every due task, stamp `last_notified_at`, and
/// persist the task collection. Notification failures are logged and do not
/// block the remaining tasks or the stamp (the stamp is what prevents a
/// broken host from being spammed every tick).
pub fn run_tick<N>(notifier: &N, state: &AppState, storage: &Storage, now: Timestamp)
where
    N: ReminderNotifier + ?Sized,
{
    let due = due_reminders(
        now,
        &state.tasks(),
        &state.logs(),
        state.notifications_enabled(),
        notifier.permission(),
    );
    if due.is_empty() {
        return;
    }

    for task in &due {
        if let Err(err) = notifier.notify(task) {
            log::warn!("reminder notification failed for task {}: {err}", task.id);
        }
        state.mark_reminder_fired(&task.id, now);
    }

    let username = state.username();
    if let Err(err) = storage.save_tasks(&username, &state.tasks_file()) {
        log::error!("failed to persist reminder timestamps for {username}: {err}");
    }
}

/// The fixed-interval reminder loop. Each tick re-reads the live state, so
/// task edits never require re-arming anything. The loop runs until the
/// owning session stops it; dropping the scheduler aborts the task as well,
/// which keeps ticks from leaking across a user switch.
pub struct ReminderScheduler {
    handle: tokio::task::JoinHandle<()>,
}

impl ReminderScheduler {
    pub fn start<N>(notifier: Arc<N>, state: AppState, storage: Storage) -> Self
    where
        N: ReminderNotifier + ?Sized + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(REMINDER_TICK_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                run_tick(&*notifier, &state, &storage, Utc::now().timestamp_millis());
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
