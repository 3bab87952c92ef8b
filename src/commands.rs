use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone, Utc};

use crate::events::StatePayload;
use crate::gist::{BackupData, GistClient};
use crate::models::{new_id, sorted_logs_newest_first, Task, TaskDraft, TaskLog, TaskType, Timestamp};
use crate::reminder::{notification_tag, NotificationPermission};
use crate::state::AppState;
use crate::storage::{Storage, StorageError};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Host capabilities the command layer needs: a data directory, a state
/// event sink, the notification permission surface, and a blocking alert.
/// The GUI shell implements this; tests use a recording stub.
pub trait CommandCtx {
    fn data_dir(&self) -> Result<PathBuf, StorageError>;
    fn emit_state_updated(&self, payload: StatePayload);
    fn notifications_supported(&self) -> bool;
    fn notification_permission(&self) -> NotificationPermission;
    fn request_notification_permission(&self) -> NotificationPermission;
    fn post_notification(&self, title: &str, body: &str, tag: &str) -> Result<(), String>;
    fn alert(&self, message: &str);
}

/// What a tap on a task card ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickOutcome {
    SelectionToggled,
    TrackingOpened,
    CompletionToggled,
    DetailOpened,
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn now_ms() -> Timestamp {
    Utc::now().timestamp_millis()
}

fn state_payload(state: &AppState) -> StatePayload {
    StatePayload {
        username: state.username(),
        tasks: state.tasks(),
        logs: state.logs(),
        notifications_enabled: state.notifications_enabled(),
    }
}

/// Writes the active user's four records and announces the new state.
/// Every mutating command funnels through here, so the store reflects the
/// latest in-memory state right after any change.
fn persist(ctx: &impl CommandCtx, state: &AppState) -> Result<(), StorageError> {
    let storage = Storage::new(ctx.data_dir()?);
    storage.ensure_dirs()?;
    let username = state.username();
    storage.save_tasks(&username, &state.tasks_file())?;
    storage.save_logs(&username, &state.logs_file())?;
    storage.save_prefs(&username, &state.prefs_file())?;
    storage.save_backup_config(&username, &state.backup_config_file())?;
    ctx.emit_state_updated(state_payload(state));
    Ok(())
}

fn validate_draft(draft: &TaskDraft) -> Result<(), String> {
    if draft.title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    if let Some(frequency) = &draft.frequency {
        if frequency.value == 0 {
            return Err("frequency must be a positive value".to_string());
        }
    }
    Ok(())
}

/// Switches the active session to `username`: the in-memory collections are
/// discarded and reloaded from that user's namespace. Absent or corrupt
/// records load as empty/defaults, never as an error.
pub fn load_state_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    username: &str,
) -> CommandResult<StatePayload> {
    let username = username.trim();
    if username.is_empty() {
        return err("username must not be empty");
    }

    let root = match ctx.data_dir() {
        Ok(path) => path,
        Err(e) => return err(&format!("data_dir error: {e}")),
    };
    let storage = Storage::new(root);
    if let Err(error) = storage.ensure_dirs() {
        return err(&format!("storage error: {error:?}"));
    }

    let tasks = match storage.load_tasks(username) {
        Ok(file) => file.tasks,
        Err(StorageError::Json(error)) => {
            log::warn!("corrupt task store for {username}, starting empty: {error}");
            Vec::new()
        }
        Err(_) => Vec::new(),
    };
    let logs = match storage.load_logs(username) {
        Ok(file) => file.logs,
        Err(StorageError::Json(error)) => {
            log::warn!("corrupt log store for {username}, starting empty: {error}");
            Vec::new()
        }
        Err(_) => Vec::new(),
    };
    let notifications_enabled = storage
        .load_prefs(username)
        .map(|file| file.notifications_enabled)
        .unwrap_or(true);
    let backup = storage
        .load_backup_config(username)
        .map(|file| file.config)
        .unwrap_or_default();

    state.switch_user(username, tasks, logs, notifications_enabled, backup);
    if let Err(error) = storage.save_current_user(username) {
        return err(&format!("storage error: {error:?}"));
    }

    let payload = state_payload(state);
    ctx.emit_state_updated(payload.clone());
    ok(payload)
}

pub fn create_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    draft: TaskDraft,
) -> CommandResult<Task> {
    if let Err(message) = validate_draft(&draft) {
        return err(&message);
    }

    let task = Task {
        id: new_id(),
        title: draft.title.trim().to_string(),
        description: draft.description,
        kind: draft.kind,
        needs_tracking: draft.needs_tracking,
        frequency: draft.frequency,
        is_completed: false,
        created_at: now_ms(),
        color: draft.color,
        icon: draft.icon,
        notification_enabled: true,
        last_notified_at: None,
    };
    state.prepend_task(task.clone());
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(task)
}

pub fn update_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    draft: TaskDraft,
) -> CommandResult<Task> {
    if let Err(message) = validate_draft(&draft) {
        return err(&message);
    }

    let mut draft = draft;
    draft.title = draft.title.trim().to_string();
    let updated = match state.apply_draft(&task_id, &draft) {
        Some(task) => task,
        None => return err("task not found"),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(updated)
}

pub fn toggle_completion_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
) -> CommandResult<Task> {
    let task = match state.toggle_completion(&task_id) {
        Some(task) => task,
        None => return err("task not found"),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(task)
}

/// Per-task reminder switch; independent of the global one.
pub fn toggle_task_notification_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
) -> CommandResult<Task> {
    let task = match state.toggle_notification(&task_id) {
        Some(task) => task,
        None => return err("task not found"),
    };
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(task)
}

pub fn log_activity_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
    count: u32,
    duration_seconds: u32,
    note: Option<String>,
) -> CommandResult<TaskLog> {
    if state.find_task(&task_id).is_none() {
        return err("task not found");
    }

    let note = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let log = TaskLog {
        id: new_id(),
        task_id,
        timestamp: now_ms(),
        count,
        duration_seconds,
        note,
    };
    state.add_log(log.clone());
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(log)
}

pub fn delete_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
) -> CommandResult<bool> {
    state.remove_task(&task_id);
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(true)
}

pub fn batch_delete_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_ids: Vec<String>,
) -> CommandResult<bool> {
    state.remove_tasks(&task_ids);
    state.set_selection_mode(false);
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(true)
}

pub fn set_selection_mode_impl(state: &AppState, active: bool) -> CommandResult<bool> {
    state.set_selection_mode(active);
    ok(active)
}

pub fn toggle_selection_impl(state: &AppState, task_id: String) -> CommandResult<bool> {
    ok(state.toggle_selected(&task_id))
}

/// The secondary tap target on a card: in selection mode it toggles
/// membership like the card body, otherwise it opens the detail view.
pub fn open_detail_impl(state: &AppState, task_id: String) -> CommandResult<ClickOutcome> {
    if state.find_task(&task_id).is_none() {
        return err("task not found");
    }
    if state.ui().selection_mode {
        state.toggle_selected(&task_id);
        return ok(ClickOutcome::SelectionToggled);
    }
    state.open_detail(&task_id);
    ok(ClickOutcome::DetailOpened)
}

pub fn close_detail_impl(state: &AppState) -> CommandResult<bool> {
    state.close_detail();
    ok(true)
}

/// A tap on a task card: toggle selection while selecting, open the capture
/// flow for tracked tasks, toggle completion for plain ones.
pub fn task_click_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: String,
) -> CommandResult<ClickOutcome> {
    let task = match state.find_task(&task_id) {
        Some(task) => task,
        None => return err("task not found"),
    };

    if state.ui().selection_mode {
        state.toggle_selected(&task_id);
        return ok(ClickOutcome::SelectionToggled);
    }

    if task.needs_tracking {
        state.open_tracking(&task_id);
        return ok(ClickOutcome::TrackingOpened);
    }

    if state.toggle_completion(&task_id).is_none() {
        return err("task not found");
    }
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(ClickOutcome::CompletionToggled)
}

pub fn open_tracking_impl(state: &AppState, task_id: String) -> CommandResult<bool> {
    if state.find_task(&task_id).is_none() {
        return err("task not found");
    }
    state.open_tracking(&task_id);
    ok(true)
}

/// Closes the capture flow into a durable activity log.
pub fn finish_tracking_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<TaskLog> {
    let session = match state.take_tracking() {
        Some(session) => session,
        None => return err("no tracking session"),
    };
    // The task can disappear under an open modal (deleted elsewhere); the
    // session is already cleared, so just refuse to log.
    if state.find_task(session.task_id()).is_none() {
        return err("task not found");
    }

    let log = session.finish(now_ms());
    state.add_log(log.clone());
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(log)
}

pub fn cancel_tracking_impl(state: &AppState) -> CommandResult<bool> {
    state.take_tracking();
    ok(true)
}

/// The global reminder switch. Turning it on walks the host permission
/// flow; any outcome short of a grant reverts the switch and tells the
/// user. A successful enable posts one confirmation notification.
pub fn set_global_notifications_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    enabled: bool,
) -> CommandResult<bool> {
    let previous = state.notifications_enabled();

    if !enabled {
        state.set_notifications_enabled(false);
        if let Err(error) = persist(ctx, state) {
            state.set_notifications_enabled(previous);
            return err(&format!("storage error: {error:?}"));
        }
        return ok(false);
    }

    if !ctx.notifications_supported() {
        ctx.alert("Notifications are not supported on this device.");
        return err("notifications unsupported");
    }

    let mut permission = ctx.notification_permission();
    if permission == NotificationPermission::Default {
        permission = ctx.request_notification_permission();
    }
    if permission != NotificationPermission::Granted {
        ctx.alert("Reminders could not be enabled. Allow notifications in your browser settings.");
        state.set_notifications_enabled(false);
        if let Err(error) = persist(ctx, state) {
            state.set_notifications_enabled(previous);
            return err(&format!("storage error: {error:?}"));
        }
        return err("notification permission denied");
    }

    state.set_notifications_enabled(true);
    if let Err(error) = persist(ctx, state) {
        state.set_notifications_enabled(previous);
        return err(&format!("storage error: {error:?}"));
    }

    // Best-effort confirmation so the user sees it working right away.
    if let Err(error) = ctx.post_notification(
        "TaskFlow",
        "Reminders are on. We'll nudge you on schedule.",
        "taskflow",
    ) {
        log::warn!("confirmation notification failed: {error}");
    }
    ok(true)
}

/// Forwards a due reminder to the host, tagged by task id so duplicate
/// pending notifications collapse.
pub fn post_task_reminder(ctx: &impl CommandCtx, task: &Task) -> Result<(), String> {
    ctx.post_notification(
        &format!("Time for: {}", task.title),
        "It's been a while since the last time. Keep it up!",
        &notification_tag(&task.id),
    )
}

pub fn set_backup_config_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    token: String,
    gist_id: Option<String>,
) -> CommandResult<bool> {
    let mut config = state.backup_config();
    config.token = token.trim().to_string();
    config.gist_id = gist_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    state.set_backup_config(config);
    if let Err(error) = persist(ctx, state) {
        return err(&format!("storage error: {error:?}"));
    }
    ok(true)
}

/// Uploads the whole collection pair to the gist store; remembers a newly
/// created gist id for later updates. No retry on failure.
pub async fn backup_sync_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<String> {
    let config = state.backup_config();
    if config.token.trim().is_empty() {
        return err("missing github token");
    }

    let client = match GistClient::new(&config.token) {
        Ok(client) => client,
        Err(error) => return err(&format!("sync failed: {error}")),
    };
    let data = BackupData {
        tasks: state.tasks(),
        logs: state.logs(),
    };
    let username = state.username();

    match client
        .upload(&username, config.gist_id.as_deref(), &data)
        .await
    {
        Ok(remote_id) => {
            if config.gist_id.is_none() {
                let mut config = state.backup_config();
                config.gist_id = Some(remote_id.clone());
                state.set_backup_config(config);
            }
            if let Err(error) = persist(ctx, state) {
                return err(&format!("storage error: {error:?}"));
            }
            ok(remote_id)
        }
        Err(error) => err(&format!("sync failed: {error}")),
    }
}

/// Downloads and validates a backup, then replaces both collections. A
/// malformed document is rejected before anything local changes.
pub async fn backup_restore_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
) -> CommandResult<StatePayload> {
    let config = state.backup_config();
    if config.token.trim().is_empty() {
        return err("missing github token");
    }
    let gist_id = match config.gist_id {
        Some(id) => id,
        None => return err("missing gist id"),
    };

    let client = match GistClient::new(&config.token) {
        Ok(client) => client,
        Err(error) => return err(&format!("load failed: {error}")),
    };
    let username = state.username();

    match client.download(&username, &gist_id).await {
        Ok(data) => {
            state.replace_collections(data.tasks, data.logs);
            if let Err(error) = persist(ctx, state) {
                return err(&format!("storage error: {error:?}"));
            }
            ok(state_payload(state))
        }
        Err(error) => err(&format!("load failed: {error}")),
    }
}

fn format_log_date(timestamp: Timestamp) -> String {
    Local
        .timestamp_millis_opt(timestamp)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_duration(seconds: u32) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h}h {m}m {s}s")
}

/// Renders the plain-text report for the selected tasks. Logs print newest
/// first; every log line carries at least one metric (count is included
/// when positive, and also when both metrics are zero so the line is never
/// empty).
pub fn render_export(
    username: &str,
    generated_at: Timestamp,
    tasks: &[Task],
    logs: &[TaskLog],
    selected_ids: &[String],
) -> String {
    let ids: HashSet<&str> = selected_ids.iter().map(String::as_str).collect();
    let generated = Local
        .timestamp_millis_opt(generated_at)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| generated_at.to_string());

    let mut out = String::new();
    out.push_str(&format!("TaskFlow export report ({username}) - {generated}\n\n"));

    for task in tasks.iter().filter(|t| ids.contains(t.id.as_str())) {
        out.push_str("========================================\n");
        out.push_str(&format!("Task: {}\n", task.title));
        out.push_str(&format!(
            "Type: {}\n",
            match task.kind {
                TaskType::Habit => "habit",
                TaskType::Single => "single",
            }
        ));
        out.push_str(&format!(
            "Description: {}\n",
            task.description.as_deref().unwrap_or("none")
        ));

        let task_logs = sorted_logs_newest_first(logs, &task.id);
        out.push_str(&format!("\nActivity log ({} entries):\n", task_logs.len()));
        if task_logs.is_empty() {
            out.push_str("  (no entries)\n");
        } else {
            for log in task_logs {
                out.push_str(&format!("  - [{}] ", format_log_date(log.timestamp)));
                let mut parts = Vec::new();
                if log.duration_seconds > 0 {
                    parts.push(format!("duration: {}", format_duration(log.duration_seconds)));
                }
                if log.count > 0 || (log.count == 0 && log.duration_seconds == 0) {
                    parts.push(format!("count: {}", log.count));
                }
                out.push_str(&parts.join(", "));
                if let Some(note) = &log.note {
                    out.push_str(&format!("\n    note: {note}"));
                }
                out.push('\n');
            }
        }
        out.push('\n');
    }

    out
}

fn write_atomic_bytes(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    fs::create_dir_all(
        path.parent()
            .ok_or_else(|| StorageError::Io(std::io::Error::other("invalid export path")))?,
    )?;
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Writes the selection report to the exports directory and returns its
/// path. Leaves selection mode on success.
pub fn export_selection_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<String> {
    let selected = state.ui().selected_ids;
    if selected.is_empty() {
        return err("no tasks selected");
    }

    let root = match ctx.data_dir() {
        Ok(path) => path,
        Err(e) => return err(&format!("data_dir error: {e}")),
    };
    let storage = Storage::new(root);
    if let Err(error) = storage.ensure_dirs() {
        return err(&format!("storage error: {error:?}"));
    }

    let username = state.username();
    let now = now_ms();
    let stamp = Local
        .timestamp_millis_opt(now)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| now.to_string());
    let path = storage.export_path(&username, &stamp);

    let content = render_export(&username, now, &state.tasks(), &state.logs(), &selected);
    if let Err(error) = write_atomic_bytes(&path, content.as_bytes()) {
        return err(&format!("export error: {error:?}"));
    }

    state.set_selection_mode(false);
    ok(path.to_string_lossy().to_string())
}
