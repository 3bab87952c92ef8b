use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::models::{
    BackupConfig, BackupConfigFile, LogsFile, PrefsFile, Task, TaskDraft, TaskLog, TasksFile,
    Timestamp,
};
use crate::tracking::TrackingSession;

pub const SCHEMA_VERSION: u32 = 1;

/// Transient view state shared across the dashboard and its modals. Owned
/// here so every mutation that invalidates a reference can clear it in the
/// same lock acquisition. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub selection_mode: bool,
    pub selected_ids: Vec<String>,
    pub active_task_id: Option<String>,
    pub detail_task_id: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<AppData>>,
}

impl AppState {
    pub fn new(
        username: &str,
        tasks: Vec<Task>,
        logs: Vec<TaskLog>,
        notifications_enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AppData {
                username: username.to_string(),
                tasks,
                logs,
                notifications_enabled,
                backup: BackupConfig::default(),
                ui: UiState::default(),
                tracking: None,
            })),
        }
    }

    pub fn username(&self) -> String {
        let guard = self.inner.lock().expect("state poisoned");
        guard.username.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks.clone()
    }

    pub fn logs(&self) -> Vec<TaskLog> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.logs.clone()
    }

    pub fn notifications_enabled(&self) -> bool {
        let guard = self.inner.lock().expect("state poisoned");
        guard.notifications_enabled
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.notifications_enabled = enabled;
    }

    pub fn backup_config(&self) -> BackupConfig {
        let guard = self.inner.lock().expect("state poisoned");
        guard.backup.clone()
    }

    pub fn set_backup_config(&self, config: BackupConfig) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.backup = config;
    }

    pub fn tasks_file(&self) -> TasksFile {
        TasksFile {
            schema_version: SCHEMA_VERSION,
            tasks: self.tasks(),
        }
    }

    pub fn logs_file(&self) -> LogsFile {
        LogsFile {
            schema_version: SCHEMA_VERSION,
            logs: self.logs(),
        }
    }

    pub fn prefs_file(&self) -> PrefsFile {
        PrefsFile {
            schema_version: SCHEMA_VERSION,
            notifications_enabled: self.notifications_enabled(),
        }
    }

    pub fn backup_config_file(&self) -> BackupConfigFile {
        BackupConfigFile {
            schema_version: SCHEMA_VERSION,
            config: self.backup_config(),
        }
    }

    pub fn find_task(&self, task_id: &str) -> Option<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks.iter().find(|t| t.id == task_id).cloned()
    }

    /// New tasks go to the front; the dashboard lists newest first.
    pub fn prepend_task(&self, task: Task) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.tasks.insert(0, task);
    }

    /// Merges the editable field set into an existing task. Identity,
    /// completion state and the notification flag are left untouched.
    pub fn apply_draft(&self, task_id: &str, draft: &TaskDraft) -> Option<Task> {
        let mut guard = self.inner.lock().expect("state poisoned");
        let task = guard.tasks.iter_mut().find(|t| t.id == task_id)?;
        task.title = draft.title.clone();
        task.description = draft.description.clone();
        task.kind = draft.kind;
        task.needs_tracking = draft.needs_tracking;
        task.frequency = draft.frequency;
        task.color = draft.color.clone();
        task.icon = draft.icon.clone();
        Some(task.clone())
    }

    pub fn toggle_completion(&self, task_id: &str) -> Option<Task> {
        let mut guard = self.inner.lock().expect("state poisoned");
        let task = guard.tasks.iter_mut().find(|t| t.id == task_id)?;
        task.is_completed = !task.is_completed;
        Some(task.clone())
    }

    pub fn toggle_notification(&self, task_id: &str) -> Option<Task> {
        let mut guard = self.inner.lock().expect("state poisoned");
        let task = guard.tasks.iter_mut().find(|t| t.id == task_id)?;
        task.notification_enabled = !task.notification_enabled;
        Some(task.clone())
    }

    pub fn add_log(&self, log: TaskLog) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.logs.push(log);
    }

    pub fn mark_reminder_fired(&self, task_id: &str, at: Timestamp) {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(task) = guard.tasks.iter_mut().find(|t| t.id == task_id) {
            task.last_notified_at = Some(at);
        }
    }

    /// Removes the task, its logs, and every transient reference to it in
    /// one lock acquisition, so no modal can observe a half-deleted task.
    pub fn remove_task(&self, task_id: &str) -> bool {
        let mut guard = self.inner.lock().expect("state poisoned");
        let before = guard.tasks.len();
        guard.tasks.retain(|t| t.id != task_id);
        if guard.tasks.len() == before {
            return false;
        }
        guard.logs.retain(|l| l.task_id != task_id);
        guard.clear_refs_to(&HashSet::from([task_id]));
        true
    }

    pub fn remove_tasks(&self, task_ids: &[String]) {
        let ids: HashSet<&str> = task_ids.iter().map(String::as_str).collect();
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.tasks.retain(|t| !ids.contains(t.id.as_str()));
        guard.logs.retain(|l| !ids.contains(l.task_id.as_str()));
        guard.clear_refs_to(&ids);
    }

    /// Wholesale replacement after a backup restore. Stale view state would
    /// point at tasks that no longer exist, so it is dropped too.
    pub fn replace_collections(&self, tasks: Vec<Task>, logs: Vec<TaskLog>) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.tasks = tasks;
        guard.logs = logs;
        guard.ui = UiState::default();
        guard.tracking = None;
    }

    /// Full context switch to another username's namespace.
    pub fn switch_user(
        &self,
        username: &str,
        tasks: Vec<Task>,
        logs: Vec<TaskLog>,
        notifications_enabled: bool,
        backup: BackupConfig,
    ) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.username = username.to_string();
        guard.tasks = tasks;
        guard.logs = logs;
        guard.notifications_enabled = notifications_enabled;
        guard.backup = backup;
        guard.ui = UiState::default();
        guard.tracking = None;
    }

    pub fn ui(&self) -> UiState {
        let guard = self.inner.lock().expect("state poisoned");
        guard.ui.clone()
    }

    pub fn set_selection_mode(&self, active: bool) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.ui.selection_mode = active;
        if !active {
            guard.ui.selected_ids.clear();
        }
    }

    /// Toggles membership; returns whether the task is selected afterwards.
    pub fn toggle_selected(&self, task_id: &str) -> bool {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(pos) = guard.ui.selected_ids.iter().position(|id| id == task_id) {
            guard.ui.selected_ids.remove(pos);
            false
        } else {
            guard.ui.selected_ids.push(task_id.to_string());
            true
        }
    }

    pub fn open_detail(&self, task_id: &str) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.ui.detail_task_id = Some(task_id.to_string());
    }

    pub fn close_detail(&self) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.ui.detail_task_id = None;
    }

    /// Opens a capture session for the task, replacing any session that was
    /// already open (one tracking session at a time).
    pub fn open_tracking(&self, task_id: &str) {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.tracking = Some(TrackingSession::new(task_id));
        guard.ui.active_task_id = Some(task_id.to_string());
    }

    pub fn tracking(&self) -> Option<TrackingSession> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tracking.clone()
    }

    pub fn take_tracking(&self) -> Option<TrackingSession> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.ui.active_task_id = None;
        guard.tracking.take()
    }

    pub fn tracking_start(&self, now: Timestamp) {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(session) = guard.tracking.as_mut() {
            session.start(now);
        }
    }

    pub fn tracking_pause(&self, now: Timestamp) {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(session) = guard.tracking.as_mut() {
            session.pause(now);
        }
    }

    pub fn tracking_reset(&self) {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(session) = guard.tracking.as_mut() {
            session.reset();
        }
    }

    pub fn tracking_add_count(&self, delta: i32) {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(session) = guard.tracking.as_mut() {
            session.add_count(delta);
        }
    }

    pub fn tracking_set_count(&self, count: u32) {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(session) = guard.tracking.as_mut() {
            session.set_count(count);
        }
    }

    pub fn tracking_set_note(&self, note: &str) {
        let mut guard = self.inner.lock().expect("state poisoned");
        if let Some(session) = guard.tracking.as_mut() {
            session.set_note(note);
        }
    }
}

struct AppData {
    username: String,
    tasks: Vec<Task>,
    logs: Vec<TaskLog>,
    notifications_enabled: bool,
    backup: BackupConfig,
    ui: UiState,
    tracking: Option<TrackingSession>,
}

impl AppData {
    fn clear_refs_to(&mut self, ids: &HashSet<&str>) {
        self.ui.selected_ids.retain(|id| !ids.contains(id.as_str()));
        if let Some(active) = &self.ui.active_task_id {
            if ids.contains(active.as_str()) {
                self.ui.active_task_id = None;
                self.tracking = None;
            }
        }
        if let Some(detail) = &self.ui.detail_task_id {
            if ids.contains(detail.as_str()) {
                self.ui.detail_task_id = None;
            }
        }
    }
}
