use std::sync::Arc;

use crate::commands::{load_state_impl, post_task_reminder, CommandCtx};
use crate::models::Task;
use crate::reminder::{NotificationPermission, ReminderNotifier, ReminderScheduler};
use crate::state::AppState;
use crate::storage::Storage;

/// Lets a thread-safe host context double as the scheduler's notification
/// surface: an absent notification capability reads as a denied permission,
/// which silences the evaluator without special-casing it.
pub struct HostNotifier<C> {
    ctx: Arc<C>,
}

impl<C> HostNotifier<C> {
    pub fn new(ctx: Arc<C>) -> Self {
        Self { ctx }
    }
}

impl<C> ReminderNotifier for HostNotifier<C>
where
    C: CommandCtx + Send + Sync,
{
    fn permission(&self) -> NotificationPermission {
        if !self.ctx.notifications_supported() {
            return NotificationPermission::Denied;
        }
        self.ctx.notification_permission()
    }

    fn notify(&self, task: &Task) -> Result<(), String> {
        post_task_reminder(&*self.ctx, task)
    }
}

/// The active pseudo-login. Owns the reminder scheduler so its ticks start
/// with the session and are cancelled on logout or user switch; a tick can
/// never outlive the namespace it was reading.
pub struct Session {
    state: AppState,
    storage: Storage,
    scheduler: Option<ReminderScheduler>,
    notifier: Option<Arc<dyn ReminderNotifier>>,
}

impl Session {
    /// Loads the username's namespace and makes it the active login.
    pub fn login(ctx: &impl CommandCtx, username: &str) -> Result<Self, String> {
        let root = ctx.data_dir().map_err(|e| e.to_string())?;
        let state = AppState::new(username, Vec::new(), Vec::new(), true);
        let result = load_state_impl(ctx, &state, username);
        if !result.ok {
            return Err(result.error.unwrap_or_else(|| "login failed".to_string()));
        }
        Ok(Self {
            state,
            storage: Storage::new(root),
            scheduler: None,
            notifier: None,
        })
    }

    /// Restores the previous login if one was recorded.
    pub fn resume(ctx: &impl CommandCtx) -> Result<Option<Self>, String> {
        let root = ctx.data_dir().map_err(|e| e.to_string())?;
        match Storage::new(root).load_current_user() {
            Ok(username) => Self::login(ctx, &username).map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn username(&self) -> String {
        self.state.username()
    }

    /// Starts the 10-second reminder loop. Must be called from within a
    /// tokio runtime. The notifier is kept so a user switch can restart
    /// the loop against the new namespace.
    pub fn start_reminders(&mut self, notifier: Arc<dyn ReminderNotifier>) {
        self.stop_reminders();
        self.scheduler = Some(ReminderScheduler::start(
            notifier.clone(),
            self.state.clone(),
            self.storage.clone(),
        ));
        self.notifier = Some(notifier);
    }

    pub fn stop_reminders(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
    }

    pub fn reminders_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .map(|scheduler| !scheduler.is_stopped())
            .unwrap_or(false)
    }

    /// Full context switch to another username. The old namespace's ticks
    /// stop before anything is reloaded.
    pub fn switch_user(&mut self, ctx: &impl CommandCtx, username: &str) -> Result<(), String> {
        let was_running = self.scheduler.is_some();
        self.stop_reminders();

        let result = load_state_impl(ctx, &self.state, username);
        if !result.ok {
            return Err(result.error.unwrap_or_else(|| "switch failed".to_string()));
        }

        if was_running {
            if let Some(notifier) = self.notifier.clone() {
                self.scheduler = Some(ReminderScheduler::start(
                    notifier,
                    self.state.clone(),
                    self.storage.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Ends the session: cancels the reminder loop and forgets the login.
    pub fn logout(mut self) -> Result<(), String> {
        self.stop_reminders();
        self.storage
            .clear_current_user()
            .map_err(|e| e.to_string())
    }
}
