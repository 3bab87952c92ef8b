use crate::models::{new_id, TaskLog, Timestamp};

/// The duration/count capture flow opened for tasks that track progress.
/// Elapsed time derives from wall-clock timestamps instead of a ticking
/// counter, so a paused session costs nothing and the math stays testable.
/// One session is open at a time; `AppState` owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSession {
    task_id: String,
    count: u32,
    note: String,
    accumulated_seconds: u32,
    running_since: Option<Timestamp>,
}

impl TrackingSession {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            count: 0,
            note: String::new(),
            accumulated_seconds: 0,
            running_since: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn start(&mut self, now: Timestamp) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn pause(&mut self, now: Timestamp) {
        self.accumulated_seconds = self.elapsed_seconds(now);
        self.running_since = None;
    }

    pub fn reset(&mut self) {
        self.accumulated_seconds = 0;
        self.running_since = None;
    }

    /// Seconds tracked so far, including the running stretch if any.
    pub fn elapsed_seconds(&self, now: Timestamp) -> u32 {
        let running = self
            .running_since
            .map(|since| ((now - since).max(0) / 1_000) as u32)
            .unwrap_or(0);
        self.accumulated_seconds + running
    }

    pub fn add_count(&mut self, delta: i32) {
        self.count = self.count.saturating_add_signed(delta);
    }

    pub fn set_count(&mut self, count: u32) {
        self.count = count;
    }

    pub fn set_note(&mut self, note: &str) {
        self.note = note.to_string();
    }

    /// Closes the session into a log entry stamped with the capture time.
    pub fn finish(self, now: Timestamp) -> TaskLog {
        let duration_seconds = self.elapsed_seconds(now);
        let note = self.note.trim();
        TaskLog {
            id: new_id(),
            task_id: self.task_id,
            timestamp: now,
            count: self.count,
            duration_seconds,
            note: if note.is_empty() {
                None
            } else {
                Some(note.to_string())
            },
        }
    }
}
