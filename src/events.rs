use crate::models::{Task, TaskLog};

pub const EVENT_STATE_UPDATED: &str = "state_updated";

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatePayload {
    pub username: String,
    pub tasks: Vec<Task>,
    pub logs: Vec<TaskLog>,
    pub notifications_enabled: bool,
}
