use serde::{Deserialize, Serialize};

pub type Timestamp = i64;

/// Icon glyphs offered by the task form. Presentation only.
pub const ICONS: [&str; 12] = [
    "📝", "🏋️", "💊", "💧", "📚", "🧘", "🧹", "💻", "🎨", "🍳", "🏃", "💤",
];

/// Card color tokens offered by the task form. Presentation only; the host
/// UI maps them to its own styling.
pub const COLORS: [&str; 14] = [
    "bg-red-500",
    "bg-orange-500",
    "bg-amber-500",
    "bg-green-500",
    "bg-emerald-500",
    "bg-teal-500",
    "bg-cyan-500",
    "bg-blue-500",
    "bg-indigo-500",
    "bg-violet-500",
    "bg-purple-500",
    "bg-fuchsia-500",
    "bg-pink-500",
    "bg-rose-500",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Single,
    Habit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Frequency {
    pub value: u32,
    pub unit: FrequencyUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub needs_tracking: bool,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    pub is_completed: bool,
    pub created_at: Timestamp,
    pub color: String,
    pub icon: String,
    #[serde(default = "default_notification_enabled")]
    pub notification_enabled: bool,
    #[serde(default)]
    pub last_notified_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskLog {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub task_id: String,
    pub timestamp: Timestamp,
    pub count: u32,
    pub duration_seconds: u32,
    #[serde(default)]
    pub note: Option<String>,
}

/// The editable field set accepted by create/update. Identity, completion
/// and the per-task notification flag are controller-owned and never part
/// of a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub needs_tracking: bool,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackupConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub gist_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TasksFile {
    pub schema_version: u32,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogsFile {
    pub schema_version: u32,
    pub logs: Vec<TaskLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PrefsFile {
    pub schema_version: u32,
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackupConfigFile {
    pub schema_version: u32,
    pub config: BackupConfig,
}

fn default_notification_enabled() -> bool {
    true
}

/// Generates a fresh opaque id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Ids have historically been persisted both as strings and as raw numbers.
/// Normalize to a string at the model boundary so every later comparison is
/// plain string equality.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// All logs referencing the given task, in collection order.
pub fn logs_for_task<'a>(logs: &'a [TaskLog], task_id: &str) -> Vec<&'a TaskLog> {
    logs.iter().filter(|log| log.task_id == task_id).collect()
}

/// The task's logs sorted newest first; ties break on id so display and
/// export output stay deterministic.
pub fn sorted_logs_newest_first<'a>(logs: &'a [TaskLog], task_id: &str) -> Vec<&'a TaskLog> {
    let mut out = logs_for_task(logs, task_id);
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    out
}

/// When the task has logged activity, the most recent log timestamp;
/// otherwise the task's creation time.
pub fn last_activity_timestamp(task: &Task, logs: &[TaskLog]) -> Timestamp {
    logs_for_task(logs, &task.id)
        .iter()
        .map(|log| log.timestamp)
        .max()
        .unwrap_or(task.created_at)
}
