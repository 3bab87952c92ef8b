use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Task, TaskLog};
use crate::storage::sanitize_username;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GENERIC_DATA_FILE: &str = "taskflow_data.json";
const USER_AGENT: &str = "taskflow";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
pub enum GistError {
    Http(reqwest::Error),
    Status(StatusCode),
    Json(serde_json::Error),
    MissingDataFile,
    InvalidFormat,
}

impl std::fmt::Display for GistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GistError::Http(err) => write!(f, "http error: {err}"),
            GistError::Status(status) => write!(f, "gist request failed with status {status}"),
            GistError::Json(err) => write!(f, "json error: {err}"),
            GistError::MissingDataFile => write!(f, "gist has no backup data file"),
            GistError::InvalidFormat => write!(f, "backup content is missing tasks or logs"),
        }
    }
}

impl std::error::Error for GistError {}

impl From<reqwest::Error> for GistError {
    fn from(value: reqwest::Error) -> Self {
        GistError::Http(value)
    }
}

impl From<serde_json::Error> for GistError {
    fn from(value: serde_json::Error) -> Self {
        GistError::Json(value)
    }
}

/// The whole backup: both collections, nothing else. This is the sole
/// content of the gist's data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackupData {
    pub tasks: Vec<Task>,
    pub logs: Vec<TaskLog>,
}

pub fn data_file_name(username: &str) -> String {
    format!("taskflow_{}_data.json", sanitize_username(username))
}

/// The gist create/update body: one named file whose content is the
/// serialized backup.
pub fn build_gist_payload(username: &str, data: &BackupData) -> Result<Value, GistError> {
    let content = serde_json::to_string_pretty(data)?;
    Ok(serde_json::json!({
        "description": format!("TaskFlow data backup ({username})"),
        "public": false,
        "files": {
            data_file_name(username): { "content": content }
        }
    }))
}

/// Extracts the backup from a fetched gist document. Prefers the per-user
/// file and falls back to the generic name older backups used. The content
/// must parse and carry both collections; anything less is rejected without
/// touching local data.
pub fn parse_gist_document(username: &str, document: &Value) -> Result<BackupData, GistError> {
    let files = document
        .get("files")
        .and_then(Value::as_object)
        .ok_or(GistError::InvalidFormat)?;

    let content = files
        .get(&data_file_name(username))
        .or_else(|| files.get(GENERIC_DATA_FILE))
        .and_then(|file| file.get("content"))
        .and_then(Value::as_str)
        .ok_or(GistError::MissingDataFile)?;

    let value: Value = serde_json::from_str(content)?;
    if value.get("tasks").is_none() || value.get("logs").is_none() {
        return Err(GistError::InvalidFormat);
    }
    serde_json::from_value(value).map_err(|_| GistError::InvalidFormat)
}

/// One-shot client for the gist REST surface. No retries; callers report
/// failures and wait for the user to try again.
pub struct GistClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GistClient {
    pub fn new(token: &str) -> Result<Self, GistError> {
        Self::with_base_url(token, GITHUB_API_BASE)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, GistError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }

    /// Creates a new gist when no id is known, updates the existing one
    /// otherwise. Returns the remote document id.
    pub async fn upload(
        &self,
        username: &str,
        gist_id: Option<&str>,
        data: &BackupData,
    ) -> Result<String, GistError> {
        let payload = build_gist_payload(username, data)?;
        let request = match gist_id {
            Some(id) => self.http.patch(format!("{}/gists/{id}", self.base_url)),
            None => self.http.post(format!("{}/gists", self.base_url)),
        };

        let response = request
            .header(header::AUTHORIZATION, self.auth_header())
            .header(header::ACCEPT, "application/vnd.github+json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GistError::Status(status));
        }

        let body: Value = response.json().await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(GistError::InvalidFormat)
    }

    pub async fn download(&self, username: &str, gist_id: &str) -> Result<BackupData, GistError> {
        let response = self
            .http
            .get(format!("{}/gists/{gist_id}", self.base_url))
            .header(header::AUTHORIZATION, self.auth_header())
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GistError::Status(status));
        }

        let body: Value = response.json().await?;
        parse_gist_document(username, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskType, COLORS, ICONS};

    fn make_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task-{id}"),
            description: Some("desc".to_string()),
            kind: TaskType::Habit,
            needs_tracking: true,
            frequency: None,
            is_completed: false,
            created_at: 1_000,
            color: COLORS[3].to_string(),
            icon: ICONS[4].to_string(),
            notification_enabled: true,
            last_notified_at: Some(2_000),
        }
    }

    fn make_log(id: &str, task_id: &str) -> TaskLog {
        TaskLog {
            id: id.to_string(),
            task_id: task_id.to_string(),
            timestamp: 1_500,
            count: 3,
            duration_seconds: 65,
            note: Some("note".to_string()),
        }
    }

    fn document_with_file(name: &str, content: &str) -> Value {
        serde_json::json!({
            "id": "g1",
            "files": { name: { "content": content } }
        })
    }

    #[test]
    fn payload_round_trips_field_for_field() {
        let data = BackupData {
            tasks: vec![make_task("a"), make_task("b")],
            logs: vec![make_log("l1", "a")],
        };

        let payload = build_gist_payload("alice", &data).unwrap();
        assert_eq!(payload["public"], serde_json::json!(false));
        assert!(payload["description"]
            .as_str()
            .unwrap()
            .contains("alice"));

        let content = payload["files"]["taskflow_alice_data.json"]["content"]
            .as_str()
            .unwrap();
        let document = document_with_file("taskflow_alice_data.json", content);
        let restored = parse_gist_document("alice", &document).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn download_falls_back_to_the_generic_file_name() {
        let data = BackupData {
            tasks: vec![make_task("a")],
            logs: Vec::new(),
        };
        let content = serde_json::to_string(&data).unwrap();
        let document = document_with_file(GENERIC_DATA_FILE, &content);

        let restored = parse_gist_document("alice", &document).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn missing_data_file_is_its_own_error() {
        let document = document_with_file("unrelated.txt", "hello");
        assert!(matches!(
            parse_gist_document("alice", &document),
            Err(GistError::MissingDataFile)
        ));

        let no_files = serde_json::json!({ "id": "g1" });
        assert!(matches!(
            parse_gist_document("alice", &no_files),
            Err(GistError::InvalidFormat)
        ));
    }

    #[test]
    fn content_without_both_collections_is_rejected() {
        let tasks_only = r#"{ "tasks": [] }"#;
        let document = document_with_file("taskflow_alice_data.json", tasks_only);
        assert!(matches!(
            parse_gist_document("alice", &document),
            Err(GistError::InvalidFormat)
        ));

        let logs_only = r#"{ "logs": [] }"#;
        let document = document_with_file("taskflow_alice_data.json", logs_only);
        assert!(matches!(
            parse_gist_document("alice", &document),
            Err(GistError::InvalidFormat)
        ));
    }

    #[test]
    fn unparseable_content_is_a_json_error() {
        let document = document_with_file("taskflow_alice_data.json", "{nope");
        assert!(matches!(
            parse_gist_document("alice", &document),
            Err(GistError::Json(_))
        ));
    }

    #[test]
    fn numeric_ids_in_old_backups_normalize_on_restore() {
        let content = r#"
        {
          "tasks": [],
          "logs": [
            { "id": 1, "task_id": 2, "timestamp": 100, "count": 0, "duration_seconds": 0 }
          ]
        }
        "#;
        let document = document_with_file("taskflow_alice_data.json", content);
        let restored = parse_gist_document("alice", &document).unwrap();
        assert_eq!(restored.logs[0].id, "1");
        assert_eq!(restored.logs[0].task_id, "2");
    }

    #[test]
    fn data_file_name_is_namespaced_and_sanitized() {
        assert_eq!(data_file_name("alice"), "taskflow_alice_data.json");
        assert_eq!(data_file_name("a b"), "taskflow_a_b_data.json");
    }

    #[test]
    fn client_normalizes_a_trailing_slash_in_the_base_url() {
        let client = GistClient::with_base_url("t", "http://localhost:9999/").unwrap();
        assert_eq!(client.base_url, "http://localhost:9999");
    }
}
