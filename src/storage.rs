use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{BackupConfigFile, LogsFile, PrefsFile, TasksFile};

const FILE_PREFIX: &str = "tf";
const CURRENT_USER_FILE: &str = "current_user.json";
const EXPORT_DIR: &str = "exports";

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

/// Usernames are free text; file names are not. Anything outside
/// `[A-Za-z0-9._-]` maps to `_`. Collisions are acceptable for a
/// pseudo-login with no authentication.
pub fn sanitize_username(username: &str) -> String {
    username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Per-username namespaced persistence under one data directory. Each user
/// owns four records (tasks, logs, prefs, backup credentials), each written
/// atomically as its own JSON file.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(EXPORT_DIR))?;
        Ok(())
    }

    fn user_file(&self, username: &str, kind: &str) -> PathBuf {
        let user = sanitize_username(username);
        self.root.join(format!("{FILE_PREFIX}_{user}_{kind}.json"))
    }

    pub fn export_path(&self, username: &str, stamp: &str) -> PathBuf {
        let user = sanitize_username(username);
        self.root
            .join(EXPORT_DIR)
            .join(format!("taskflow_{user}_export_{stamp}.txt"))
    }

    pub fn load_tasks(&self, username: &str) -> Result<TasksFile, StorageError> {
        self.load_json(self.user_file(username, "tasks"))
    }

    pub fn save_tasks(&self, username: &str, data: &TasksFile) -> Result<(), StorageError> {
        self.write_atomic(self.user_file(username, "tasks"), data)
    }

    pub fn load_logs(&self, username: &str) -> Result<LogsFile, StorageError> {
        self.load_json(self.user_file(username, "logs"))
    }

    pub fn save_logs(&self, username: &str, data: &LogsFile) -> Result<(), StorageError> {
        self.write_atomic(self.user_file(username, "logs"), data)
    }

    pub fn load_prefs(&self, username: &str) -> Result<PrefsFile, StorageError> {
        self.load_json(self.user_file(username, "prefs"))
    }

    pub fn save_prefs(&self, username: &str, data: &PrefsFile) -> Result<(), StorageError> {
        self.write_atomic(self.user_file(username, "prefs"), data)
    }

    pub fn load_backup_config(&self, username: &str) -> Result<BackupConfigFile, StorageError> {
        self.load_json(self.user_file(username, "backup"))
    }

    pub fn save_backup_config(
        &self,
        username: &str,
        data: &BackupConfigFile,
    ) -> Result<(), StorageError> {
        self.write_atomic(self.user_file(username, "backup"), data)
    }

    pub fn load_current_user(&self) -> Result<String, StorageError> {
        self.load_json(self.root.join(CURRENT_USER_FILE))
    }

    pub fn save_current_user(&self, username: &str) -> Result<(), StorageError> {
        self.write_atomic(self.root.join(CURRENT_USER_FILE), &username)
    }

    pub fn clear_current_user(&self) -> Result<(), StorageError> {
        match fs::remove_file(self.root.join(CURRENT_USER_FILE)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StorageError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic<T: Serialize>(&self, path: PathBuf, data: &T) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(data)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }
}
