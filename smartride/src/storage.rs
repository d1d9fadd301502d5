//! JSON documents kept in the storage volume.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DAILY_STATUS_FILE: &str = "daily_notification_status.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Reads and writes JSON files under a base directory, caching what it has
/// seen. The cache assumes this process is the only writer.
pub struct FileService {
    base_dir: PathBuf,
    cache: HashMap<String, Value>,
}

impl FileService {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn full_path(&self, file_name: &str) -> PathBuf {
        self.base_dir.join(file_name)
    }

    /// Load `file_name`. A missing file reads as `T::default()`.
    pub fn load_json<T>(&mut self, file_name: &str) -> StorageResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.full_path(file_name);
        let json_error = |source| StorageError::Json {
            path: path.display().to_string(),
            source,
        };

        if let Some(cached) = self.cache.get(file_name) {
            return serde_json::from_value(cached.clone()).map_err(json_error);
        }

        if !path.exists() {
            debug!("{} does not exist yet", path.display());
            return Ok(T::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(json_error)?;
        let data = serde_json::from_value(value.clone()).map_err(json_error)?;
        self.cache.insert(file_name.to_string(), value);
        Ok(data)
    }

    pub fn save_json<T>(&mut self, file_name: &str, data: &T) -> StorageResult<()>
    where
        T: Serialize,
    {
        let path = self.full_path(file_name);
        let io_error = |source| StorageError::Io {
            path: path.display().to_string(),
            source,
        };
        let json_error = |source| StorageError::Json {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let value = serde_json::to_value(data).map_err(json_error)?;
        let pretty = serde_json::to_string_pretty(&value).map_err(json_error)?;
        std::fs::write(&path, pretty).map_err(io_error)?;
        self.cache.insert(file_name.to_string(), value);
        Ok(())
    }
}

/// Which days already received their forecast
pub type DailyStatus = BTreeMap<String, bool>;

pub fn notification_sent(files: &mut FileService, day: &str) -> StorageResult<bool> {
    let status: DailyStatus = files.load_json(DAILY_STATUS_FILE)?;
    Ok(status.get(day).copied().unwrap_or(false))
}

pub fn record_notification(files: &mut FileService, day: &str, sent: bool) -> StorageResult<()> {
    let mut status: DailyStatus = files.load_json(DAILY_STATUS_FILE)?;
    status.insert(day.to_string(), sent);
    files.save_json(DAILY_STATUS_FILE, &status)
}
