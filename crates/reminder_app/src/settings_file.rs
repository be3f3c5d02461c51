use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reminder_core::{HostError, SettingsStore};
use serde_json::{Map, Value};
use tracing::debug;

/// Settings persisted as a single JSON object on disk.
pub struct JsonFileSettings {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<Map<String, Value>, HostError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(HostError::Rejected(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettings {
    async fn snapshot(&self) -> Result<Value, HostError> {
        Ok(Value::Object(self.read_map().await?))
    }

    async fn set(&self, partial: Value) -> Result<(), HostError> {
        let Value::Object(partial) = partial else {
            return Err(HostError::Rejected("settings update must be an object".into()));
        };
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_map().await?;
        for (key, value) in partial {
            values.insert(key, value);
        }
        let text = serde_json::to_string_pretty(&Value::Object(values))?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, text).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        debug!(path = %self.path.display(), "settings written");
        Ok(())
    }
}
