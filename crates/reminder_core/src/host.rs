use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HostError;

/// A note block as reported by the host's database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: String,
    pub raw_text: String,
    pub container_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_property: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockQuery {
    /// Blocks whose raw text contains the given token.
    ContainsMarker(String),
    /// Blocks carrying a structured `scheduled` property.
    HasScheduledProperty,
}

#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn query(&self, query: &BlockQuery) -> Result<Vec<BlockRecord>, HostError>;
}

/// Host key-value settings persistence. `set` merges top-level keys of `partial`.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn snapshot(&self) -> Result<Value, HostError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.get(key).cloned())
    }

    async fn set(&self, partial: Value) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Slash,
    Palette,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub key: String,
    pub label: String,
    pub kind: CommandKind,
    pub keybinding: Option<String>,
}

pub trait CommandRegistry: Send + Sync {
    fn register(&self, spec: CommandSpec) -> Result<(), HostError>;
}

/// Settings kept in process memory only; also the default store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<Map<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: Value) -> Self {
        let store = Self::new();
        if let Value::Object(map) = values {
            *store.values.write() = map;
        }
        store
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn snapshot(&self) -> Result<Value, HostError> {
        Ok(Value::Object(self.values.read().clone()))
    }

    async fn set(&self, partial: Value) -> Result<(), HostError> {
        let Value::Object(partial) = partial else {
            return Err(HostError::Rejected("settings update must be an object".into()));
        };
        let mut values = self.values.write();
        for (key, value) in partial {
            values.insert(key, value);
        }
        Ok(())
    }
}
