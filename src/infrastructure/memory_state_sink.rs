// In-process state store the fetch cycle publishes into
use crate::application::state_sink::StateSink;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredState {
    pub val: Value,
    pub ack: bool,
    /// Write time, epoch milliseconds.
    pub ts: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStateSink {
    states: RwLock<BTreeMap<String, StoredState>>,
}

impl MemoryStateSink {
    pub async fn get(&self, key: &str) -> Option<StoredState> {
        self.states.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, StoredState> {
        self.states.read().await.clone()
    }
}

#[async_trait]
impl StateSink for MemoryStateSink {
    async fn set_state(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let state = StoredState {
            val: value,
            ack: true,
            ts: chrono::Utc::now().timestamp_millis(),
        };
        self.states.write().await.insert(key.to_string(), state);
        Ok(())
    }
}
