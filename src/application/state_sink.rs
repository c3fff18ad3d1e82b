// Sink trait for publishing forecast states
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait StateSink: Send + Sync {
    /// Write one state value under a dotted key like `data_1h.rainStartsAt`.
    async fn set_state(&self, key: &str, value: Value) -> anyhow::Result<()>;
}
