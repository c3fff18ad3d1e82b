// Application state for HTTP handlers
use crate::infrastructure::memory_state_sink::MemoryStateSink;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub states: Arc<MemoryStateSink>,
}
