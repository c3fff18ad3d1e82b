// Infrastructure layer - External dependencies and adapters
pub mod chromium_session;
pub mod config;
pub mod memory_state_sink;
