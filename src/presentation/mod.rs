// Presentation layer - HTTP read-out of published states
pub mod app_state;
pub mod handlers;
