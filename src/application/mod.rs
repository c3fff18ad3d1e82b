// Application layer - Fetch cycle, scheduling and capability traits
pub mod forecast_service;
pub mod page_extractor;
pub mod render_session;
pub mod scheduler;
pub mod state_sink;
