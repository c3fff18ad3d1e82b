// Render session traits - headless browser capability used by the extractor
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle of the one long-lived browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Launching,
    Ready,
    Failed,
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("error launching browser: {0}")]
    Launch(String),
    #[error("timeout connecting to browser after {0:?}")]
    WatchdogExpired(Duration),
    #[error("render session not ready (state {0:?})")]
    NotReady(SessionState),
    #[error("a render target is already open")]
    TargetBusy,
    #[error("browser error: {0}")]
    Browser(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// One open page inside the session.
#[async_trait]
pub trait RenderTarget: Send {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), SessionError>;

    /// Navigate and wait until the page has settled.
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Evaluate a script expression in the page and return its JSON value.
    async fn evaluate(&mut self, expression: &str) -> Result<Value, SessionError>;

    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

#[async_trait]
pub trait RenderSession: Send + Sync {
    fn state(&self) -> SessionState;

    async fn open(&self) -> Result<Box<dyn RenderTarget>, SessionError>;

    /// Close every open target, then the session. No-op unless ready.
    async fn teardown(&self) -> Result<(), SessionError>;
}
