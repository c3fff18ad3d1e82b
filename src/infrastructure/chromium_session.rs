// Headless Chromium render session
use crate::application::render_session::{RenderSession, RenderTarget, SessionError, SessionState};
use crate::infrastructure::config::{BrowserMode, ConfigurationError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const LAUNCH_WATCHDOG: Duration = Duration::from_secs(10);
const CHROMIUM_BROWSER: &str = "/usr/bin/chromium-browser";

// `--no-sandbox` comes from the builder.
const LAUNCH_ARGS: [&str; 7] = [
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--ignore-certificate-errors",
];

#[derive(Debug, Clone, Copy)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }

    fn is_linux_arm(&self) -> bool {
        self.os == "linux" && self.arch == "arm"
    }
}

/// Pick the browser executable for `mode`; `None` means chromiumoxide's own
/// discovery. Unsupported combinations fail before anything is launched.
pub fn resolve_executable(
    mode: BrowserMode,
    path: Option<&Path>,
    platform: Platform,
) -> Result<Option<PathBuf>, ConfigurationError> {
    let unsupported = || ConfigurationError::UnsupportedPlatform {
        mode,
        os: platform.os,
        arch: platform.arch,
    };

    match mode {
        BrowserMode::BuiltIn if platform.arch == "arm" => Err(unsupported()),
        BrowserMode::BuiltIn => Ok(None),
        BrowserMode::ChromiumBrowser if platform.is_linux_arm() => {
            Ok(Some(PathBuf::from(CHROMIUM_BROWSER)))
        }
        BrowserMode::ChromiumBrowser => Err(unsupported()),
        BrowserMode::External => path
            .map(|p| Some(p.to_path_buf()))
            .ok_or(ConfigurationError::MissingBrowserPath),
        BrowserMode::Automatic if platform.is_linux_arm() => {
            Ok(Some(PathBuf::from(CHROMIUM_BROWSER)))
        }
        BrowserMode::Automatic => Ok(None),
    }
}

/// Stop waiting on `launch` once `deadline` passes and report it as failed.
pub async fn with_watchdog<T, F>(deadline: Duration, launch: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    match tokio::time::timeout(deadline, launch).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::WatchdogExpired(deadline)),
    }
}

fn browser_error(e: CdpError) -> SessionError {
    SessionError::Browser(Box::new(e))
}

pub struct ChromiumSession {
    executable: Option<PathBuf>,
    state: Mutex<SessionState>,
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    target_open: Arc<AtomicBool>,
}

impl ChromiumSession {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable,
            state: Mutex::new(SessionState::Uninitialized),
            browser: tokio::sync::Mutex::new(None),
            handler: Mutex::new(None),
            target_open: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Launch the browser under the watchdog. Failure is final for this session.
    pub async fn launch(&self) -> Result<(), SessionError> {
        self.set_state(SessionState::Launching);

        match with_watchdog(LAUNCH_WATCHDOG, self.start_browser()).await {
            Ok((browser, handler)) => {
                *self.browser.lock().await = Some(browser);
                if let Ok(mut slot) = self.handler.lock() {
                    *slot = Some(handler);
                }
                self.set_state(SessionState::Ready);
                tracing::info!("browser ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn start_browser(&self) -> Result<(Browser, JoinHandle<()>), SessionError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .viewport(None)
            .args(LAUNCH_ARGS);
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler error: {}", e);
                }
            }
        });

        Ok((browser, handler))
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(SessionState::Failed)
    }

    async fn open(&self) -> Result<Box<dyn RenderTarget>, SessionError> {
        let state = self.state();
        if state != SessionState::Ready {
            return Err(SessionError::NotReady(state));
        }

        let browser = self.browser.lock().await;
        let browser = browser.as_ref().ok_or(SessionError::NotReady(state))?;

        let slot = claim_target(&self.target_open)?;

        let page = browser.new_page("about:blank").await.map_err(browser_error)?;
        Ok(Box::new(ChromiumTarget { page, _slot: slot }))
    }

    async fn teardown(&self) -> Result<(), SessionError> {
        if self.state() != SessionState::Ready {
            tracing::debug!("browser never became ready, nothing to tear down");
            return Ok(());
        }

        tracing::debug!("destroy browser");
        self.set_state(SessionState::Closed);

        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        match browser.pages().await {
            Ok(pages) => {
                for page in pages {
                    if let Err(e) = page.close().await {
                        tracing::debug!("closing page failed: {}", e);
                    }
                }
            }
            Err(e) => tracing::warn!("listing open pages failed: {}", e),
        }

        let closed = browser.close().await.map(|_| ()).map_err(browser_error);
        if let Err(e) = browser.wait().await {
            tracing::debug!("waiting for browser exit failed: {}", e);
        }
        if let Some(handler) = self.handler.lock().ok().and_then(|mut slot| slot.take()) {
            handler.abort();
        }
        closed
    }
}

/// Frees the session's single target slot when the target goes away.
struct TargetSlot(Arc<AtomicBool>);

fn claim_target(open: &Arc<AtomicBool>) -> Result<TargetSlot, SessionError> {
    if open.swap(true, Ordering::SeqCst) {
        return Err(SessionError::TargetBusy);
    }
    Ok(TargetSlot(open.clone()))
}

impl Drop for TargetSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ChromiumTarget {
    page: Page,
    _slot: TargetSlot,
}

#[async_trait]
impl RenderTarget for ChromiumTarget {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), SessionError> {
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(browser_error)?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.page.goto(url).await.map_err(browser_error)?;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value, SessionError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(|e| SessionError::Browser(e.into()))?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(browser_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        let ChromiumTarget { page, _slot } = *self;
        page.close().await.map_err(browser_error)
    }
}
