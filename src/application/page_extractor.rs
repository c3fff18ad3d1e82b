// Page content extraction - pulls the rain graph script out of a rendered page
use crate::application::render_session::{RenderSession, RenderTarget, SessionError};
use std::time::Duration;
use thiserror::Error;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const NO_CAPTION: &str = "no text found";

pub const MARKER_PROBE: &str = r#"[...document.querySelectorAll('script')].some(s => s.textContent.includes('RainGraph.create({'))"#;

pub const SCRIPT_LINES_PROBE: &str = r#"(() => {
    for (const s of document.querySelectorAll('script')) {
        if (s.textContent.includes('RainGraph.create({')) {
            return s.textContent.split('\n');
        }
    }
    return null;
})()"#;

pub const CAPTION_PROBE: &str = r#"(() => {
    const el = document.querySelector('p[data-component="rainGraph-nowcastText"]');
    return el ? el.textContent : null;
})()"#;

const MARKER_WAIT: Duration = Duration::from_secs(15);
const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("rain graph script did not appear within {0:?}")]
    NavigationTimeout(Duration),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("unexpected evaluation result: {0}")]
    Evaluation(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    /// Lines of the script carrying the rain graph; empty if it vanished.
    pub script_lines: Vec<String>,
    pub caption: String,
}

#[derive(Debug, Clone)]
pub struct PageExtractor {
    marker_wait: Duration,
    poll_interval: Duration,
}

impl Default for PageExtractor {
    fn default() -> Self {
        Self {
            marker_wait: MARKER_WAIT,
            poll_interval: MARKER_POLL_INTERVAL,
        }
    }
}

impl PageExtractor {
    /// Render `url` in a fresh target; the target is closed on every path.
    pub async fn extract(
        &self,
        session: &dyn RenderSession,
        url: &str,
    ) -> Result<ExtractedPage, ExtractError> {
        tracing::debug!("creating new page");
        let mut target = session.open().await?;

        let result = self.extract_from(target.as_mut(), url).await;

        if let Err(e) = target.close().await {
            tracing::warn!("failed to close render target: {}", e);
        }
        result
    }

    async fn extract_from(
        &self,
        target: &mut dyn RenderTarget,
        url: &str,
    ) -> Result<ExtractedPage, ExtractError> {
        target.set_user_agent(USER_AGENT).await?;
        target.navigate(url).await?;

        self.wait_for_marker(target).await?;
        tracing::debug!("rain graph script present, evaluating page");

        let lines = target.evaluate(SCRIPT_LINES_PROBE).await?;
        let script_lines: Option<Vec<String>> = serde_json::from_value(lines)?;
        tracing::debug!("got {} script lines", script_lines.as_ref().map_or(0, Vec::len));

        let caption = target.evaluate(CAPTION_PROBE).await?;
        let caption: Option<String> = serde_json::from_value(caption)?;
        let caption = caption.unwrap_or_else(|| NO_CAPTION.to_string());
        tracing::debug!("got caption {:?}", caption);

        Ok(ExtractedPage {
            script_lines: script_lines.unwrap_or_default(),
            caption,
        })
    }

    async fn wait_for_marker(&self, target: &mut dyn RenderTarget) -> Result<(), ExtractError> {
        let poll = async {
            loop {
                if target.evaluate(MARKER_PROBE).await?.as_bool() == Some(true) {
                    return Ok::<(), SessionError>(());
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.marker_wait, poll).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ExtractError::NavigationTimeout(self.marker_wait)),
        }
    }
}
