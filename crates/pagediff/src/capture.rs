//! Screenshot capture.
//!
//! [`ScreenshotCapture`] is what the orchestrator consumes: URL in, stored
//! image reference out. [`StoringCapture`] builds one from any [`Renderer`]
//! plus a [`ContentStore`], enforcing the hard capture timeout. With the
//! `browser` feature, [`ChromiumRenderer`] renders through a freshly
//! launched headless Chromium per call.

use crate::config::EngineConfig;
use crate::model::ImageRef;
use crate::result::{PageDiffError, PageDiffResult};
use crate::store::ContentStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Produces a stored full-page screenshot for a URL
#[async_trait]
pub trait ScreenshotCapture: Send + Sync + std::fmt::Debug {
    /// Render `url` and store the image
    ///
    /// # Errors
    ///
    /// Returns [`PageDiffError::Render`] or [`PageDiffError::CaptureTimeout`]
    /// if no image was produced
    async fn capture(&self, url: &str) -> PageDiffResult<ImageRef>;
}

/// Renders a URL into encoded image bytes
#[async_trait]
pub trait Renderer: Send + Sync + std::fmt::Debug {
    /// Render the full scrollable height of `url` as PNG bytes
    async fn render(&self, url: &str) -> PageDiffResult<Vec<u8>>;
}

/// Renderer output persisted to a content store, under a hard timeout
#[derive(Debug)]
pub struct StoringCapture<R> {
    renderer: R,
    store: Arc<dyn ContentStore>,
    timeout: Duration,
}

impl<R: Renderer> StoringCapture<R> {
    /// Wrap a renderer
    pub fn new(renderer: R, store: Arc<dyn ContentStore>, timeout: Duration) -> Self {
        Self {
            renderer,
            store,
            timeout,
        }
    }

    /// The capture timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<R: Renderer> ScreenshotCapture for StoringCapture<R> {
    #[tracing::instrument(skip(self))]
    async fn capture(&self, url: &str) -> PageDiffResult<ImageRef> {
        let bytes = match tokio::time::timeout(self.timeout, self.renderer.render(url)).await {
            Ok(rendered) => rendered?,
            Err(_) => {
                tracing::warn!(url, timeout_ms = self.timeout.as_millis() as u64, "capture timed out");
                return Err(PageDiffError::CaptureTimeout {
                    url: url.to_string(),
                    ms: self.timeout.as_millis() as u64,
                });
            }
        };
        if bytes.is_empty() {
            return Err(PageDiffError::Render {
                url: url.to_string(),
                message: "renderer returned no image data".to_string(),
            });
        }
        let reference = self.store.write(url, bytes).await?;
        tracing::info!(url, image = %reference, "captured screenshot");
        Ok(reference)
    }
}

/// Build the default capture for `config`
///
/// # Errors
///
/// Returns a configuration error when built without the `browser` feature
pub fn capture_from_config(
    config: &EngineConfig,
    store: Arc<dyn ContentStore>,
) -> PageDiffResult<Arc<dyn ScreenshotCapture>> {
    #[cfg(feature = "browser")]
    {
        Ok(Arc::new(StoringCapture::new(
            ChromiumRenderer::from_config(config),
            store,
            config.capture_timeout(),
        )))
    }
    #[cfg(not(feature = "browser"))]
    {
        let _ = (config, store);
        Err(PageDiffError::config(
            "Browser feature not enabled. Rebuild with --features browser for screenshot capture.",
        ))
    }
}

// ============================================================================
// Real CDP Implementation (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
mod cdp {
    use super::{async_trait, EngineConfig, PageDiffError, PageDiffResult, Renderer};
    use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
    use chromiumoxide::handler::viewport::Viewport;
    use chromiumoxide::page::ScreenshotParams;
    use futures::StreamExt;
    use std::path::PathBuf;

    fn render_error(url: &str, e: impl std::fmt::Display) -> PageDiffError {
        PageDiffError::Render {
            url: url.to_string(),
            message: e.to_string(),
        }
    }

    /// One launched browser; the handler task dies with it.
    /// Dropping the browser kills the child process.
    struct Session {
        browser: Browser,
        handler: tokio::task::JoinHandle<()>,
    }

    impl Drop for Session {
        fn drop(&mut self) {
            self.handler.abort();
        }
    }

    /// Renders pages through a headless Chromium launched per call
    #[derive(Debug, Clone)]
    pub struct ChromiumRenderer {
        viewport: (u32, u32),
        headless: bool,
        sandbox: bool,
        chromium_path: Option<PathBuf>,
    }

    impl ChromiumRenderer {
        /// Renderer using the viewport and browser settings of `config`
        #[must_use]
        pub fn from_config(config: &EngineConfig) -> Self {
            Self {
                viewport: config.viewport(),
                headless: config.headless,
                sandbox: config.sandbox,
                chromium_path: config.chromium_path.clone(),
            }
        }

        async fn launch(&self, url: &str) -> PageDiffResult<Session> {
            let (width, height) = self.viewport;
            let mut builder = CdpConfig::builder()
                .window_size(width, height)
                .viewport(Viewport {
                    width,
                    height,
                    device_scale_factor: Some(1.0),
                    emulating_mobile: false,
                    is_landscape: false,
                    has_touch: false,
                });

            if !self.headless {
                builder = builder.with_head();
            }

            if !self.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = self.chromium_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder.build().map_err(|e| render_error(url, e))?;

            let (browser, mut handler) = Browser::launch(cdp_config)
                .await
                .map_err(|e| render_error(url, e))?;

            let handler = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(Session { browser, handler })
        }
    }

    async fn full_page_png(browser: &Browser, url: &str) -> PageDiffResult<Vec<u8>> {
        let page = browser
            .new_page(url)
            .await
            .map_err(|e| render_error(url, e))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| render_error(url, e))?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| render_error(url, e))
    }

    #[async_trait]
    impl Renderer for ChromiumRenderer {
        async fn render(&self, url: &str) -> PageDiffResult<Vec<u8>> {
            let mut session = self.launch(url).await?;
            tracing::debug!(url, "browser launched");
            let result = full_page_png(&session.browser, url).await;
            if let Err(e) = session.browser.close().await {
                tracing::warn!(url, error = %e, "failed to close browser");
            }
            result
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::ChromiumRenderer;
