//! Renderer abstraction for browser-based page rendering.
//!
//! Used as the fallback fetch strategy when the plain HTTP request is met by
//! an anti-bot challenge. Chromium support lives behind the `browser` feature.

#[cfg(feature = "browser")]
pub mod chromium;

use async_trait::async_trait;

use crate::error::{FetchError, FetchResult};

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> FetchResult<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> FetchResult<()>;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> FetchResult<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> FetchResult<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> FetchResult<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> FetchResult<()>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// The HTTP strategy works without a browser; this stub makes the browser
/// fallback fail fast instead.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> FetchResult<Box<dyn RenderContext>> {
        Err(FetchError::Browser(
            "browser not available, HTTP-only mode".to_string(),
        ))
    }
    async fn shutdown(&self) -> FetchResult<()> {
        Ok(())
    }
}

/// Launch the best renderer available.
///
/// Falls back to [`NoopRenderer`] when the feature is off, fallback is
/// disabled, or Chromium fails to start.
pub async fn launch(browser_fallback: bool) -> Box<dyn Renderer> {
    if !browser_fallback {
        tracing::info!("Browser fallback disabled");
        return Box::new(NoopRenderer);
    }

    match launch_chromium().await {
        Some(renderer) => renderer,
        None => Box::new(NoopRenderer),
    }
}

#[cfg(feature = "browser")]
async fn launch_chromium() -> Option<Box<dyn Renderer>> {
    match chromium::ChromiumRenderer::new().await {
        Ok(renderer) => {
            tracing::info!("Browser fallback ready (Chromium)");
            Some(Box::new(renderer))
        }
        Err(e) => {
            tracing::warn!("Browser fallback unavailable: {e}");
            None
        }
    }
}

#[cfg(not(feature = "browser"))]
async fn launch_chromium() -> Option<Box<dyn Renderer>> {
    tracing::warn!("Browser fallback requested but built without the `browser` feature");
    None
}
