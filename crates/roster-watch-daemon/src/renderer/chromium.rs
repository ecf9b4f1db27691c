//! Chromium-based renderer using chromiumoxide.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;

use super::{RenderContext, Renderer};
use crate::error::{FetchError, FetchResult};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. Explicit override
    if let Ok(p) = std::env::var("ROSTER_WATCH_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.roster-watch/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = [
            home.join(".roster-watch/chromium/chrome-linux64/chrome"),
            home.join(".roster-watch/chromium/chrome"),
        ];
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    ["google-chrome", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|bin| which::which(bin).ok())
}

fn browser_err(context: &str, e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(format!("{context}: {e}"))
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
}

impl ChromiumRenderer {
    /// Create a new ChromiumRenderer, launching a headless Chromium instance.
    pub async fn new() -> FetchResult<Self> {
        let chrome_path = find_chromium().ok_or_else(|| {
            FetchError::Browser(
                "Chromium not found. Install Chrome or set ROSTER_WATCH_CHROMIUM_PATH.".to_string(),
            )
        })?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .build()
            .map_err(|e| browser_err("failed to build browser config", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| browser_err("failed to launch Chromium", e))?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self { browser })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> FetchResult<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| browser_err("failed to create new page", e))?;

        Ok(Box::new(ChromiumContext { page }))
    }

    async fn shutdown(&self) -> FetchResult<()> {
        // Browser is dropped when ChromiumRenderer is dropped
        Ok(())
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> FetchResult<()> {
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                // Wait for page to be loaded
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => Err(browser_err("navigation failed", e)),
            Err(_) => Err(FetchError::Browser(format!(
                "navigation timed out after {timeout_ms}ms"
            ))),
        }
    }

    async fn execute_js(&self, script: &str) -> FetchResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| browser_err("JS execution failed", e))?;

        result
            .into_value()
            .map_err(|e| browser_err("failed to convert JS result", e))
    }

    async fn get_html(&self) -> FetchResult<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| browser_err("failed to get HTML", e))?;

        result
            .into_value()
            .map_err(|e| browser_err("failed to convert HTML result", e))
    }

    async fn close(self: Box<Self>) -> FetchResult<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_renders_table() {
        let renderer = ChromiumRenderer::new()
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        ctx.navigate(
            "data:text/html,<table><tbody><tr><td>x</td></tr></tbody></table>",
            10000,
        )
        .await
        .expect("navigation failed");

        let has_table = ctx
            .execute_js("document.querySelector('table') !== null")
            .await
            .expect("JS execution failed");
        assert_eq!(has_table, serde_json::Value::Bool(true));

        let html = ctx.get_html().await.expect("get_html failed");
        assert!(html.contains("<table>"));

        ctx.close().await.expect("close failed");
        renderer.shutdown().await.expect("shutdown failed");
    }
}
