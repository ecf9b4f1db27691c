//! Snapshot source: fetch the roster page and turn it into a [`Snapshot`].
//!
//! Each attempt tries a plain HTTP GET first and, when that fails (typically
//! an anti-bot challenge), renders the page in a headless browser. Attempts
//! back off exponentially. Callers only ever see a finished snapshot or the
//! error from the last attempt.

pub mod http;
pub mod parse;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use roster_watch::Snapshot;

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchResult};
use crate::renderer::Renderer;

pub use http::HttpFetcher;
pub use parse::{parse_roster, RosterPage};

/// Anything that can produce the current roster.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch a complete snapshot, with all retries and fallbacks applied.
    async fn fetch(&self) -> FetchResult<Snapshot>;
}

/// Poll interval while waiting for a challenge page to turn into the roster.
const TABLE_POLL: Duration = Duration::from_millis(500);

/// Upper bound on the delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

const TABLE_READY_JS: &str = "document.querySelector('table tbody tr') !== null";

/// Fetches the roster over HTTP with a browser fallback.
pub struct RosterSource {
    url: String,
    http: HttpFetcher,
    renderer: Box<dyn Renderer>,
    config: FetchConfig,
}

impl RosterSource {
    pub fn new(url: impl Into<String>, config: FetchConfig, renderer: Box<dyn Renderer>) -> Self {
        let http = HttpFetcher::new(config.timeout).with_backoff_base(config.backoff_base);
        Self {
            url: url.into(),
            http,
            renderer,
            config,
        }
    }

    /// Release the browser, if one was launched.
    pub async fn shutdown(&self) {
        if let Err(e) = self.renderer.shutdown().await {
            tracing::warn!("Renderer shutdown failed: {e}");
        }
    }

    async fn attempt(&self, observed_at: NaiveDateTime) -> FetchResult<RosterPage> {
        let http_err = match self.fetch_http(observed_at).await {
            Ok(page) => {
                tracing::debug!("Roster fetched over HTTP");
                return Ok(page);
            }
            Err(e) => e,
        };

        if !self.config.browser_fallback {
            return Err(http_err);
        }

        tracing::info!("HTTP fetch failed ({http_err}), falling back to browser");
        let page = self.fetch_browser(observed_at).await?;
        tracing::debug!("Roster fetched through browser");
        Ok(page)
    }

    async fn fetch_http(&self, observed_at: NaiveDateTime) -> FetchResult<RosterPage> {
        let html = self.http.get_html(&self.url).await?;
        parse_roster(&html, observed_at)
    }

    async fn fetch_browser(&self, observed_at: NaiveDateTime) -> FetchResult<RosterPage> {
        let mut ctx = self.renderer.new_context().await?;

        let rendered: FetchResult<String> = async {
            ctx.navigate(&self.url, self.config.timeout.as_millis() as u64)
                .await?;

            // Challenge pages replace themselves with the real page after a
            // few seconds; wait for the roster rows to show up.
            let deadline = Instant::now() + self.config.challenge_wait;
            loop {
                let ready = ctx
                    .execute_js(TABLE_READY_JS)
                    .await
                    .map(|v| v.as_bool().unwrap_or(false))
                    .unwrap_or(false);
                if ready || Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(TABLE_POLL).await;
            }

            ctx.get_html().await
        }
        .await;

        if let Err(e) = ctx.close().await {
            tracing::debug!("Closing browser context failed: {e}");
        }

        parse_roster(&rendered?, observed_at)
    }
}

#[async_trait]
impl SnapshotSource for RosterSource {
    async fn fetch(&self) -> FetchResult<Snapshot> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let observed_at = chrono::Local::now().naive_local();

            let err = match self.attempt(observed_at).await {
                Ok(page) => {
                    tracing::info!(
                        "Fetched roster: {} members ({} rows skipped) on attempt {attempt}",
                        page.snapshot.len(),
                        page.skipped.len()
                    );
                    return Ok(page.snapshot);
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self
                .config
                .backoff_base
                .checked_mul(2u32.saturating_pow(attempt - 1))
                .unwrap_or(MAX_BACKOFF)
                .min(MAX_BACKOFF);
            tracing::warn!(
                "Fetch attempt {attempt}/{max_attempts} failed: {err}; retrying in {}ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
