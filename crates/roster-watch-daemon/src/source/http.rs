//! Plain HTTP page fetch wrapping reqwest.
//!
//! Not a browser: just one GET per call. Handles redirects, timeouts,
//! retry on 5xx, and backoff on 429.

use std::time::Duration;

use crate::error::{FetchError, FetchResult};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Retries for transient statuses within a single fetch.
const MAX_TRANSIENT_RETRIES: u32 = 2;

/// Body fragments served by anti-bot interstitials instead of the real page.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-chl",
    "challenge-platform",
    "cf_chl_opt",
    "Just a moment...",
    "Attention Required! | Cloudflare",
];

/// HTTP client for the roster page.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for servers that reject HTTP/2.
    h1_client: reqwest::Client,
    backoff_base: Duration,
}

impl HttpFetcher {
    /// Create a client with a desktop Chrome user-agent.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        let h1_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .http1_only()
            .build()
            .unwrap_or_default();

        Self {
            client,
            h1_client,
            backoff_base: Duration::from_millis(500),
        }
    }

    /// Override the delay before the first transient retry.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// GET `url` and return the body of a 200 response.
    ///
    /// Falls back to HTTP/1.1 on protocol errors (some CDNs reject HTTP/2).
    pub async fn get_html(&self, url: &str) -> FetchResult<String> {
        match self.get_inner(&self.client, url).await {
            Err(FetchError::Http(e)) if looks_like_protocol_error(&e) => {
                tracing::debug!("Retrying {url} over HTTP/1.1 after: {e}");
                self.get_inner(&self.h1_client, url).await
            }
            other => other,
        }
    }

    async fn get_inner(&self, client: &reqwest::Client, url: &str) -> FetchResult<String> {
        let mut retries = 0u32;

        loop {
            let resp = match client
                .get(url)
                .header("Accept", "text/html,application/xhtml+xml")
                .header("Accept-Language", "ro-RO,ro;q=0.9,en;q=0.8")
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    if retries < MAX_TRANSIENT_RETRIES && !looks_like_protocol_error(&e) {
                        retries += 1;
                        tokio::time::sleep(self.backoff_base * 2u32.pow(retries - 1)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            };

            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let final_url = resp.url().to_string();
            let body = resp.text().await?;
            let challenge = is_challenge(status, &body);

            // Retry on 5xx, unless it is a challenge page
            if status >= 500 && !challenge && retries < MAX_TRANSIENT_RETRIES {
                retries += 1;
                tracing::debug!("Status {status} from {url}, retry {retries}");
                tokio::time::sleep(self.backoff_base * 2u32.pow(retries - 1)).await;
                continue;
            }

            // Backoff on 429
            if status == 429 && !challenge && retries < MAX_TRANSIENT_RETRIES {
                retries += 1;
                let wait = retry_after.unwrap_or(2).min(10);
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if challenge {
                return Err(FetchError::Challenge { status });
            }
            if status != 200 {
                return Err(FetchError::Status {
                    status,
                    url: final_url,
                });
            }
            return Ok(body);
        }
    }
}

fn looks_like_protocol_error(e: &reqwest::Error) -> bool {
    let msg = e.to_string();
    msg.contains("http2") || msg.contains("protocol") || msg.contains("connection closed")
}

/// Whether a response is an anti-bot interstitial rather than the real page.
pub fn is_challenge(status: u16, body: &str) -> bool {
    let marked = CHALLENGE_MARKERS.iter().any(|m| body.contains(m));
    (marked && matches!(status, 403 | 429 | 503)) || body.contains("cf_chl_opt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).with_backoff_base(Duration::from_millis(1))
    }

    #[test]
    fn test_challenge_detection() {
        assert!(is_challenge(403, "<title>Just a moment...</title>"));
        assert!(is_challenge(200, "<script>window._cf_chl_opt={}</script>"));
        assert!(!is_challenge(403, "<h1>Forbidden</h1>"));
        assert!(!is_challenge(200, "<table></table>"));
    }

    #[tokio::test]
    async fn test_get_html_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/factions/members/8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .mount(&server)
            .await;

        let body = fetcher()
            .get_html(&format!("{}/factions/members/8", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<table></table>");
    }

    #[tokio::test]
    async fn test_retries_transient_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = fetcher().get_html(&server.uri()).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_retries_plain_service_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<h1>Service Unavailable</h1>"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = fetcher().get_html(&server.uri()).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_challenge_page_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(503).set_body_string("<title>Just a moment...</title>"),
            )
            .mount(&server)
            .await;

        let err = fetcher().get_html(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Challenge { status: 503 }));
    }

    #[tokio::test]
    async fn test_not_found_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher().get_html(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}
