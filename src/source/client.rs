//! Blocking HTTP client with configurable politeness (delay between requests) and optional retries.

use crate::source::error::ScraperError;
use crate::source::Fetch;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; foxscrape/0.1; +https://github.com/foxscrape)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_SECS: u64 = 1;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for get_with_retry (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl PoliteClient {
    /// Builder for custom User-Agent, delay, timeout and retries.
    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Perform a GET request with retries for transient failures.
    ///
    /// Retries on timeouts, connection errors, HTTP 5xx and HTTP 429. Any other outcome,
    /// or the outcome of the final attempt, is returned as-is.
    pub fn get_with_retry(
        &mut self,
        url: &str,
    ) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let mut attempt = 0u32;
        loop {
            self.wait_delay();
            let result = self.inner.get(url).send();
            self.last_request = Some(Instant::now());
            let last_attempt = attempt + 1 >= self.retry_count;
            let backoff = match result {
                Ok(response) => {
                    let status = response.status();
                    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
                    if !(status.is_server_error() || rate_limited) || last_attempt {
                        return Ok(response);
                    }
                    debug!(url, status = status.as_u16(), attempt, "retrying after HTTP status");
                    self.backoff_for(attempt, rate_limited)
                }
                Err(e) => {
                    if !(e.is_timeout() || e.is_connect()) || last_attempt {
                        return Err(e);
                    }
                    debug!(url, error = %e, attempt, "retrying after network error");
                    self.backoff_for(attempt, false)
                }
            };
            std::thread::sleep(backoff);
            attempt += 1;
        }
    }

    fn backoff_for(&self, attempt: u32, rate_limited: bool) -> Duration {
        let table: &[u64] = if rate_limited {
            &BACKOFF_429_SECS
        } else {
            &self.backoff_secs
        };
        let secs = table
            .get(attempt as usize)
            .or_else(|| table.last())
            .copied()
            .unwrap_or(1);
        Duration::from_secs(secs)
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Check response status and read body as UTF-8.
fn check_response(
    response: reqwest::blocking::Response,
    url: &str,
) -> Result<String, ScraperError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    response
        .text()
        .map_err(|e| ScraperError::BodyRead { source: e })
}

impl Fetch for PoliteClient {
    fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
        let response = self
            .get_with_retry(url)
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        check_response(response, url)
    }
}

/// Builder for PoliteClient with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a crate-identifying default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 1.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of HTTP attempts for transient failures (default 3).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set backoff delays in seconds before each retry. If shorter than retry_count - 1, the last
    /// value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Build the blocking client and polite wrapper.
    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            // Default exponential: 1, 2, 4, ... for (retry_count - 1) steps
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(4)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    /// Serve canned responses: `/flaky` fails with 503 once, then succeeds.
    fn spawn_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let flaky_hits = Arc::new(AtomicU32::new(0));

        let handle = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };
            let (status, body) = match request.url() {
                "/directory/" => (200, "<html><body>page one</body></html>"),
                "/flaky" if flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 => (503, "busy"),
                "/flaky" => (200, "recovered"),
                _ => (404, "not found"),
            };
            let resp = tiny_http::Response::from_string(body).with_status_code(status);
            let _ = request.respond(resp);
        });

        (base_url, shutdown_tx, handle)
    }

    fn quick_client() -> PoliteClient {
        PoliteClient::builder()
            .delay_secs(0)
            .timeout_secs(5)
            .retry_count(2)
            .retry_backoff_secs(vec![0])
            .build()
            .expect("build client")
    }

    #[test]
    fn fetch_returns_body_on_success() -> Result<(), ScraperError> {
        let (base, shutdown, handle) = spawn_server();
        let mut client = quick_client();
        let body = client.fetch(&format!("{base}/directory/"))?;
        assert!(body.contains("page one"));
        let _ = shutdown.send(());
        let _ = handle.join();
        Ok(())
    }

    #[test]
    fn fetch_maps_non_success_status() {
        let (base, shutdown, handle) = spawn_server();
        let mut client = quick_client();
        let url = format!("{base}/missing");
        let result = client.fetch(&url);
        let _ = shutdown.send(());
        let _ = handle.join();
        match result {
            Err(ScraperError::HttpStatus { status: 404, url: u }) => assert_eq!(u, url),
            other => panic!("expected HttpStatus 404, got {:?}", other),
        }
    }

    #[test]
    fn fetch_retries_server_errors() -> Result<(), ScraperError> {
        let (base, shutdown, handle) = spawn_server();
        let mut client = quick_client();
        let body = client.fetch(&format!("{base}/flaky"))?;
        assert_eq!(body, "recovered");
        let _ = shutdown.send(());
        let _ = handle.join();
        Ok(())
    }

    #[test]
    fn backoff_reuses_last_value_when_table_is_short() {
        let client = PoliteClient::builder()
            .retry_count(5)
            .retry_backoff_secs(vec![1, 3])
            .build()
            .expect("build client");
        assert_eq!(client.backoff_for(0, false), Duration::from_secs(1));
        assert_eq!(client.backoff_for(4, false), Duration::from_secs(3));
        assert_eq!(client.backoff_for(0, true), Duration::from_secs(30));
    }
}
