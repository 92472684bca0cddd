//! Rate-limited JSON GET helper shared by the Midgard and `CoinGecko` clients.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

/// Per-request timeout for REST calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A `reqwest` client that sleeps so consecutive requests are at least
/// `min_interval` apart.
#[derive(Debug)]
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimitedClient {
    /// Build a client with default `headers` on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(min_interval: Duration, headers: HeaderMap) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("affiliate-fees-sync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            min_interval,
            last_request: None,
        })
    }

    /// GET `url` with `query` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a body
    /// that does not decode into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &mut self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let wait = wait_time(self.last_request, Instant::now(), self.min_interval);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.last_request = Some(Instant::now());

        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {url} returned {status}");
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }
}

/// How long to sleep before the next request.
fn wait_time(last: Option<Instant>, now: Instant, min_interval: Duration) -> Duration {
    last.map_or(Duration::ZERO, |t| {
        min_interval.saturating_sub(now.saturating_duration_since(t))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_does_not_wait() {
        let now = Instant::now();
        assert_eq!(wait_time(None, now, Duration::from_secs(1)), Duration::ZERO, "no prior request");
    }

    #[test]
    fn waits_for_remaining_interval() {
        let last = Instant::now();
        let now = last + Duration::from_millis(300);
        assert_eq!(
            wait_time(Some(last), now, Duration::from_secs(1)),
            Duration::from_millis(700),
            "remaining interval"
        );
        assert_eq!(
            wait_time(Some(last), last + Duration::from_secs(2), Duration::from_secs(1)),
            Duration::ZERO,
            "interval already elapsed"
        );
    }

    #[test]
    fn client_builds() {
        assert!(
            RateLimitedClient::new(Duration::from_millis(10), HeaderMap::new()).is_ok(),
            "client builds with rustls"
        );
    }
}
