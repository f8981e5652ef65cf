//! HTTP signal pack client for distributed deployments.
//!
//! `GET /signals/{policy_area}` with ETag revalidation: a matching
//! `If-None-Match` yields `304 Not Modified` and the cached pack.
//! Retryable statuses (401/403/429/5xx) are retried with backoff and feed
//! a circuit breaker: five consecutive failures open the circuit for 60
//! seconds. Responses are capped at 1.5 MB and 5 seconds.

use crate::error::{Result, SignalError};
use crate::ids::PolicyArea;
use crate::signal::pack::SignalPack;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Response size cap in bytes.
const MAX_RESPONSE_BYTES: u64 = 1_572_864; // 1.5 MB

/// Request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive failures that open the circuit.
const FAILURE_THRESHOLD: u32 = 5;

/// How long the circuit stays open.
const OPEN_DURATION: Duration = Duration::from_secs(60);

/// Retry attempts per fetch.
const MAX_ATTEMPTS: u32 = 3;

/// Circuit breaker state.
#[derive(Debug, Default)]
struct CircuitBreaker {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Returns the remaining open time, or `None` when requests may pass.
    fn open_remaining(&self) -> Option<Duration> {
        let opened_at = self.opened_at?;
        let elapsed = opened_at.elapsed();
        if elapsed >= OPEN_DURATION {
            None
        } else {
            Some(OPEN_DURATION - elapsed)
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= FAILURE_THRESHOLD {
            self.opened_at = Some(Instant::now());
        }
    }
}

/// Blocking HTTP signal client with ETag caching and circuit breaking.
pub struct SignalHttpClient {
    base_url: String,
    client: reqwest::blocking::Client,
    breaker: Mutex<CircuitBreaker>,
    etag_cache: Mutex<BTreeMap<String, (String, SignalPack)>>,
}

impl SignalHttpClient {
    /// Creates a client for a signal service base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SignalError::FetchFailed {
                policy_area: "-".to_string(),
                reason: format!("client build failed: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            breaker: Mutex::new(CircuitBreaker::default()),
            etag_cache: Mutex::new(BTreeMap::new()),
        })
    }

    /// Fetches the signal pack for a policy area.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::CircuitOpen`] while the breaker is open and
    /// [`SignalError::FetchFailed`] after retries are exhausted.
    pub fn fetch(&self, pa: PolicyArea) -> Result<SignalPack> {
        if let Ok(breaker) = self.breaker.lock() {
            if let Some(remaining) = breaker.open_remaining() {
                return Err(SignalError::CircuitOpen {
                    failures: breaker.consecutive_failures,
                    remaining_s: remaining.as_secs(),
                }
                .into());
            }
        }

        let key = pa.to_string();
        let cached_etag = self
            .etag_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).map(|(etag, _)| etag.clone()));

        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(Duration::from_millis(200 * u64::from(attempt)));
            }
            match self.fetch_once(pa, cached_etag.as_deref()) {
                Ok(FetchOutcome::Fresh(etag, pack)) => {
                    self.record_success();
                    if let (Some(etag), Ok(mut cache)) = (etag, self.etag_cache.lock()) {
                        cache.insert(key, (etag, pack.clone()));
                    }
                    return Ok(pack);
                }
                Ok(FetchOutcome::NotModified) => {
                    self.record_success();
                    if let Ok(cache) = self.etag_cache.lock() {
                        if let Some((_, pack)) = cache.get(&key) {
                            return Ok(pack.clone());
                        }
                    }
                    last_error = "304 with no cached pack".to_string();
                }
                Err(reason) => {
                    warn!(policy_area = %pa, attempt, %reason, "signal fetch attempt failed");
                    last_error = reason;
                }
            }
        }

        self.record_failure();
        Err(SignalError::FetchFailed {
            policy_area: pa.to_string(),
            reason: last_error,
        }
        .into())
    }

    fn fetch_once(
        &self,
        pa: PolicyArea,
        etag: Option<&str>,
    ) -> std::result::Result<FetchOutcome, String> {
        let url = format!("{}/signals/{pa}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        let response = request.send().map_err(|e| e.to_string())?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(format!("status {status}"));
        }
        if let Some(length) = response.content_length() {
            if length > MAX_RESPONSE_BYTES {
                return Err(format!("response {length} bytes exceeds cap {MAX_RESPONSE_BYTES}"));
            }
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = String::new();
        response
            .take(MAX_RESPONSE_BYTES)
            .read_to_string(&mut body)
            .map_err(|e| e.to_string())?;

        let pack: SignalPack = serde_json::from_str(&body).map_err(|e| e.to_string())?;
        Ok(FetchOutcome::Fresh(etag, pack))
    }

    fn record_success(&self) {
        if let Ok(mut breaker) = self.breaker.lock() {
            breaker.record_success();
        }
    }

    fn record_failure(&self) {
        if let Ok(mut breaker) = self.breaker.lock() {
            breaker.record_failure();
        }
    }
}

enum FetchOutcome {
    Fresh(Option<String>, SignalPack),
    NotModified,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_opens_after_threshold() {
        let mut breaker = CircuitBreaker::default();
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        assert!(breaker.open_remaining().is_some());
    }

    #[test]
    fn test_breaker_closed_below_threshold() {
        let mut breaker = CircuitBreaker::default();
        for _ in 0..(FAILURE_THRESHOLD - 1) {
            breaker.record_failure();
        }
        assert!(breaker.open_remaining().is_none());
    }

    #[test]
    fn test_breaker_success_resets() {
        let mut breaker = CircuitBreaker::default();
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        breaker.record_success();
        assert!(breaker.open_remaining().is_none());
        assert_eq!(breaker.consecutive_failures, 0);
    }

    #[test]
    fn test_unreachable_host_fails_and_counts() {
        let client = SignalHttpClient::new("http://127.0.0.1:1").unwrap();
        let pa = PolicyArea::new(1).unwrap();
        let result = client.fetch(pa);
        assert!(result.is_err());
        let breaker = client.breaker.lock().unwrap();
        assert_eq!(breaker.consecutive_failures, 1);
    }
}
