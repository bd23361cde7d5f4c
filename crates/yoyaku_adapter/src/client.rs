// --- File: crates/yoyaku_adapter/src/client.rs ---
//! HTTP client for the upstream scheduling SaaS admin API.
//!
//! Wraps a shared `reqwest` client with the upstream's operational quirks:
//! a per-verb minimum-interval rate limit, bearer-token auth with a single
//! refresh-and-retry on 401, and a bounded retry honoring `retry-after`
//! on 429. Everything above this module works with normalized payloads.

use std::collections::HashMap;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{info, warn};
use yoyaku_common::error::BookingSystemError;
use yoyaku_common::HTTP_CLIENT;
use yoyaku_config::UpstreamConfig;

use crate::models::UpstreamErrorBody;

/// Minimum interval between two requests of the same verb.
/// The upstream allows 10 reads/s and 2 mutations/s per tenant.
fn min_interval(method: &Method) -> Duration {
    if *method == Method::GET {
        Duration::from_millis(100)
    } else {
        Duration::from_millis(500)
    }
}

/// Token bucket of size 1 per HTTP verb.
///
/// The next allowed instant is reserved while the lock is held, so two
/// workers racing on the same verb serialize instead of both sleeping
/// until the same deadline.
struct RateLimiter {
    next_allowed: Mutex<HashMap<&'static str, Instant>>,
}

impl RateLimiter {
    fn new() -> Self {
        RateLimiter {
            next_allowed: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, method: &Method) {
        let interval = min_interval(method);
        let key: &'static str = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            _ => "OTHER",
        };
        let slot = {
            let mut map = self.next_allowed.lock().await;
            let now = Instant::now();
            let slot = match map.get(key) {
                Some(next) if *next > now => *next,
                _ => now,
            };
            map.insert(key, slot + interval);
            slot
        };
        sleep_until(slot).await;
    }
}

/// Client for the system of record. Constructed once at process start and
/// injected wherever upstream access is needed.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    access_token: RwLock<String>,
    refresh_token: Mutex<Option<String>>,
    client_id: Option<String>,
    client_secret: Option<String>,
    limiter: RateLimiter,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        UpstreamClient {
            http: HTTP_CLIENT.clone(),
            base_url: config.api_base_url(),
            token_url: config.oauth_token_url(),
            access_token: RwLock::new(config.access_token.clone()),
            refresh_token: Mutex::new(config.refresh_token.clone()),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            limiter: RateLimiter::new(),
        }
    }

    /// Exchanges the refresh token for a new access token.
    async fn refresh_access_token(&self) -> Result<(), BookingSystemError> {
        let refresh_token = self.refresh_token.lock().await.clone();
        let (refresh_token, client_id, client_secret) =
            match (refresh_token, &self.client_id, &self.client_secret) {
                (Some(r), Some(i), Some(s)) => (r, i.clone(), s.clone()),
                _ => {
                    return Err(BookingSystemError::Auth(
                        "Cannot refresh token: missing credentials".to_string(),
                    ))
                }
            };

        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": client_id,
            "client_secret": client_secret,
        });
        let response = self.http.post(&self.token_url).json(&body).send().await?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BookingSystemError::Auth(format!(
                "Failed to refresh token: {detail}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BookingSystemError::Parse(e.to_string()))?;

        *self.access_token.write().await = token.access_token;
        if let Some(new_refresh) = token.refresh_token {
            *self.refresh_token.lock().await = Some(new_refresh);
        }
        info!("Upstream access token refreshed");
        Ok(())
    }

    /// Executes one request, rate limited, with one 401 refresh-and-retry
    /// and one 429 backoff-and-retry.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<Value, BookingSystemError> {
        let mut refresh_attempted = false;
        let mut backoff_attempted = false;
        loop {
            self.limiter.acquire(&method).await;

            let url = format!("{}{}", self.base_url, path);
            let token = self.access_token.read().await.clone();
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header("X-Requested-With", "XMLHttpRequest");
            if let Some(query) = query {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            match response.status() {
                StatusCode::UNAUTHORIZED if !refresh_attempted => {
                    refresh_attempted = true;
                    self.refresh_access_token().await?;
                    continue;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(BookingSystemError::Auth(
                        "Access token is invalid or expired".to_string(),
                    ));
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(1);
                    if backoff_attempted {
                        return Err(BookingSystemError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                    }
                    backoff_attempted = true;
                    warn!(retry_after, %url, "Upstream rate limit hit, backing off");
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                StatusCode::NOT_FOUND => {
                    return Err(BookingSystemError::NotFound(url));
                }
                status if !status.is_success() => {
                    let text = response.text().await.unwrap_or_default();
                    if status.is_server_error() {
                        return Err(BookingSystemError::Unavailable(format!(
                            "{status}: {text}"
                        )));
                    }
                    let (code, message) = UpstreamErrorBody::parse(&text);
                    return Err(BookingSystemError::Rejected { code, message });
                }
                _ => {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| BookingSystemError::Parse(e.to_string()));
                }
            }
        }
    }

    /// GET with the upstream's `query` convention: the filter object is
    /// JSON-encoded into a single `query` parameter.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&Value>,
        extra: &[(String, String)],
    ) -> Result<T, BookingSystemError> {
        let mut params: Vec<(String, String)> = extra.to_vec();
        if let Some(query) = query {
            params.push(("query".to_string(), query.to_string()));
        }
        let value = self
            .request(Method::GET, path, Some(&params), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Master-data GET: transient upstream failures are retried a fixed
    /// small number of times before the caller falls back to stale cache.
    pub async fn get_master<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&Value>,
    ) -> Result<T, BookingSystemError> {
        const MASTER_RETRIES: usize = 2;
        let mut last_err = None;
        for attempt in 0..=MASTER_RETRIES {
            match self.get(path, query, &[]).await {
                Ok(value) => return Ok(value),
                Err(err @ BookingSystemError::Unavailable(_)) => {
                    warn!(path, attempt, error = %err, "Master-data load failed");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("at least one attempt"))
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, BookingSystemError> {
        let value = self.request(Method::POST, path, None, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, BookingSystemError> {
        let value = self.request(Method::PUT, path, None, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_spaces_same_verb() {
        let limiter = RateLimiter::new();
        let started = Instant::now();
        limiter.acquire(&Method::GET).await;
        limiter.acquire(&Method::GET).await;
        limiter.acquire(&Method::GET).await;
        // Two waits of 100ms each after the free first slot.
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_does_not_couple_verbs() {
        let limiter = RateLimiter::new();
        let started = Instant::now();
        limiter.acquire(&Method::GET).await;
        limiter.acquire(&Method::POST).await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
