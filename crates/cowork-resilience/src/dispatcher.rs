// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound call wrapper: hard timeout, exponential backoff and a named
//! circuit breaker around every attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cowork_config::DispatcherConfig;
use cowork_core::CoworkError;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::registry::CircuitBreakerRegistry;

/// Timeout, retry and circuit parameters for one logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` (0-based) is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Hard limit on each attempt.
    pub timeout: Duration,
    /// Breaker that gates every attempt.
    pub circuit_id: String,
}

impl RetryOptions {
    /// Options for `circuit_id` using the dispatcher defaults.
    pub fn from_config(circuit_id: impl Into<String>, config: &DispatcherConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            circuit_id: circuit_id.into(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Backoff before the retry that follows attempt `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// An HTTP call routed through the dispatcher.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub circuit_id: String,
    /// Per-request overrides of the dispatcher defaults.
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub backoff_base: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, circuit_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            circuit_id: circuit_id.into(),
            timeout: None,
            max_retries: None,
            backoff_base: None,
        }
    }

    pub fn get(circuit_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(Method::GET, circuit_id, url)
    }

    pub fn post(
        circuit_id: impl Into<String>,
        url: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        let mut request = Self::new(Method::POST, circuit_id, url);
        request.body = Some(body);
        request
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = Some(backoff_base);
        self
    }

    fn retry_options(&self, defaults: &DispatcherConfig) -> RetryOptions {
        let mut options = RetryOptions::from_config(self.circuit_id.clone(), defaults);
        if let Some(timeout) = self.timeout {
            options.timeout = timeout;
        }
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(backoff_base) = self.backoff_base {
            options.backoff_base = backoff_base;
        }
        options
    }
}

/// A completed HTTP exchange. Non-2xx statuses below 500 land here too.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoworkError> {
        serde_json::from_str(&self.body)
            .map_err(|e| CoworkError::Internal(format!("invalid JSON response body: {e}")))
    }
}

/// Runs outbound calls with timeout, retry and circuit breaking.
#[derive(Debug)]
pub struct ExternalDispatcher {
    client: reqwest::Client,
    breakers: Arc<CircuitBreakerRegistry>,
    config: DispatcherConfig,
}

impl ExternalDispatcher {
    pub fn new(
        breakers: Arc<CircuitBreakerRegistry>,
        config: DispatcherConfig,
    ) -> Result<Self, CoworkError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CoworkError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            breakers,
            config,
        })
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Default options for `circuit_id`.
    pub fn retry_options(&self, circuit_id: impl Into<String>) -> RetryOptions {
        RetryOptions::from_config(circuit_id, &self.config)
    }

    /// Issues an HTTP request.
    ///
    /// 5xx responses, network errors and timeouts are retried; any other
    /// status is returned as-is on the first attempt. When retries run out
    /// the last failure surfaces as [`CoworkError::TransientIntegration`] (or
    /// [`CoworkError::Timeout`]).
    pub async fn dispatch_http_request(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse, CoworkError> {
        let options = request.retry_options(&self.config);
        let task_name = format!("{} {}", request.method, request.url);
        let request = &request;
        self.run_with_retry(&task_name, || self.send_once(request), options)
            .await
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse, CoworkError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CoworkError::TransientIntegration {
                integration: request.circuit_id.clone(),
                message: format!("request failed: {e}"),
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CoworkError::TransientIntegration {
                integration: request.circuit_id.clone(),
                message: format!("failed to read response body: {e}"),
            })?;

        if status >= 500 {
            return Err(CoworkError::TransientIntegration {
                integration: request.circuit_id.clone(),
                message: format!("HTTP {status}: {body}"),
            });
        }
        if status >= 400 {
            debug!(
                circuit = %request.circuit_id,
                status,
                "client error response, not retrying"
            );
        }
        Ok(HttpResponse { status, body })
    }

    /// Runs an arbitrary async call with the same timeout, retry and
    /// circuit semantics as [`dispatch_http_request`](Self::dispatch_http_request).
    ///
    /// Only errors for which [`CoworkError::is_transient`] holds are retried.
    /// [`CoworkError::CircuitOpen`] ends the loop at once.
    pub async fn run_with_retry<T, F, Fut>(
        &self,
        task_name: &str,
        mut operation: F,
        options: RetryOptions,
    ) -> Result<T, CoworkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoworkError>>,
    {
        let breaker = self.breakers.get(&options.circuit_id);
        let mut attempt: u32 = 0;

        loop {
            let result = breaker
                .execute(|| with_timeout(options.timeout, operation()))
                .await;

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            task = task_name,
                            circuit = %options.circuit_id,
                            attempt = attempt + 1,
                            "call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < options.max_retries => {
                    let delay = options.backoff_for(attempt);
                    attempt += 1;
                    warn!(
                        task = task_name,
                        circuit = %options.circuit_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            task = task_name,
                            circuit = %options.circuit_id,
                            attempts = attempt + 1,
                            error = %e,
                            "retries exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, CoworkError>>,
) -> Result<T, CoworkError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CoworkError::Timeout { duration: limit }),
    }
}
