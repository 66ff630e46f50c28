use super::gateway::OrderGateway;
use crate::config::EngineSettings;
use crate::error::GatewayError;
use crate::models::{OrderFill, OrderRequest};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What is known about a submission once the client gives up waiting
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome<T> {
    /// Gateway acknowledged
    Confirmed(T),
    /// Gateway refused; nothing changed at the broker
    Rejected(GatewayError),
    /// No answer in time. The broker may or may not have acted.
    Unknown,
}

impl<T> SubmitOutcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SubmitOutcome::Confirmed(_))
    }
}

/// Timeout and bounded retry settings for gateway calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.gateway_timeout_ms),
            max_retries: settings.order_max_retries,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }

    /// Exponential backoff before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

/// Wraps an [`OrderGateway`] with per-call timeout and retry-with-backoff.
///
/// A timeout is never retried: re-sending an open whose first attempt may have
/// filled would risk a duplicate position.
#[derive(Clone)]
pub struct GatewayClient {
    gateway: Arc<dyn OrderGateway>,
    policy: RetryPolicy,
}

impl GatewayClient {
    pub fn new(gateway: Arc<dyn OrderGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn open(&self, request: &OrderRequest) -> SubmitOutcome<OrderFill> {
        self.submit("open", &request.symbol, || self.gateway.open(request))
            .await
    }

    pub async fn modify_sl(&self, symbol: &str, ticket: u64, new_sl: f64) -> SubmitOutcome<()> {
        self.submit("modify_sl", symbol, || self.gateway.modify_sl(ticket, new_sl))
            .await
    }

    pub async fn close(&self, symbol: &str, ticket: u64) -> SubmitOutcome<()> {
        self.submit("close", symbol, || self.gateway.close(ticket))
            .await
    }

    async fn submit<T, F, Fut>(&self, op: &str, symbol: &str, mut call: F) -> SubmitOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout),
            };

            match result {
                Ok(value) => return SubmitOutcome::Confirmed(value),
                Err(GatewayError::Timeout) => {
                    tracing::warn!(
                        symbol = %symbol,
                        op,
                        timeout_ms = self.policy.timeout.as_millis() as u64,
                        "Gateway timed out, outcome unknown"
                    );
                    return SubmitOutcome::Unknown;
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay(attempt);
                    tracing::debug!(
                        symbol = %symbol,
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying gateway call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, op, attempts = attempt + 1, error = %e, "Gateway call failed");
                    return SubmitOutcome::Rejected(e);
                }
            }
        }
    }
}
