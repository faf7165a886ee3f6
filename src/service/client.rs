//! Retrying, time-bounded access to the generation service for one stage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::warn;

use super::{Constraints, GenerationRequest, GenerationService, Role};
use crate::config::RetryPolicy;
use crate::errors::ServiceError;

/// A stage's handle on the service: fixed role, its own retry policy.
#[derive(Clone)]
pub struct StageClient {
    service: Arc<dyn GenerationService>,
    role: Role,
    policy: RetryPolicy,
}

impl StageClient {
    pub fn new(service: Arc<dyn GenerationService>, role: Role, policy: RetryPolicy) -> Self {
        Self {
            service,
            role,
            policy,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Call the service, retrying transient failures and timeouts with backoff.
    ///
    /// Fatal errors return immediately. After `max_attempts` calls the last
    /// transient error is returned.
    pub async fn generate(
        &self,
        context: impl Into<String>,
        constraints: Constraints,
    ) -> Result<String, ServiceError> {
        let request = GenerationRequest::new(self.role, context, constraints);
        let request = &request;
        let retries = self.policy.max_attempts.saturating_sub(1) as usize;
        let strategy = ExponentialBackoff::from_millis(self.policy.base_ms.max(1))
            .factor(self.policy.factor.max(1))
            .max_delay(self.policy.max_delay())
            .map(jitter)
            .take(retries);

        let timeout = self.policy.timeout();
        let attempt = AtomicU32::new(0);
        let attempt = &attempt;

        Retry::spawn(strategy, || async move {
            let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
            let outcome = match tokio::time::timeout(timeout, self.service.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Transient(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ))),
            };
            match outcome {
                Ok(text) => Ok(text),
                Err(err) if err.is_transient() => {
                    warn!(role = %self.role, attempt = n, error = %err, "transient generation error");
                    Err(RetryError::Transient {
                        err,
                        retry_after: None,
                    })
                }
                Err(err) => {
                    warn!(role = %self.role, attempt = n, error = %err, "fatal generation error");
                    Err(RetryError::Permanent(err))
                }
            }
        })
        .await
    }
}
