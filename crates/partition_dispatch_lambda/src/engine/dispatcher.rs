use std::sync::Arc;

use tracing::{error, info, warn, Span};

use crate::adapters::delay::Delay;
use crate::adapters::invoke::{InvokeError, WorkerInvoker};
use crate::runtime::batching::Batch;
use crate::runtime::contract::{payload_fingerprint, BatchPayload, DispatchOutcome, PartitionQuery};
use crate::runtime::retry::{AttemptState, RetryPolicy};

/// Hands one batch to the worker, retrying failed invocations with backoff.
///
/// Every attempt re-sends identical payload bytes, so the worker may see the
/// same batch more than once. Running out of attempts is reported through the
/// returned [`DispatchOutcome`] and never surfaces as an error.
pub struct Dispatcher {
    invoker: Arc<dyn WorkerInvoker>,
    delay: Arc<dyn Delay>,
    policy: RetryPolicy,
    span: Span,
}

impl Dispatcher {
    pub fn new(
        invoker: Arc<dyn WorkerInvoker>,
        delay: Arc<dyn Delay>,
        policy: RetryPolicy,
        span: Span,
    ) -> Self {
        Self {
            invoker,
            delay,
            policy,
            span,
        }
    }

    pub async fn dispatch(&self, batch: &Batch, query: &PartitionQuery) -> DispatchOutcome {
        let batch_number = batch.sequence_number();
        let record_count = batch.len();

        let payload = match serde_json::to_vec(&BatchPayload::new(query, batch)) {
            Ok(value) => value,
            Err(error) => {
                error!(
                    parent: &self.span,
                    batch_number,
                    error = %error,
                    "payload_serialization_failed"
                );
                return DispatchOutcome::failed(
                    batch_number,
                    record_count,
                    0,
                    format!("failed to serialize batch payload: {error}"),
                );
            }
        };
        let fingerprint = payload_fingerprint(&payload);

        let mut last_error: Option<InvokeError> = None;
        let mut state = self.policy.start();
        loop {
            match state {
                AttemptState::Attempting(attempt) => {
                    match self.invoker.invoke_worker_async(&payload).await {
                        Ok(()) => state = self.policy.on_success(attempt),
                        Err(invoke_error) => {
                            state = self.policy.on_failure(attempt);
                            if let AttemptState::Attempting(next_attempt) = state {
                                let backoff = self.policy.backoff_after(attempt);
                                warn!(
                                    parent: &self.span,
                                    batch_number,
                                    attempt,
                                    next_attempt,
                                    backoff_ms = backoff.as_millis() as u64,
                                    error = %invoke_error,
                                    "dispatch_attempt_failed"
                                );
                                self.delay.wait(backoff).await;
                            }
                            last_error = Some(invoke_error);
                        }
                    }
                }
                AttemptState::Succeeded { attempts } => {
                    info!(
                        parent: &self.span,
                        batch_number,
                        record_count,
                        attempts,
                        fingerprint = %fingerprint,
                        "dispatch_succeeded"
                    );
                    return DispatchOutcome::succeeded(batch_number, record_count, attempts);
                }
                AttemptState::Exhausted { attempts } => {
                    let message = last_error
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| "dispatch attempts exhausted".to_string());
                    error!(
                        parent: &self.span,
                        batch_number,
                        record_count,
                        attempts,
                        fingerprint = %fingerprint,
                        error = %message,
                        "dispatch_exhausted"
                    );
                    return DispatchOutcome::failed(batch_number, record_count, attempts, message);
                }
            }
        }
    }
}
