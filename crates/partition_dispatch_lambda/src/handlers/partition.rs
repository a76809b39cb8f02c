use std::sync::Arc;

use futures::{pin_mut, TryStreamExt};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Span};

use crate::adapters::delay::Delay;
use crate::adapters::invoke::WorkerInvoker;
use crate::adapters::store::PageFetcher;
use crate::config::EngineSettings;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::scanner::{PartitionScanner, ScanError};
use crate::runtime::aggregate::aggregate;
use crate::runtime::batching::{Batch, Batcher};
use crate::runtime::contract::{
    normalize_request, DispatchOutcome, PartitionQuery, PartitionRequest, PartitionResponse,
    PartitionResult, ValidationError,
};
use crate::telemetry::partition_span;

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("invalid partition request: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Scans one partition, dispatches its batches and reports the outcome.
///
/// Only a store failure during the scan fails the call. Batches that cannot
/// be handed to the worker end up in [`PartitionResult::failed_batches`].
pub struct PartitionProcessor<F> {
    fetcher: Arc<F>,
    invoker: Arc<dyn WorkerInvoker>,
    delay: Arc<dyn Delay>,
    settings: EngineSettings,
    span: Span,
}

struct InFlightDispatch {
    batch_number: usize,
    record_count: usize,
    handle: JoinHandle<DispatchOutcome>,
}

impl InFlightDispatch {
    async fn join(self) -> DispatchOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => DispatchOutcome::failed(
                self.batch_number,
                self.record_count,
                0,
                format!("dispatch task did not complete: {join_error}"),
            ),
        }
    }
}

impl<F: PageFetcher> PartitionProcessor<F> {
    pub fn new(
        fetcher: Arc<F>,
        invoker: Arc<dyn WorkerInvoker>,
        delay: Arc<dyn Delay>,
        settings: EngineSettings,
        span: Span,
    ) -> Self {
        Self {
            fetcher,
            invoker,
            delay,
            settings,
            span,
        }
    }

    pub async fn process(&self, query: PartitionQuery) -> Result<PartitionResult, PartitionError> {
        let span = partition_span(&self.span, &query);
        let mut batcher = Batcher::new(self.settings.max_batch_size)?;
        if self.settings.max_in_flight_dispatches == 0 {
            let message = "max_in_flight_dispatches must be a positive integer";
            return Err(ValidationError::new(message).into());
        }
        let scanner = PartitionScanner::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.delay),
            self.settings.page_delay,
            span.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.invoker),
            Arc::clone(&self.delay),
            self.settings.retry_policy,
            span.clone(),
        ));
        let gate = Arc::new(Semaphore::new(self.settings.max_in_flight_dispatches));
        let query = Arc::new(query);
        let mut in_flight = Vec::new();

        info!(parent: &span, "scan_started");
        let records = scanner.scan(&query);
        pin_mut!(records);
        loop {
            match records.try_next().await {
                Ok(Some(record)) => {
                    if let Some(batch) = batcher.accept(record) {
                        in_flight.push(spawn_dispatch(batch, &dispatcher, &gate, &query, &span));
                    }
                }
                Ok(None) => break,
                Err(scan_error) => {
                    for task in &in_flight {
                        task.handle.abort();
                    }
                    error!(
                        parent: &span,
                        batches_abandoned = in_flight.len(),
                        error = %scan_error,
                        "partition_failed"
                    );
                    return Err(scan_error.into());
                }
            }
        }
        if let Some(batch) = batcher.flush() {
            in_flight.push(spawn_dispatch(batch, &dispatcher, &gate, &query, &span));
        }

        let mut outcomes = Vec::with_capacity(in_flight.len());
        for task in in_flight {
            outcomes.push(task.join().await);
        }

        let result = aggregate(outcomes);
        info!(
            parent: &span,
            batches_dispatched = result.batches_dispatched,
            records_scanned = result.records_scanned,
            failed_batches = result.failed_batches.len(),
            overall_status = ?result.overall_status,
            "partition_completed"
        );
        Ok(result)
    }
}

fn spawn_dispatch(
    batch: Batch,
    dispatcher: &Arc<Dispatcher>,
    gate: &Arc<Semaphore>,
    query: &Arc<PartitionQuery>,
    span: &Span,
) -> InFlightDispatch {
    let batch_number = batch.sequence_number();
    let record_count = batch.len();
    debug!(parent: span, batch_number, record_count, "batch_ready");

    let dispatcher = Arc::clone(dispatcher);
    let gate = Arc::clone(gate);
    let query = Arc::clone(query);
    let handle = tokio::spawn(async move {
        // The gate is never closed; a failed acquire would only lift the bound.
        let _permit = gate.acquire_owned().await.ok();
        dispatcher.dispatch(&batch, &query).await
    });

    InFlightDispatch {
        batch_number,
        record_count,
        handle,
    }
}

pub async fn handle_partition_event<F: PageFetcher>(
    event: Value,
    processor: &PartitionProcessor<F>,
) -> Result<PartitionResponse, PartitionError> {
    let payload = normalize_apigw_event(event).map_err(ValidationError::new)?;
    let request = serde_json::from_value::<PartitionRequest>(payload)
        .map_err(|error| ValidationError::new(format!("Malformed request: {error}")))?;
    let query = normalize_request(request)?;

    let result = processor.process(query).await?;
    Ok(PartitionResponse::from(result))
}

fn normalize_apigw_event(event: Value) -> Result<Value, String> {
    let Some(object) = event.as_object() else {
        return Err("Request payload must be a JSON object".to_string());
    };

    let Some(body) = object.get("body") else {
        return Ok(event);
    };

    match body {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(body.clone()),
        Value::String(text) => {
            serde_json::from_str(text).map_err(|error| format!("Malformed JSON body: {error}"))
        }
        _ => Err("Request body must be a JSON object".to_string()),
    }
}
