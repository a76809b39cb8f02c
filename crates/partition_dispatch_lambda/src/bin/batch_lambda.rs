use async_trait::async_trait;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use partition_dispatch_lambda::handlers::batch::{handle_batch_event, record_id, RecordProcessor};
use partition_dispatch_lambda::runtime::contract::{BatchProcessedResponse, Record};
use partition_dispatch_lambda::telemetry::init_tracing;
use serde_json::Value;
use tracing::{debug, Span};

/// Placeholder settlement step: acknowledges each record in the logs.
struct LoggingRecordProcessor;

#[async_trait]
impl RecordProcessor for LoggingRecordProcessor {
    async fn process_record(&self, record: &Record) -> Result<(), String> {
        debug!(
            record_id = record_id(record).as_deref().unwrap_or("unknown"),
            "record_processed"
        );
        Ok(())
    }
}

async fn handle_request(
    event: LambdaEvent<Value>,
    span: &Span,
) -> Result<BatchProcessedResponse, Error> {
    let response = handle_batch_event(event.payload, &LoggingRecordProcessor, span).await?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing()?;
    let span = tracing::info_span!("batch_lambda");
    let span = &span;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, span).await
    }))
    .await
}
