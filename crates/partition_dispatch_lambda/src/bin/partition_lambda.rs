use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::types::InvocationType;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use partition_dispatch_lambda::adapters::delay::TokioDelay;
use partition_dispatch_lambda::adapters::dynamodb::DynamoDbPageFetcher;
use partition_dispatch_lambda::adapters::invoke::{InvokeError, WorkerInvoker};
use partition_dispatch_lambda::config::PartitionProcessorConfig;
use partition_dispatch_lambda::handlers::partition::{handle_partition_event, PartitionProcessor};
use partition_dispatch_lambda::runtime::contract::PartitionResponse;
use partition_dispatch_lambda::telemetry::init_tracing;
use serde_json::Value;
use tracing::info;

struct AwsLambdaWorkerInvoker {
    lambda_client: aws_sdk_lambda::Client,
    function_name: String,
}

#[async_trait]
impl WorkerInvoker for AwsLambdaWorkerInvoker {
    async fn invoke_worker_async(&self, payload: &[u8]) -> Result<(), InvokeError> {
        self.lambda_client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .set_payload(Some(payload.to_vec().into()))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                InvokeError::new(format!(
                    "failed to invoke batch worker: {}",
                    DisplayErrorContext(&error)
                ))
            })
    }
}

async fn handle_request(
    event: LambdaEvent<Value>,
    processor: &PartitionProcessor<DynamoDbPageFetcher>,
) -> Result<PartitionResponse, Error> {
    let response = handle_partition_event(event.payload, processor).await?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing()?;
    let config = PartitionProcessorConfig::from_env()?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let fetcher = DynamoDbPageFetcher::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.table_name.as_str(),
        config.index_name.as_str(),
        config.page_size,
    );
    let invoker = AwsLambdaWorkerInvoker {
        lambda_client: aws_sdk_lambda::Client::new(&aws_config),
        function_name: config.worker_function_name.clone(),
    };

    info!(
        table = %config.table_name,
        index = %config.index_name,
        worker = %config.worker_function_name,
        max_batch_size = config.engine.max_batch_size,
        max_in_flight_dispatches = config.engine.max_in_flight_dispatches,
        "partition_lambda_started"
    );

    let processor = PartitionProcessor::new(
        Arc::new(fetcher),
        Arc::new(invoker),
        Arc::new(TokioDelay),
        config.engine,
        tracing::info_span!("partition_lambda"),
    );
    let processor = &processor;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, processor).await
    }))
    .await
}
