use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn, Span};

use crate::runtime::contract::{
    payload_fingerprint, validate_batch_payload, BatchPayload, BatchProcessedResponse, Record,
    ValidationError,
};
use crate::telemetry::batch_span;

/// Per-record business logic of the worker.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    async fn process_record(&self, record: &Record) -> Result<(), String>;
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Malformed batch payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid batch payload: {0}")]
    Validation(#[from] ValidationError),
}

/// Processes every record of one delivered batch in order.
///
/// Record failures are counted and logged; they never fail the batch. The
/// logged fingerprint matches the one the dispatcher logged for the same
/// payload, so redeliveries can be correlated.
pub async fn handle_batch_event(
    event: Value,
    processor: &dyn RecordProcessor,
    parent: &Span,
) -> Result<BatchProcessedResponse, BatchError> {
    let payload: BatchPayload = serde_json::from_value(event)?;
    let query = validate_batch_payload(&payload)?;
    let fingerprint = payload_fingerprint(&serde_json::to_vec(&payload)?);
    let span = batch_span(parent, &query, payload.batch_number);

    let mut failed_count = 0usize;
    for record in &payload.batch {
        if let Err(error) = processor.process_record(record).await {
            failed_count += 1;
            warn!(
                parent: &span,
                record_id = record_id(record).as_deref().unwrap_or("unknown"),
                error = %error,
                "record_failed"
            );
        }
    }

    let response = BatchProcessedResponse {
        processed_count: payload.batch.len() - failed_count,
        failed_count,
        batch_number: payload.batch_number,
        partition_id: query.partition_id().to_string(),
    };
    info!(
        parent: &span,
        processed_count = response.processed_count,
        failed_count,
        fingerprint = %fingerprint,
        "batch_completed"
    );
    Ok(response)
}

/// `userId`, falling back to `id`, as plain text for log fields.
pub fn record_id(record: &Record) -> Option<String> {
    ["userId", "id"]
        .iter()
        .find_map(|key| record.get(*key))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct RecordingProcessor {
        failing_ids: Vec<&'static str>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl RecordingProcessor {
        fn new(failing_ids: Vec<&'static str>) -> Self {
            Self {
                failing_ids,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordProcessor for RecordingProcessor {
        async fn process_record(&self, record: &Record) -> Result<(), String> {
            let id = record_id(record);
            self.seen.lock().expect("poisoned mutex").push(id.clone());
            match id {
                Some(id) if self.failing_ids.contains(&id.as_str()) => {
                    Err(format!("could not settle {id}"))
                }
                _ => Ok(()),
            }
        }
    }

    fn event(batch: Value) -> Value {
        json!({
            "batch": batch,
            "contestId": "contest_123",
            "winningSelectionId": "selection_winner",
            "partitionId": "2",
            "batchNumber": 7
        })
    }

    #[tokio::test]
    async fn processes_records_in_order() {
        let processor = RecordingProcessor::new(Vec::new());

        let response = handle_batch_event(
            event(json!([{"userId": "u1"}, {"userId": "u2"}, {"id": 3}])),
            &processor,
            &Span::none(),
        )
        .await
        .expect("batch should process");

        assert_eq!(
            response,
            BatchProcessedResponse {
                processed_count: 3,
                failed_count: 0,
                batch_number: 7,
                partition_id: "2".to_string(),
            }
        );
        assert_eq!(
            *processor.seen.lock().expect("poisoned mutex"),
            vec![
                Some("u1".to_string()),
                Some("u2".to_string()),
                Some("3".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn record_failures_are_counted_and_skipped() {
        let processor = RecordingProcessor::new(vec!["u2"]);

        let response = handle_batch_event(
            event(json!([{"userId": "u1"}, {"userId": "u2"}, {"userId": "u3"}])),
            &processor,
            &Span::none(),
        )
        .await
        .expect("record failure should not fail the batch");

        assert_eq!(response.processed_count, 2);
        assert_eq!(response.failed_count, 1);
        assert_eq!(processor.seen.lock().expect("poisoned mutex").len(), 3);
    }

    #[tokio::test]
    async fn empty_batch_is_accepted() {
        let processor = RecordingProcessor::new(Vec::new());

        let response = handle_batch_event(event(json!([])), &processor, &Span::none())
            .await
            .expect("empty batch should process");

        assert_eq!(response.processed_count, 0);
        assert_eq!(response.failed_count, 0);
    }

    #[tokio::test]
    async fn rejects_blank_identifiers() {
        let processor = RecordingProcessor::new(Vec::new());
        let mut payload = event(json!([{"userId": "u1"}]));
        payload["contestId"] = json!("  ");

        let error = handle_batch_event(payload, &processor, &Span::none())
            .await
            .expect_err("blank contest should fail");

        assert!(matches!(error, BatchError::Validation(_)));
        assert!(processor.seen.lock().expect("poisoned mutex").is_empty());
    }

    #[tokio::test]
    async fn rejects_payload_without_batch() {
        let processor = RecordingProcessor::new(Vec::new());

        let error = handle_batch_event(
            json!({"contestId": "contest_123", "partitionId": "2"}),
            &processor,
            &Span::none(),
        )
        .await
        .expect_err("missing batch should fail");

        assert!(matches!(error, BatchError::Malformed(_)));
    }

    #[test]
    fn record_id_is_plain_text() {
        let mut record = Record::new();
        record.insert("id".to_string(), json!(42));
        assert_eq!(record_id(&record).as_deref(), Some("42"));

        record.insert("userId".to_string(), json!("u1"));
        assert_eq!(record_id(&record).as_deref(), Some("u1"));

        assert_eq!(record_id(&Record::new()), None);
    }
}
