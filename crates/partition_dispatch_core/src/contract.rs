use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::batching::Batch;
use crate::keys::selection_partition_key;

/// One matched entity of a partition. The engine only counts and groups these.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRequest {
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub contest_id: String,
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub winning_selection_id: String,
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub partition_id: String,
}

/// The immutable identifying triple of one partition scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionQuery {
    contest_id: String,
    selection_id: String,
    partition_id: String,
}

impl PartitionQuery {
    pub fn new(
        contest_id: impl Into<String>,
        selection_id: impl Into<String>,
        partition_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let contest_id = required_identifier(contest_id.into(), "contestId")?;
        let selection_id = required_identifier(selection_id.into(), "winningSelectionId")?;
        let partition_id = required_identifier(partition_id.into(), "partitionId")?;

        Ok(Self {
            contest_id,
            selection_id,
            partition_id,
        })
    }

    pub fn contest_id(&self) -> &str {
        &self.contest_id
    }

    pub fn selection_id(&self) -> &str {
        &self.selection_id
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    /// Range key of the selection/partition index, e.g. `selection_winner#2`.
    pub fn selection_partition_key(&self) -> String {
        selection_partition_key(&self.selection_id, &self.partition_id)
    }
}

/// Event body handed to the batch worker. Field names are part of the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub batch: Vec<Record>,
    #[serde(deserialize_with = "deserialize_identifier")]
    pub contest_id: String,
    #[serde(deserialize_with = "deserialize_identifier")]
    pub winning_selection_id: String,
    #[serde(deserialize_with = "deserialize_identifier")]
    pub partition_id: String,
    pub batch_number: usize,
}

impl BatchPayload {
    pub fn new(query: &PartitionQuery, batch: &Batch) -> Self {
        Self {
            batch: batch.records().to_vec(),
            contest_id: query.contest_id().to_string(),
            winning_selection_id: query.selection_id().to_string(),
            partition_id: query.partition_id().to_string(),
            batch_number: batch.sequence_number(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DispatchStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub sequence_number: usize,
    pub record_count: usize,
    pub status: DispatchStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl DispatchOutcome {
    pub fn succeeded(sequence_number: usize, record_count: usize, attempts: u32) -> Self {
        Self {
            sequence_number,
            record_count,
            status: DispatchStatus::Succeeded,
            attempts,
            last_error: None,
        }
    }

    pub fn failed(
        sequence_number: usize,
        record_count: usize,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            sequence_number,
            record_count,
            status: DispatchStatus::Failed,
            attempts,
            last_error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DispatchStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverallStatus {
    Complete,
    PartialCompletion,
}

/// Final report of one partition run. Only built once every dispatch resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionResult {
    pub batches_dispatched: usize,
    pub records_scanned: usize,
    pub failed_batches: Vec<DispatchOutcome>,
    pub overall_status: OverallStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedBatch {
    pub batch_number: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartitionResponse {
    pub overall_status: OverallStatus,
    pub batches_dispatched: usize,
    pub records_scanned: usize,
    pub failed_batches: Vec<FailedBatch>,
}

impl From<PartitionResult> for PartitionResponse {
    fn from(result: PartitionResult) -> Self {
        Self {
            overall_status: result.overall_status,
            batches_dispatched: result.batches_dispatched,
            records_scanned: result.records_scanned,
            failed_batches: result
                .failed_batches
                .into_iter()
                .map(|outcome| FailedBatch {
                    batch_number: outcome.sequence_number,
                    error: outcome
                        .last_error
                        .unwrap_or_else(|| "dispatch failed".to_string()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessedResponse {
    pub processed_count: usize,
    pub failed_count: usize,
    pub batch_number: usize,
    pub partition_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn normalize_request(request: PartitionRequest) -> Result<PartitionQuery, ValidationError> {
    PartitionQuery::new(
        request.contest_id,
        request.winning_selection_id,
        request.partition_id,
    )
}

pub fn validate_batch_payload(payload: &BatchPayload) -> Result<PartitionQuery, ValidationError> {
    PartitionQuery::new(
        payload.contest_id.as_str(),
        payload.winning_selection_id.as_str(),
        payload.partition_id.as_str(),
    )
}

/// Hex SHA-256 of a serialized payload. Redelivered batches share a fingerprint.
pub fn payload_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn required_identifier(value: String, name: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(format!("{name} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

// Partition ids are seeded as numbers; accept both shapes on the wire.
fn deserialize_identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "identifier must be a string or number, got {other}"
        ))),
    }
}
