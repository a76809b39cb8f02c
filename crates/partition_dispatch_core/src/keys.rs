pub const SELECTION_PARTITION_SEPARATOR: &str = "#";

pub const DEFAULT_PARTICIPANTS_TABLE: &str = "ContestParticipants";
pub const DEFAULT_SELECTION_PARTITION_INDEX: &str = "SelectionPartitionIndex";
pub const DEFAULT_BATCH_PROCESSOR_FUNCTION: &str = "batchProcessorLambda";

pub const CONTEST_ID_ATTRIBUTE: &str = "contestId";
pub const SELECTION_PARTITION_ATTRIBUTE: &str = "selectionPartitionId";

pub fn selection_partition_key(selection_id: &str, partition_id: &str) -> String {
    format!("{selection_id}{SELECTION_PARTITION_SEPARATOR}{partition_id}")
}

/// Key condition used against the selection/partition index.
pub fn selection_partition_key_condition() -> String {
    format!("{CONTEST_ID_ATTRIBUTE} = :cid AND {SELECTION_PARTITION_ATTRIBUTE} = :spid")
}
